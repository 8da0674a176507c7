//! Unified record reader
//!
//! The capability set shared by both backends:
//!
//! - **RecordReader**: trait implemented by the remote and snapshot clients
//! - **RecordStream**: lazy, single-pass, fused stream of decoded records
//! - **drain**: the one consumption loop that works for either backend
//!
//! # End of stream
//!
//! A stream ends when it returns `None`. Once it has returned `None` or an
//! error it keeps returning `None`; records already yielded stay valid.
//!
//! ```rust,ignore
//! let filter = parse_filter("devices/devmac devices/avg_lat", target.filter_mode())?;
//! let reader = open_reader(&target, filter, None, &config)?;
//! let count = drain(reader, |n, record| {
//!     println!("{} {}", n, record);
//!     ControlFlow::Continue(())
//! })?;
//! ```

mod error;
mod target;

pub use error::{ReaderError, ReaderResult};
pub use target::{open_reader, Credentials, Target};

use std::fmt;
use std::ops::ControlFlow;

/// One decoded device observation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Opaque device identity (MAC address, device key, ...)
    pub identifier: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Record {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            ..Default::default()
        }
    }

    /// Set both coordinates
    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Whether the source supplied any position data
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() || self.longitude.is_some()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: {} with coords: {} {}",
            self.identifier.as_deref().unwrap_or("<none>"),
            self.latitude.unwrap_or(0.0),
            self.longitude.unwrap_or(0.0)
        )
    }
}

/// Lazy stream of records produced by [`RecordReader::elements`]
pub type RecordStream<'a> = Box<dyn Iterator<Item = ReaderResult<Record>> + 'a>;

/// Capability set every backend client provides
///
/// The driver holds a `Box<dyn RecordReader>` and never needs to know which
/// backend it is talking to.
pub trait RecordReader {
    /// Short backend name for logs ("remote", "snapshot")
    fn backend(&self) -> &'static str;

    /// Start the single pass over the filtered records.
    ///
    /// A client hands out its stream once; a second call is a
    /// configuration error.
    fn elements(&mut self) -> ReaderResult<RecordStream<'_>>;

    /// Release the underlying connection or file handle.
    fn finish(self: Box<Self>) -> ReaderResult<()>;
}

/// Iterator adapter that ends the stream at the first error.
///
/// After yielding `None` or an `Err`, every later call returns `None`.
pub struct StopOnError<I> {
    inner: I,
    done: bool,
}

impl<I> StopOnError<I> {
    pub fn new(inner: I) -> Self {
        Self { inner, done: false }
    }
}

impl<I> Iterator for StopOnError<I>
where
    I: Iterator<Item = ReaderResult<Record>>,
{
    type Item = ReaderResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.inner.next() {
            Some(Ok(record)) => Some(Ok(record)),
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl<I: Iterator<Item = ReaderResult<Record>>> std::iter::FusedIterator for StopOnError<I> {}

/// Pull every record from `reader`, then finish it.
///
/// `visit` receives the 1-based record number and the record; returning
/// `ControlFlow::Break` stops early. `finish` runs exactly once on every
/// path. A failed `finish` after a clean pass is logged, not returned; after
/// a failed pass the pull error is returned.
pub fn drain<F>(mut reader: Box<dyn RecordReader>, mut visit: F) -> ReaderResult<usize>
where
    F: FnMut(usize, &Record) -> ControlFlow<()>,
{
    let backend = reader.backend();
    let outcome = pull_all(reader.as_mut(), &mut visit);

    if let Err(e) = reader.finish() {
        tracing::warn!(backend, error = %e, "Failed to release reader");
    } else {
        tracing::debug!(backend, "Reader released");
    }

    match &outcome {
        Ok(count) => tracing::info!(backend, count, "Finished reading records"),
        Err(e) => tracing::error!(backend, kind = e.kind(), "Reading stopped: {}", e),
    }

    outcome
}

fn pull_all<F>(reader: &mut dyn RecordReader, visit: &mut F) -> ReaderResult<usize>
where
    F: FnMut(usize, &Record) -> ControlFlow<()>,
{
    let mut count = 0;

    for record in reader.elements()? {
        let record = record?;
        count += 1;
        if visit(count, &record).is_break() {
            tracing::debug!(count, "Consumer stopped early");
            break;
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// In-memory reader that counts finish calls
    struct ScriptedReader {
        items: Vec<ReaderResult<Record>>,
        finished: Rc<Cell<usize>>,
        finish_fails: bool,
    }

    impl ScriptedReader {
        fn boxed(
            items: Vec<ReaderResult<Record>>,
            finished: &Rc<Cell<usize>>,
        ) -> Box<dyn RecordReader> {
            Box::new(Self {
                items,
                finished: Rc::clone(finished),
                finish_fails: false,
            })
        }
    }

    impl RecordReader for ScriptedReader {
        fn backend(&self) -> &'static str {
            "scripted"
        }

        fn elements(&mut self) -> ReaderResult<RecordStream<'_>> {
            let items = std::mem::take(&mut self.items);
            Ok(Box::new(StopOnError::new(items.into_iter())))
        }

        fn finish(self: Box<Self>) -> ReaderResult<()> {
            self.finished.set(self.finished.get() + 1);
            if self.finish_fails {
                Err(ReaderError::Connection("close failed".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_record_display() {
        let record = Record::new("AA:BB:CC:DD:EE:FF").at(51.5, -0.12);
        assert_eq!(
            record.to_string(),
            "ID: AA:BB:CC:DD:EE:FF with coords: 51.5 -0.12"
        );

        let bare = Record::default();
        assert!(!bare.has_position());
        assert_eq!(bare.to_string(), "ID: <none> with coords: 0 0");
    }

    #[test]
    fn test_stop_on_error_is_fused() {
        let items = vec![
            Ok(Record::new("a")),
            Err(ReaderError::Parse("bad".into())),
            Ok(Record::new("never")),
        ];
        let mut stream = StopOnError::new(items.into_iter());

        assert!(matches!(stream.next(), Some(Ok(_))));
        assert!(matches!(stream.next(), Some(Err(ReaderError::Parse(_)))));
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_sentinel_repeats() {
        let mut stream = StopOnError::new(vec![Ok(Record::new("a"))].into_iter());
        assert!(stream.next().is_some());
        for _ in 0..3 {
            assert!(stream.next().is_none());
        }
    }

    #[test]
    fn test_drain_counts_and_finishes() {
        let finished = Rc::new(Cell::new(0));
        let reader = ScriptedReader::boxed(
            vec![Ok(Record::new("a")), Ok(Record::new("b")), Ok(Record::new("c"))],
            &finished,
        );

        let mut seen = Vec::new();
        let count = drain(reader, |n, record| {
            seen.push((n, record.identifier.clone().unwrap()));
            ControlFlow::Continue(())
        })
        .unwrap();

        assert_eq!(count, 3);
        assert_eq!(seen[2], (3, "c".to_string()));
        assert_eq!(finished.get(), 1);
    }

    #[test]
    fn test_drain_error_on_third_pull_still_finishes() {
        let finished = Rc::new(Cell::new(0));
        let reader = ScriptedReader::boxed(
            vec![
                Ok(Record::new("a")),
                Ok(Record::new("b")),
                Err(ReaderError::Parse("row 3".into())),
                Ok(Record::new("d")),
            ],
            &finished,
        );

        let mut visited = 0;
        let result = drain(reader, |_, _| {
            visited += 1;
            ControlFlow::Continue(())
        });

        assert!(matches!(result, Err(ReaderError::Parse(_))));
        assert_eq!(visited, 2);
        assert_eq!(finished.get(), 1);
    }

    #[test]
    fn test_drain_early_stop() {
        let finished = Rc::new(Cell::new(0));
        let reader = ScriptedReader::boxed(
            vec![Ok(Record::new("a")), Ok(Record::new("b")), Ok(Record::new("c"))],
            &finished,
        );

        let count = drain(reader, |n, _| {
            if n == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(finished.get(), 1);
    }

    #[test]
    fn test_finish_failure_does_not_mask_success() {
        let finished = Rc::new(Cell::new(0));
        let reader: Box<dyn RecordReader> = Box::new(ScriptedReader {
            items: vec![Ok(Record::new("a"))],
            finished: Rc::clone(&finished),
            finish_fails: true,
        });

        let count = drain(reader, |_, _| ControlFlow::Continue(())).unwrap();
        assert_eq!(count, 1);
        assert_eq!(finished.get(), 1);
    }
}
