//! Remote Kismet client
//!
//! Streams device records from a live Kismet server.
//!
//! ## Architecture
//!
//! - **DeviceSource**: fetches one page of raw device entries
//! - **KismetHttpSource**: the REST implementation of `DeviceSource`
//! - **RemoteQueryClient**: turns pages into a lazy record stream
//!
//! ## Data Flow
//!
//! 1. `open` validates the URL and logs in
//! 2. `elements` fetches the first page
//! 3. each pull drains the buffered page, fetching the next page only when
//!    the buffer is empty and the previous page was not marked `last`
//! 4. `finish` closes the session

mod decode;
mod http;

pub use http::{parse_base_url, KismetHttpSource};

use crate::config::RemoteConfig;
use crate::filter::RemoteFilter;
use crate::reader::{
    Credentials, ReaderError, ReaderResult, Record, RecordReader, RecordStream, StopOnError,
};
use decode::decode_device;
use serde_json::Value;

/// One page of raw device entries
#[derive(Debug, Clone, Default)]
pub struct DevicePage {
    pub entries: Vec<Value>,
    /// No further pages follow this one
    pub last: bool,
}

/// Paged access to a device listing
///
/// `fetch_page` may return empty pages that are not `last`; the client keeps
/// fetching until a page says otherwise.
pub trait DeviceSource {
    /// Fetch the page starting at entry offset `start`, restricted to `fields`
    fn fetch_page(&mut self, fields: &[String], start: usize) -> ReaderResult<DevicePage>;

    /// Release the session
    fn close(self) -> ReaderResult<()>;
}

/// Record reader backed by a remote device listing
pub struct RemoteQueryClient<S: DeviceSource = KismetHttpSource> {
    source: Option<S>,
    filter: RemoteFilter,
    streamed: bool,
}

impl RemoteQueryClient<KismetHttpSource> {
    /// Connect to the Kismet server at `address` and log in.
    ///
    /// A malformed or non-HTTP(S) address fails before any request is made.
    pub fn open(
        address: &str,
        credentials: &Credentials,
        filter: RemoteFilter,
        config: &RemoteConfig,
    ) -> ReaderResult<Self> {
        let source = KismetHttpSource::connect(address, credentials, config)?;
        tracing::debug!(fields = ?filter.fields(), "Remote device query prepared");
        Ok(Self::with_source(source, filter))
    }
}

impl<S: DeviceSource> RemoteQueryClient<S> {
    /// Build a client over an already-connected source
    pub fn with_source(source: S, filter: RemoteFilter) -> Self {
        Self {
            source: Some(source),
            filter,
            streamed: false,
        }
    }
}

impl<S: DeviceSource + 'static> RecordReader for RemoteQueryClient<S> {
    fn backend(&self) -> &'static str {
        "remote"
    }

    fn elements(&mut self) -> ReaderResult<RecordStream<'_>> {
        if self.streamed {
            return Err(ReaderError::Configuration(
                "remote records were already streamed; open a new client".to_string(),
            ));
        }

        let source = self.source.as_mut().ok_or_else(|| {
            ReaderError::Connection("remote session is already closed".to_string())
        })?;
        self.streamed = true;

        let fields = self.filter.fields();
        let first = source.fetch_page(fields, 0)?;
        tracing::debug!(
            entries = first.entries.len(),
            last = first.last,
            "Fetched first device page"
        );

        Ok(Box::new(StopOnError::new(PagedDevices {
            source,
            fields,
            next_start: first.entries.len(),
            exhausted: first.last,
            buffered: first.entries.into_iter(),
        })))
    }

    fn finish(mut self: Box<Self>) -> ReaderResult<()> {
        match self.source.take() {
            Some(source) => source.close(),
            None => Ok(()),
        }
    }
}

impl<S: DeviceSource> Drop for RemoteQueryClient<S> {
    fn drop(&mut self) {
        if let Some(source) = self.source.take() {
            tracing::debug!("Remote client dropped without finish; closing session");
            if let Err(e) = source.close() {
                tracing::warn!("Failed to close remote session: {}", e);
            }
        }
    }
}

/// Pull-driven walk over the pages of a device listing
struct PagedDevices<'a, S> {
    source: &'a mut S,
    fields: &'a [String],
    buffered: std::vec::IntoIter<Value>,
    next_start: usize,
    exhausted: bool,
}

impl<S: DeviceSource> Iterator for PagedDevices<'_, S> {
    type Item = ReaderResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffered.next() {
                return Some(decode_device(&entry));
            }

            if self.exhausted {
                return None;
            }

            match self.source.fetch_page(self.fields, self.next_start) {
                Ok(page) => {
                    tracing::debug!(
                        start = self.next_start,
                        entries = page.entries.len(),
                        last = page.last,
                        "Fetched device page"
                    );
                    self.next_start += page.entries.len();
                    self.exhausted = page.last;
                    self.buffered = page.entries.into_iter();
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
