//! Backend selection
//!
//! Exactly one backend is used per run. [`Target::select`] enforces that,
//! and [`open_reader`] builds the matching client behind the
//! [`RecordReader`](super::RecordReader) trait.

use super::{ReaderError, ReaderResult, RecordReader};
use crate::config::Config;
use crate::filter::{FilterDescriptor, FilterMode};
use crate::remote::{parse_base_url, RemoteQueryClient};
use crate::snapshot::SnapshotQueryClient;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where records come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Live Kismet REST API
    Remote { url: String },
    /// Kismet SQLite log on disk
    Snapshot { path: PathBuf },
}

impl Target {
    /// Pick the backend from the two optional connection targets.
    ///
    /// Empty values count as absent. Supplying both or neither is a
    /// configuration error.
    pub fn select(rest_url: Option<&str>, db_file: Option<&Path>) -> ReaderResult<Self> {
        let rest_url = rest_url.filter(|u| !u.trim().is_empty());
        let db_file = db_file.filter(|p| !p.as_os_str().is_empty());

        match (rest_url, db_file) {
            (Some(url), None) => Ok(Target::Remote {
                url: url.trim().to_string(),
            }),
            (None, Some(path)) => Ok(Target::Snapshot {
                path: path.to_path_buf(),
            }),
            (Some(_), Some(_)) => Err(ReaderError::Configuration(
                "choose either a REST URL or a database file, not both".to_string(),
            )),
            (None, None) => Err(ReaderError::Configuration(
                "choose either a REST URL or a database file".to_string(),
            )),
        }
    }

    /// Filter dialect this backend understands
    pub fn filter_mode(&self) -> FilterMode {
        match self {
            Target::Remote { .. } => FilterMode::Remote,
            Target::Snapshot { .. } => FilterMode::Snapshot,
        }
    }

    /// Checks that need no I/O, run before prompting for credentials
    pub fn validate(&self) -> ReaderResult<()> {
        match self {
            Target::Remote { url } => parse_base_url(url).map(|_| ()),
            Target::Snapshot { .. } => Ok(()),
        }
    }

    pub fn needs_credentials(&self) -> bool {
        matches!(self, Target::Remote { .. })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Remote { url } => write!(f, "Kismet at {}", url),
            Target::Snapshot { path } => write!(f, "snapshot {}", path.display()),
        }
    }
}

/// Username and password for the remote service
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Both parts are mandatory
    pub fn validate(&self) -> ReaderResult<()> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ReaderError::Configuration(
                "a username and password are required for the REST API".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Build the client for `target`.
///
/// `filter` must be in the target's dialect; `credentials` are required for
/// a remote target and ignored otherwise.
pub fn open_reader(
    target: &Target,
    filter: FilterDescriptor,
    credentials: Option<&Credentials>,
    config: &Config,
) -> ReaderResult<Box<dyn RecordReader>> {
    tracing::debug!(%target, "Opening reader");

    match (target, filter) {
        (Target::Remote { url }, FilterDescriptor::Remote(filter)) => {
            let credentials = credentials.ok_or_else(|| {
                ReaderError::Configuration("the REST API needs credentials".to_string())
            })?;
            let client = RemoteQueryClient::open(url, credentials, filter, &config.remote)?;
            Ok(Box::new(client))
        }
        (Target::Snapshot { path }, FilterDescriptor::Snapshot(filter)) => {
            let client = SnapshotQueryClient::open(path, filter, &config.snapshot)?;
            Ok(Box::new(client))
        }
        (target, filter) => Err(ReaderError::Configuration(format!(
            "{:?} filter cannot be used with {}",
            filter, target
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{parse_filter, RemoteFilter, SnapshotFilter};

    #[test]
    fn test_select_exactly_one() {
        assert_eq!(
            Target::select(Some("http://localhost:2501"), None).unwrap(),
            Target::Remote {
                url: "http://localhost:2501".to_string()
            }
        );
        assert_eq!(
            Target::select(None, Some(Path::new("capture.kismet"))).unwrap(),
            Target::Snapshot {
                path: PathBuf::from("capture.kismet")
            }
        );

        assert!(matches!(
            Target::select(Some("http://localhost:2501"), Some(Path::new("capture.kismet"))),
            Err(ReaderError::Configuration(_))
        ));
        assert!(matches!(
            Target::select(None, None),
            Err(ReaderError::Configuration(_))
        ));
        assert!(matches!(
            Target::select(Some(""), Some(Path::new(""))),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_runs_without_io() {
        let ftp = Target::select(Some("ftp://host/api"), None).unwrap();
        assert!(matches!(ftp.validate(), Err(ReaderError::Configuration(_))));
        assert!(ftp.needs_credentials());

        let snapshot = Target::select(None, Some(Path::new("/does/not/exist"))).unwrap();
        assert!(snapshot.validate().is_ok());
        assert!(!snapshot.needs_credentials());
        assert_eq!(snapshot.filter_mode(), FilterMode::Snapshot);
    }

    #[test]
    fn test_credentials() {
        assert!(Credentials::new("kismet", "secret").validate().is_ok());
        assert!(Credentials::new("", "secret").validate().is_err());
        assert!(Credentials::new("kismet", "").validate().is_err());

        let shown = format!("{:?}", Credentials::new("kismet", "secret"));
        assert!(shown.contains("kismet"));
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn test_mismatched_filter_dialect() {
        let target = Target::select(None, Some(Path::new("capture.kismet"))).unwrap();
        let filter =
            FilterDescriptor::Remote(RemoteFilter::parse("kismet.device.base.macaddr").unwrap());
        assert!(matches!(
            open_reader(&target, filter, None, &Config::default()),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_remote_without_credentials() {
        let target = Target::select(Some("http://localhost:2501"), None).unwrap();
        let filter = parse_filter("kismet.device.base.macaddr", target.filter_mode()).unwrap();
        assert!(matches!(
            open_reader(&target, filter, None, &Config::default()),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_opens_snapshot_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.kismet");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE devices (devmac TEXT, avg_lat REAL, avg_lon REAL);
             INSERT INTO devices VALUES ('AA:BB:CC:DD:EE:01', 1.5, 2.5);",
        )
        .unwrap();
        drop(conn);

        let target = Target::select(None, Some(path.as_path())).unwrap();
        let filter = FilterDescriptor::Snapshot(
            SnapshotFilter::parse("devices/devmac devices/avg_lat devices/avg_lon").unwrap(),
        );
        let mut reader = open_reader(&target, filter, None, &Config::default()).unwrap();
        assert_eq!(reader.backend(), "snapshot");

        let records: Vec<_> = reader.elements().unwrap().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().latitude, Some(1.5));
        reader.finish().unwrap();
    }
}
