//! # kismet-extract
//!
//! Stream device records out of Kismet, either live from its REST API or
//! from a `.kismet` SQLite log captured earlier.
//!
//! ## Features
//!
//! - **One contract, two backends**: both clients implement [`RecordReader`]
//! - **Lazy**: records are pulled one at a time; remote pages and snapshot
//!   batches are fetched on demand
//! - **Strict filters**: each backend validates its own filter dialect
//!   before any I/O
//! - **Read-only**: nothing is ever written to either backend
//!
//! ## Modules
//!
//! - [`filter`]: filter string parsing for both dialects
//! - [`reader`]: the shared reader trait, records, errors and backend selection
//! - [`remote`]: Kismet REST client
//! - [`snapshot`]: Kismet SQLite log client
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kismet_extract::{drain, open_reader, parse_filter, Config, Target};
//! use std::ops::ControlFlow;
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let target = Target::select(None, Some(Path::new("capture.kismet")))?;
//!     let filter = parse_filter(
//!         "devices/devmac devices/avg_lat devices/avg_lon",
//!         target.filter_mode(),
//!     )?;
//!
//!     let reader = open_reader(&target, filter, None, &Config::default())?;
//!     let count = drain(reader, |n, record| {
//!         println!("Got Elem {} {}", n, record);
//!         ControlFlow::Continue(())
//!     })?;
//!
//!     println!("Read {} devices", count);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod filter;
pub mod reader;
pub mod remote;
pub mod snapshot;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError, LoggingConfig, RemoteConfig, SnapshotConfig};

pub use filter::{parse_filter, FilterDescriptor, FilterMode, RemoteFilter, SnapshotFilter};

pub use reader::{
    drain, open_reader, Credentials, ReaderError, ReaderResult, Record, RecordReader,
    RecordStream, Target,
};

pub use remote::{DevicePage, DeviceSource, KismetHttpSource, RemoteQueryClient};

pub use snapshot::SnapshotQueryClient;
