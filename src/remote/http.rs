//! HTTP device source for the Kismet REST API
//!
//! Authenticates with HTTP basic auth against `/session/check_login`, then
//! pages through `/devices/views/{view}/devices.json` using Kismet's
//! datatable paging (`start` / `length`).
//!
//! Calls are blocking: the source owns a current-thread Tokio runtime and
//! blocks on each request. Callers already inside a Tokio runtime are
//! supported; see [`KismetHttpSource::connect`].

use super::{DevicePage, DeviceSource};
use crate::config::RemoteConfig;
use crate::reader::{Credentials, ReaderError, ReaderResult};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Check that `address` is an absolute `http` or `https` URL.
///
/// Runs before any network activity.
pub fn parse_base_url(address: &str) -> ReaderResult<Url> {
    let url = Url::parse(address).map_err(|e| {
        ReaderError::Configuration(format!("'{}' is not a valid URL: {}", address, e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ReaderError::Configuration(format!(
            "URL '{}' uses unsupported scheme '{}'; expected http or https",
            address, other
        ))),
    }
}

/// Kismet REST session
pub struct KismetHttpSource {
    client: Client,
    // Taken on drop so shutdown never blocks an async caller
    runtime: Option<Runtime>,
    base_url: Url,
    credentials: Credentials,
    view: String,
    page_size: usize,
}

impl std::fmt::Debug for KismetHttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KismetHttpSource")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .field("view", &self.view)
            .field("page_size", &self.page_size)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl KismetHttpSource {
    /// Validate the target, then log in.
    ///
    /// URL, credentials and paging settings are checked before the first
    /// request is sent.
    ///
    /// # Runtime requirements
    ///
    /// None. Outside Tokio the source blocks on its own runtime. Inside a
    /// multi-threaded runtime the request runs under `block_in_place`. Inside
    /// a `current_thread` runtime it runs on a scoped helper thread, which
    /// blocks the caller's runtime for the duration of the request.
    pub fn connect(
        address: &str,
        credentials: &Credentials,
        config: &RemoteConfig,
    ) -> ReaderResult<Self> {
        let base_url = parse_base_url(address)?;
        credentials.validate()?;

        if config.page_size == 0 {
            return Err(ReaderError::Configuration(
                "remote page_size must be at least 1".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ReaderError::Connection(format!("failed to build HTTP client: {}", e)))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ReaderError::Connection(format!("failed to start I/O runtime: {}", e)))?;

        let source = Self {
            client,
            runtime: Some(runtime),
            base_url,
            credentials: credentials.clone(),
            view: config.view.clone(),
            page_size: config.page_size,
        };

        source.blocking(|| source.check_login())?;
        tracing::info!(
            url = %source.base_url,
            user = source.credentials.username(),
            "Logged in to Kismet"
        );

        Ok(source)
    }

    /// Drive one request to completion on the source's own runtime
    fn blocking<T, F>(&self, request: impl FnOnce() -> F + Send) -> ReaderResult<T>
    where
        F: Future<Output = ReaderResult<T>>,
        T: Send,
    {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| ReaderError::Connection("Kismet session is closed".to_string()))?;

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| runtime.block_on(request()))
            }
            // block_on would panic on this thread; move to one outside the runtime
            Ok(_) => std::thread::scope(|scope| {
                scope
                    .spawn(|| runtime.block_on(request()))
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            }),
            Err(_) => runtime.block_on(request()),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn check_login(&self) -> ReaderResult<()> {
        let url = self.endpoint("session/check_login");

        let response = self
            .client
            .get(&url)
            .basic_auth(self.credentials.username(), Some(self.credentials.password()))
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        check_status(&url, response.status(), self.credentials.username())
    }

    async fn fetch_page_async(&self, fields: &[String], start: usize) -> ReaderResult<DevicePage> {
        let url = self.endpoint(&format!("devices/views/{}/devices.json", self.view));

        let query = DeviceQuery {
            fields,
            datatable: true,
            start,
            length: self.page_size,
        };
        let body = serde_json::to_string(&query)
            .map_err(|e| ReaderError::Configuration(format!("failed to encode query: {}", e)))?;

        let response = self
            .client
            .post(&url)
            .basic_auth(self.credentials.username(), Some(self.credentials.password()))
            .form(&[("json", body)])
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        check_status(&url, response.status(), self.credentials.username())?;

        let listing: DeviceListing = response.json().await.map_err(|e| {
            if e.is_decode() {
                ReaderError::Parse(format!("{} returned an unreadable device listing: {}", url, e))
            } else {
                transport_error(&url, e)
            }
        })?;

        Ok(listing.into_page(start, self.page_size))
    }
}

impl DeviceSource for KismetHttpSource {
    fn fetch_page(&mut self, fields: &[String], start: usize) -> ReaderResult<DevicePage> {
        let source = &*self;
        source.blocking(|| source.fetch_page_async(fields, start))
    }

    fn close(self) -> ReaderResult<()> {
        tracing::debug!(url = %self.base_url, "Closing Kismet session");
        Ok(())
    }
}

impl Drop for KismetHttpSource {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn check_status(url: &str, status: StatusCode, username: &str) -> ReaderResult<()> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(ReaderError::Authentication(format!(
            "{} rejected the credentials for '{}' ({})",
            url, username, status
        )))
    } else {
        Err(ReaderError::Connection(format!("{} returned {}", url, status)))
    }
}

fn transport_error(url: &str, error: reqwest::Error) -> ReaderError {
    if error.is_timeout() {
        ReaderError::Connection(format!("request to {} timed out", url))
    } else {
        ReaderError::Connection(format!("request to {} failed: {}", url, error))
    }
}

/// Body of the `json` form field sent to the device view endpoint
#[derive(Debug, Serialize)]
struct DeviceQuery<'a> {
    fields: &'a [String],
    datatable: bool,
    start: usize,
    length: usize,
}

/// Device view response: datatable envelope, or a bare list from servers
/// that ignore the paging parameters
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceListing {
    Table {
        #[serde(rename = "recordsFiltered", default)]
        records_filtered: Option<usize>,
        data: Vec<Value>,
    },
    List(Vec<Value>),
}

impl DeviceListing {
    fn into_page(self, start: usize, page_size: usize) -> DevicePage {
        match self {
            DeviceListing::Table {
                records_filtered,
                data,
            } => {
                let last = data.is_empty()
                    || match records_filtered {
                        Some(total) => start + data.len() >= total,
                        None => data.len() < page_size,
                    };
                DevicePage {
                    entries: data,
                    last,
                }
            }
            DeviceListing::List(entries) => DevicePage {
                entries,
                last: true,
            },
        }
    }
}
