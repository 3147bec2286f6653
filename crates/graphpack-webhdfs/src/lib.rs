// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! WebHDFS-backed [`BlockSink`] for graphpack partitions.
//!
//! Each partition is one remote file. The file is created (overwritten) when
//! the sink is opened; appended records are buffered locally and shipped with
//! the two-step WebHDFS `APPEND` protocol once the buffer passes the commit
//! threshold, and unconditionally on [`BlockSink::finish`].
//!
//! Both `CREATE` and `APPEND` are answered by the name node with a
//! `307 Temporary Redirect` to a data node. Redirects are followed by hand so
//! the payload is only sent once.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

use std::time::Duration;

use graphpack_core::{BlockSink, SinkError};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Method, Url};
use thiserror::Error;
use tracing::{debug, info};

/// Default number of buffered bytes that triggers an `APPEND`.
pub const DEFAULT_COMMIT_THRESHOLD: usize = 4 * 1024 * 1024;

/// WebHDFS protocol failures.
#[derive(Debug, Error)]
pub enum WebHdfsError {
    /// The endpoint is not a usable base URL.
    #[error("invalid WebHDFS endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// Parse failure.
        reason: String,
    },

    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The name node did not redirect to a data node.
    #[error("{op}: expected a redirect to a data node, got status {status}")]
    MissingRedirect {
        /// Operation name.
        op: &'static str,
        /// Status returned instead.
        status: u16,
    },

    /// The data node rejected the payload.
    #[error("{op}: data node answered {status}: {body}")]
    Status {
        /// Operation name.
        op: &'static str,
        /// HTTP status.
        status: u16,
        /// Response body, if any.
        body: String,
    },
}

/// File operations used by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `PUT ?op=CREATE&overwrite=true`.
    Create,
    /// `POST ?op=APPEND`.
    Append,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Append => "APPEND",
        }
    }

    fn method(self) -> Method {
        match self {
            Self::Create => Method::PUT,
            Self::Append => Method::POST,
        }
    }
}

/// Builds the name-node URL for `op` on `path`.
///
/// `endpoint` is the name node's HTTP address (for example
/// `http://namenode:9870`); `path` is the absolute remote file path.
pub fn operation_url(
    endpoint: &str,
    path: &str,
    op: Operation,
    user: Option<&str>,
) -> Result<Url, WebHdfsError> {
    let invalid = |reason: String| WebHdfsError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason,
    };
    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("not a base URL".to_owned()));
    }

    let base = url.path().trim_end_matches('/').to_owned();
    let file = path.trim_start_matches('/');
    url.set_path(&format!("{base}/webhdfs/v1/{file}"));
    {
        let mut query = url.query_pairs_mut();
        query.clear().append_pair("op", op.name());
        if op == Operation::Create {
            query.append_pair("overwrite", "true");
        }
        if let Some(user) = user.filter(|u| !u.is_empty()) {
            query.append_pair("user.name", user);
        }
    }
    Ok(url)
}

/// Connection settings shared by every partition sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebHdfsConfig {
    /// Name node HTTP address.
    pub endpoint: String,
    /// `user.name` sent with every request (simple authentication).
    pub user: Option<String>,
    /// Buffered bytes that trigger an `APPEND` on flush.
    pub commit_threshold: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl WebHdfsConfig {
    /// Settings for `endpoint` with default threshold and timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user: None,
            commit_threshold: DEFAULT_COMMIT_THRESHOLD,
            timeout: Duration::from_secs(60),
        }
    }

    /// Sets the `user.name` parameter.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the commit threshold.
    pub fn with_commit_threshold(mut self, bytes: usize) -> Self {
        self.commit_threshold = bytes;
        self
    }
}

/// Bytes waiting to be appended to the remote file.
#[derive(Debug, Default)]
struct PendingAppend {
    bytes: Vec<u8>,
    threshold: usize,
}

impl PendingAppend {
    fn new(threshold: usize) -> Self {
        Self {
            bytes: Vec::new(),
            threshold,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Takes the buffer if it is due, or if `force` and it is non-empty.
    fn take(&mut self, force: bool) -> Option<Vec<u8>> {
        let due = self.bytes.len() >= self.threshold.max(1) || (force && !self.bytes.is_empty());
        due.then(|| std::mem::take(&mut self.bytes))
    }
}

/// One remote partition file.
#[derive(Debug)]
pub struct WebHdfsSink {
    client: Client,
    config: WebHdfsConfig,
    path: String,
    target: String,
    pending: PendingAppend,
    committed: u64,
}

impl WebHdfsSink {
    /// Creates (or overwrites) the remote file at `path`.
    pub fn create(config: WebHdfsConfig, path: impl Into<String>) -> Result<Self, SinkError> {
        let path = path.into();
        let target = format!("{}{}", config.endpoint.trim_end_matches('/'), path);
        let open = |err: WebHdfsError| SinkError::Remote {
            target: target.clone(),
            message: err.to_string(),
        };
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .build()
            .map_err(|e| open(e.into()))?;

        let sink = Self {
            client,
            pending: PendingAppend::new(config.commit_threshold),
            config,
            path,
            target: target.clone(),
            committed: 0,
        };
        sink.send(Operation::Create, Vec::new()).map_err(open)?;
        info!(sink = %sink.target, "opened remote partition");
        Ok(sink)
    }

    /// Bytes delivered to the remote file so far.
    pub fn committed_bytes(&self) -> u64 {
        self.committed
    }

    fn send(&self, op: Operation, body: Vec<u8>) -> Result<(), WebHdfsError> {
        let url = operation_url(
            &self.config.endpoint,
            &self.path,
            op,
            self.config.user.as_deref(),
        )?;
        let first = self.client.request(op.method(), url).send()?;
        let status = first.status();
        let location = first
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|_| status.is_redirection())
            .ok_or(WebHdfsError::MissingRedirect {
                op: op.name(),
                status: status.as_u16(),
            })?
            .to_owned();

        let len = body.len();
        let second = self
            .client
            .request(op.method(), location.as_str())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()?;
        let status = second.status();
        if !status.is_success() {
            return Err(WebHdfsError::Status {
                op: op.name(),
                status: status.as_u16(),
                body: second.text().unwrap_or_default(),
            });
        }
        debug!(sink = %self.target, op = op.name(), bytes = len, "remote write done");
        Ok(())
    }

    fn commit(&mut self, force: bool) -> Result<(), SinkError> {
        let Some(bytes) = self.pending.take(force) else {
            return Ok(());
        };
        let len = bytes.len() as u64;
        self.send(Operation::Append, bytes)
            .map_err(|err| SinkError::Remote {
                target: self.target.clone(),
                message: err.to_string(),
            })?;
        self.committed += len;
        Ok(())
    }
}

impl BlockSink for WebHdfsSink {
    fn target(&self) -> &str {
        &self.target
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.pending.push(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.commit(false)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.commit(true)
    }
}
