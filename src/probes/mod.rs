//! Readiness probes for freshly deployed services
//!
//! A probe configuration names any subset of HTTP, TCP and Postgres checks.
//! All configured checks run concurrently under one shared deadline; each is
//! retried on a fixed interval and every attempt has its own short timeout.
//! The first check that cannot succeed before the deadline fails the whole
//! probe and drops its siblings.

mod http;
mod postgres;
mod tcp;

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::{try_join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::generator::template::Templatable;

/// Overall deadline shared by all checks of one probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(40);

/// Upper bound for a single attempt
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between attempts of the same check
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Which checks to run; any subset may be set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpProbe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpProbe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresProbe>,
}

/// HEAD request; 2xx means ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpProbe {
    pub url: String,
}

/// Raw TCP connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpProbe {
    pub address: String,
}

/// Connect and run a query; rows are not validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresProbe {
    pub connection: String,
    pub query: String,
}

impl ProbesConfig {
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.tcp.is_none() && self.postgres.is_none()
    }
}

impl Templatable for ProbesConfig {
    fn templated_fields(&mut self) -> Vec<&mut String> {
        let mut fields = Vec::new();
        if let Some(http) = &mut self.http {
            fields.push(&mut http.url);
        }
        if let Some(tcp) = &mut self.tcp {
            fields.push(&mut tcp.address);
        }
        if let Some(pg) = &mut self.postgres {
            fields.push(&mut pg.connection);
            fields.push(&mut pg.query);
        }
        fields
    }
}

/// Timing knobs for a probe run
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub overall_timeout: Duration,
    pub attempt_timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            overall_timeout: DEFAULT_PROBE_TIMEOUT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Protocol of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Http,
    Tcp,
    Postgres,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeKind::Http => "http",
            ProbeKind::Tcp => "tcp",
            ProbeKind::Postgres => "postgres",
        };
        f.write_str(name)
    }
}

/// Final outcome of a failed probe
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{kind} probe for '{id}' did not succeed within {timeout:?}: {last_error}")]
    DeadlineExceeded {
        id: String,
        kind: ProbeKind,
        timeout: Duration,
        #[source]
        last_error: AttemptError,
    },

    #[error("{kind} probe for '{id}' was cancelled")]
    Cancelled { id: String, kind: ProbeKind },
}

/// Failure of a single attempt
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("{0}")]
    Other(String),
}

impl AttemptError {
    /// Classify an error by walking its source chain
    pub fn classify(err: &(dyn StdError + 'static)) -> Self {
        if is_connection_refused(err) {
            AttemptError::ConnectionRefused(err.to_string())
        } else {
            AttemptError::Other(err.to_string())
        }
    }

    /// Service not listening yet; expected while it starts
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::ConnectionRefused(_))
    }
}

/// True when any error in the chain is an I/O connection refusal
pub fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Probe with the default timing
pub async fn probe(
    id: &str,
    config: &ProbesConfig,
    cancel: &CancellationToken,
) -> Result<(), ProbeError> {
    probe_with(id, config, &ProbeSettings::default(), cancel).await
}

/// Run every configured check concurrently until all pass, one fails past
/// the deadline, or `cancel` fires
pub async fn probe_with(
    id: &str,
    config: &ProbesConfig,
    settings: &ProbeSettings,
    cancel: &CancellationToken,
) -> Result<(), ProbeError> {
    let deadline = Instant::now() + settings.overall_timeout;
    let mut checks: Vec<BoxFuture<'_, Result<(), ProbeError>>> = Vec::new();

    if let Some(cfg) = &config.http {
        let client = http::client(settings.attempt_timeout);
        checks.push(Box::pin(retry_until_deadline(
            id,
            ProbeKind::Http,
            settings,
            deadline,
            cancel,
            move || {
                let client = client.clone();
                let url = cfg.url.clone();
                async move { http::check(&client, &url).await }
            },
        )));
    }

    if let Some(cfg) = &config.tcp {
        checks.push(Box::pin(retry_until_deadline(
            id,
            ProbeKind::Tcp,
            settings,
            deadline,
            cancel,
            move || tcp::check(&cfg.address),
        )));
    }

    if let Some(cfg) = &config.postgres {
        checks.push(Box::pin(retry_until_deadline(
            id,
            ProbeKind::Postgres,
            settings,
            deadline,
            cancel,
            move || postgres::check(&cfg.connection, &cfg.query),
        )));
    }

    if checks.is_empty() {
        debug!("No probes configured for '{}'", id);
        return Ok(());
    }

    let count = checks.len();
    try_join_all(checks).await?;
    info!("All {} probe(s) for '{}' succeeded", count, id);
    Ok(())
}

async fn retry_until_deadline<F, Fut>(
    id: &str,
    kind: ProbeKind,
    settings: &ProbeSettings,
    deadline: Instant,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<(), ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), AttemptError>>,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProbeError::Cancelled { id: id.to_string(), kind });
            }
            r = timeout(settings.attempt_timeout, attempt()) => {
                r.unwrap_or(Err(AttemptError::Timeout(settings.attempt_timeout)))
            }
        };

        let err = match result {
            Ok(()) => {
                debug!("{} probe for '{}' succeeded after {} attempt(s)", kind, id, attempts);
                return Ok(());
            }
            Err(e) => e,
        };

        if err.is_retryable() {
            debug!("{} probe for '{}' not ready yet (attempt {}): {}", kind, id, attempts, err);
        } else {
            warn!("{} probe for '{}' failed (attempt {}): {}", kind, id, attempts, err);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ProbeError::DeadlineExceeded {
                id: id.to_string(),
                kind,
                timeout: settings.overall_timeout,
                last_error: err,
            });
        }

        let wake = (now + settings.retry_interval).min(deadline);
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProbeError::Cancelled { id: id.to_string(), kind });
            }
            _ = sleep_until(wake) => {}
        }
    }
}
