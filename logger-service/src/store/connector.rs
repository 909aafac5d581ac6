//! Store connector.
//!
//! Opens the single MongoDB client used by the process and proves it live
//! with a `ping` before handing it out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use super::error::ConnectionError;
use crate::config::StoreConfig;

const APP_NAME: &str = "logger-service";

/// Server error codes that mean the credentials were refused.
const AUTH_FAILURE_CODES: &[i32] = &[13, 18];

/// Outcome of [`ConnectionHandle::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    AlreadyClosed,
}

/// A live, validated connection to the document store.
///
/// The driver client pools connections internally, so one handle serves
/// every transport in the process.
pub struct ConnectionHandle {
    client: Client,
    database: String,
    endpoint: String,
    server_selection_timeout: Duration,
    released: AtomicBool,
}

impl ConnectionHandle {
    fn new(client: Client, config: &StoreConfig) -> Self {
        Self {
            client,
            database: config.database.clone(),
            endpoint: config.endpoint.clone(),
            server_selection_timeout: config.server_selection_timeout,
            released: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn server_selection_timeout(&self) -> Duration {
        self.server_selection_timeout
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Logical database all collections live in.
    pub(crate) fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    /// Round-trip liveness probe.
    pub async fn ping(&self) -> Result<(), ConnectionError> {
        self.database()
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(classify)
    }

    /// Shut the client down, waiting at most `deadline`.
    ///
    /// Only the first call does any work; later calls report
    /// [`ReleaseOutcome::AlreadyClosed`].
    pub async fn release(&self, deadline: Duration) -> Result<ReleaseOutcome, ConnectionError> {
        if self.released.swap(true, Ordering::SeqCst) {
            debug!(endpoint = %self.endpoint, "Store connection already released");
            return Ok(ReleaseOutcome::AlreadyClosed);
        }

        let client = self.client.clone();
        match timeout(deadline, async move { client.shutdown().await }).await {
            Ok(()) => {
                info!(endpoint = %self.endpoint, "Store connection released");
                Ok(ReleaseOutcome::Released)
            }
            Err(_) => {
                warn!(endpoint = %self.endpoint, ?deadline, "Store connection release timed out");
                Err(ConnectionError::Timeout {
                    operation: "release",
                    after: deadline,
                })
            }
        }
    }
}

/// Connect to the store and verify it answers a ping.
///
/// Makes exactly one attempt. Both steps share a deadline of
/// `connect_timeout + server_selection_timeout`.
pub async fn connect(config: &StoreConfig) -> Result<ConnectionHandle, ConnectionError> {
    let budget = config.connect_deadline();
    let deadline = Instant::now() + budget;
    let uri = config.uri();

    info!(uri = %config.redacted_uri(), "Connecting to document store");

    let mut options = timeout_at(deadline, async { ClientOptions::parse(uri.as_str()).await })
        .await
        .map_err(|_| ConnectionError::Timeout {
            operation: "connect",
            after: budget,
        })?
        .map_err(classify)?;

    options.app_name = Some(APP_NAME.to_string());
    options.connect_timeout = Some(config.connect_timeout);
    options.server_selection_timeout = Some(config.server_selection_timeout);

    let client = Client::with_options(options).map_err(classify)?;
    let handle = ConnectionHandle::new(client, config);

    match timeout_at(deadline, handle.ping()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(error = %e, "Document store liveness probe failed");
            return Err(e);
        }
        Err(_) => {
            warn!(?budget, "Document store liveness probe timed out");
            return Err(ConnectionError::Timeout {
                operation: "ping",
                after: budget,
            });
        }
    }

    info!(endpoint = %config.endpoint, "Connected to document store");
    Ok(handle)
}

fn classify(err: mongodb::error::Error) -> ConnectionError {
    let message = err.to_string();
    match err.kind.as_ref() {
        ErrorKind::Authentication { .. } => ConnectionError::Unauthenticated(message),
        ErrorKind::Command(command) if AUTH_FAILURE_CODES.contains(&command.code) => {
            ConnectionError::Unauthenticated(message)
        }
        ErrorKind::InvalidArgument { .. } => ConnectionError::InvalidOptions(message),
        _ => ConnectionError::Unreachable(message),
    }
}
