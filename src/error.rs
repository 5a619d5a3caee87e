//! Error types for the certificate database client

use std::time::Duration;

use thiserror::Error;

/// Failures while talking to the certificate database
#[derive(Debug, Error)]
pub enum LookupError {
    /// Opening the connection failed
    #[error("failed to connect to {host}:{port}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },

    /// Opening the connection did not finish in time
    #[error("timed out after {timeout:?} connecting to {host}:{port}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// Connection opened but did not answer a ping
    #[error("failed to ping database")]
    Ping(#[source] sqlx::Error),

    /// The server rejected the statement
    #[error("failed to prepare statement")]
    Prepare(#[source] sqlx::Error),

    /// Statement execution failed before any row arrived
    #[error("query failed")]
    Query(#[source] sqlx::Error),

    /// Deadline elapsed before the result set was consumed
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// Cursor failed after rows started arriving
    #[error("row iteration failed")]
    Iteration(#[source] sqlx::Error),
}
