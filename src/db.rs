//! Client for the crt.sh certificate-transparency database.
//!
//! One connection, one prepared statement. The statement matches name
//! suffixes by comparing reversed strings so the server can use its
//! `reverse(lower(NAME_VALUE))` index for a leading-wildcard pattern.

use futures::{Stream, TryStreamExt};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgStatement};
use sqlx::{Connection, Executor, Row, Statement};
use tracing::debug;

use crate::config::DatabaseSettings;
use crate::error::LookupError;
use crate::lookup::NameSource;

pub const COMMON_NAME_QUERY: &str = r#"
    SELECT ci.NAME_VALUE
    FROM certificate_and_identities ci
    WHERE ci.NAME_TYPE = 'commonName'
    AND reverse(lower(ci.NAME_VALUE)) LIKE reverse(lower($1))
"#;

pub struct Client {
    conn: PgConnection,
    statement: PgStatement<'static>,
}

impl Client {
    /// Connect, verify the connection with a ping and prepare the lookup
    /// statement. Any failure here is fatal for the process.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, LookupError> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .database(&settings.name)
            .ssl_mode(settings.ssl_mode);

        debug!(host = %settings.host, port = settings.port, "connecting to database");
        let mut conn = match tokio::time::timeout(
            settings.connect_timeout,
            PgConnection::connect_with(&options),
        )
        .await
        {
            Ok(result) => result.map_err(|source| LookupError::Connect {
                host: settings.host.clone(),
                port: settings.port,
                source,
            })?,
            Err(_) => {
                return Err(LookupError::ConnectTimeout {
                    host: settings.host.clone(),
                    port: settings.port,
                    timeout: settings.connect_timeout,
                })
            }
        };

        conn.ping().await.map_err(LookupError::Ping)?;

        let statement = conn
            .prepare(COMMON_NAME_QUERY)
            .await
            .map_err(LookupError::Prepare)?;
        debug!("prepared common name statement");

        Ok(Self { conn, statement })
    }

    /// Fetch every common name matching `pattern`. See [`collect_names`]
    /// for how row and cursor failures are handled.
    pub async fn fetch_common_names(&mut self, pattern: &str) -> Result<Vec<String>, LookupError> {
        let rows = self
            .statement
            .query()
            .bind(pattern.to_string())
            .fetch(&mut self.conn);

        let names = collect_names(rows, |row: &PgRow| row.try_get::<String, _>(0_usize)).await?;
        debug!(rows = names.len(), "fetched common names");
        Ok(names)
    }

    /// Release the statement, then close the connection.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        let Self { conn, statement } = self;
        drop(statement);
        conn.close().await
    }
}

/// Drain `rows`, decoding each into a name.
///
/// Rows that fail to decode are skipped. An error before the first row is a
/// query failure; an error after rows started arriving is an iteration
/// failure and discards what was collected.
async fn collect_names<S, R, F>(mut rows: S, decode: F) -> Result<Vec<String>, LookupError>
where
    S: Stream<Item = Result<R, sqlx::Error>> + Unpin,
    F: Fn(&R) -> Result<String, sqlx::Error>,
{
    let mut names = Vec::with_capacity(100);
    let mut started = false;
    loop {
        match rows.try_next().await {
            Ok(Some(row)) => {
                started = true;
                match decode(&row) {
                    Ok(name) => names.push(name),
                    Err(err) => debug!(error = %err, "skipping unreadable row"),
                }
            }
            Ok(None) => break,
            Err(err) if !started => return Err(LookupError::Query(err)),
            Err(err) => return Err(LookupError::Iteration(err)),
        }
    }
    Ok(names)
}

impl NameSource for Client {
    async fn fetch_names(&mut self, pattern: &str) -> Result<Vec<String>, LookupError> {
        self.fetch_common_names(pattern).await
    }
}
