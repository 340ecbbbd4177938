use std::time::Duration;

use domain::{ConnectionInfo, ContainerHandle, CoreError, Solution, SolutionDeriver};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{Connection, PgConnection};
use tracing::{debug, info};

use crate::PgError;

/// SSNs of every record still marked alive. Cast to text so the column type
/// in the dump doesn't matter.
pub const ALIVE_SSNS_SQL: &str =
    "SELECT ssn::text FROM public.criminal_records WHERE status = 'alive' ORDER BY ssn";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection options for the restored database. The throwaway container
/// has no TLS configured.
pub fn connect_options(conn: &ConnectionInfo) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&conn.host)
        .port(conn.port)
        .username(&conn.user)
        .password(&conn.password)
        .database(&conn.database)
        .ssl_mode(PgSslMode::Disable)
}

/// Derives the answer by querying the restored database.
pub struct PgDeriver {
    rt: tokio::runtime::Runtime,
    query: String,
}

impl PgDeriver {
    pub fn new() -> Result<Self, PgError> {
        Self::with_query(ALIVE_SSNS_SQL)
    }

    /// Use a different query; it must return a single text column.
    fn with_query(query: &str) -> Result<Self, PgError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(PgError::Runtime)?;
        Ok(Self {
            rt,
            query: query.to_string(),
        })
    }

    pub fn alive_ssns(&self, conn: &ConnectionInfo) -> Result<Vec<String>, PgError> {
        let opts = connect_options(conn);
        let query = self.query.as_str();
        self.rt.block_on(async move {
            debug!(host = %conn.host, port = conn.port, db = %conn.database, "connecting");
            let mut db = tokio::time::timeout(CONNECT_TIMEOUT, PgConnection::connect_with(&opts))
                .await
                .map_err(|_| {
                    PgError::Connect(sqlx::Error::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "connect timed out",
                    )))
                })?
                .map_err(PgError::Connect)?;

            let rows = sqlx::query_scalar::<_, Option<String>>(query)
                .fetch_all(&mut db)
                .await
                .map_err(PgError::Query)?;

            // Best effort; the container is about to go away anyway.
            let _ = db.close().await;
            Ok(rows.into_iter().flatten().collect())
        })
    }
}

impl SolutionDeriver for PgDeriver {
    fn derive(&self, handle: &ContainerHandle) -> Result<Solution, CoreError> {
        let ssns = self.alive_ssns(&handle.connection)?;
        let solution = Solution::from_alive_ssns(ssns);
        info!(alive = solution.alive_ssns.len(), "derived solution");
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(port: u16) -> ConnectionInfo {
        ConnectionInfo {
            host: "127.0.0.1".into(),
            port,
            user: "postgres".into(),
            database: "postgres".into(),
            password: "s3cret".into(),
        }
    }

    #[test]
    fn connect_options_follow_connection_info() {
        let opts = connect_options(&info(45123));
        assert_eq!(opts.get_host(), "127.0.0.1");
        assert_eq!(opts.get_port(), 45123);
        assert_eq!(opts.get_username(), "postgres");
        assert_eq!(opts.get_database(), Some("postgres"));
    }

    #[test]
    fn query_selects_alive_ssns_in_order() {
        assert!(ALIVE_SSNS_SQL.contains("criminal_records"));
        assert!(ALIVE_SSNS_SQL.contains("status = 'alive'"));
        assert!(ALIVE_SSNS_SQL.ends_with("ORDER BY ssn"));
    }

    #[test]
    fn refused_connection_is_query_error() {
        // Grab a free port, then release it so nothing is listening.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let handle = ContainerHandle {
            id: "x".into(),
            name: "temp_postgres_x".into(),
            container_port: 5432,
            connection: info(port),
        };
        let deriver = PgDeriver::new().unwrap();
        let err = deriver.derive(&handle).unwrap_err();
        match err {
            CoreError::Query(msg) => assert!(msg.contains("could not connect")),
            other => panic!("expected Query, got {:?}", other),
        }
    }
}
