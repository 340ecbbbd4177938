//! postgres-adapter — PostgreSQL side of the restore pipeline.
//!
//! Purpose
//! - `PsqlLoader` implements the `DumpLoader` port by piping the dump into
//!   `psql`, either inside the container (`docker exec -i`) or on the host.
//! - `PgDeriver` implements the `SolutionDeriver` port by querying the
//!   restored database with `sqlx`.
//!
//! Notes
//! - The domain ports are synchronous. `PgDeriver` bridges to async `sqlx`
//!   with a private current-thread `tokio::runtime::Runtime` and `block_on`.

mod deriver;
mod loader;

pub use deriver::{connect_options, PgDeriver, ALIVE_SSNS_SQL};
pub use loader::{Invocation, PsqlLoader, PsqlMode};

use domain::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum PgError {
    #[error("could not execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("writing dump to psql stdin failed: {0}")]
    Stdin(#[source] std::io::Error),
    #[error("psql exited with code {exit_code:?}: {stderr}")]
    Import {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("could not start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("could not connect to postgres: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl From<PgError> for CoreError {
    fn from(e: PgError) -> Self {
        match e {
            PgError::Spawn { .. } | PgError::Stdin(_) | PgError::Import { .. } => {
                CoreError::Import(e.to_string())
            }
            PgError::Runtime(_) | PgError::Connect(_) | PgError::Query(_) => {
                CoreError::Query(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_errors_map_to_import() {
        let e: CoreError = PgError::Import {
            exit_code: Some(3),
            stderr: "ERROR: syntax error".into(),
        }
        .into();
        match e {
            CoreError::Import(msg) => {
                assert!(msg.contains("code Some(3)"));
                assert!(msg.contains("syntax error"));
            }
            other => panic!("expected Import, got {:?}", other),
        }
    }

    #[test]
    fn query_errors_map_to_query() {
        let e: CoreError = PgError::Query(sqlx::Error::RowNotFound).into();
        assert!(matches!(e, CoreError::Query(_)));
    }
}
