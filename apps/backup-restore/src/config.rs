//! Centralized configuration for backup-restore.
//!
//! All environment variables are loaded and validated at startup so a bad
//! value fails before any container is started.

use std::env;
use std::fmt;
use std::time::Duration;

use domain::naming;
use domain::service::{ReadinessPolicy, RestorePlan, TeardownPolicy};
use domain::validate::{validate_container_name, validate_host_port};
use domain::{ContainerSpec, PullPolicy};
use postgres_adapter::PsqlMode;

/// Port the engine listens on inside the official image.
pub const CONTAINER_PORT: u16 = 5432;
/// Range random host ports are drawn from.
pub const PORT_RANGE: (u16, u16) = (35000, 55000);

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Random inputs for the values that default to something unique per run.
#[derive(Debug, Clone, Copy)]
pub struct Seeds {
    pub name: u64,
    pub port: u64,
    pub password: [u64; 2],
}

impl Seeds {
    pub fn random() -> Self {
        Self {
            name: rand::random(),
            port: rand::random(),
            password: [rand::random(), rand::random()],
        }
    }
}

/// Run configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Grader base URL (default: https://hackattic.com)
    pub base_url: String,
    pub http_timeout: Duration,
    pub image: String,
    pub container_name: String,
    /// Interface the database port is published on
    pub pg_host: String,
    pub pg_port: u16,
    pub pg_user: String,
    pub pg_database: String,
    pub pg_password: String,
    pub pull: PullPolicy,
    pub readiness: ReadinessPolicy,
    pub keep_container: bool,
    pub psql_mode: PsqlMode,
    pub psql_bin: String,
    pub psql_on_error_stop: bool,
    /// Container CLI command line, e.g. `docker` or `sudo docker`
    pub docker_bin: String,
    pub log_format: LogFormat,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("image", &self.image)
            .field("container_name", &self.container_name)
            .field("pg_host", &self.pg_host)
            .field("pg_port", &self.pg_port)
            .field("pg_user", &self.pg_user)
            .field("pg_database", &self.pg_database)
            .field("pg_password", &"<redacted>")
            .field("pull", &self.pull)
            .field("readiness", &self.readiness)
            .field("keep_container", &self.keep_container)
            .field("psql_mode", &self.psql_mode)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), Seeds::random())
    }

    /// Load from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F, seeds: Seeds) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = var("HACKATTIC_BASE_URL")
            .unwrap_or_else(|| http_common::DEFAULT_BASE_URL.into())
            .trim_end_matches('/')
            .to_string();
        if !http_common::is_valid_base_url(&base_url) {
            return Err(ConfigError {
                field: "HACKATTIC_BASE_URL",
                message: format!("'{}' is not an http(s) URL", base_url),
            });
        }

        let http_timeout = Duration::from_secs(parse_num(&var, "HTTP_TIMEOUT_SECS", 30u64)?);

        let image = var("PG_IMAGE").unwrap_or_else(|| "postgres:14.3-alpine".into());

        let container_name =
            var("CONTAINER_NAME").unwrap_or_else(|| naming::container_name(seeds.name));
        validate_container_name(&container_name).map_err(|e| ConfigError {
            field: "CONTAINER_NAME",
            message: e.to_string(),
        })?;

        let pg_host = var("PG_HOST").unwrap_or_else(|| "127.0.0.1".into());

        let pg_port = match var("PG_PORT") {
            Some(_) => parse_num(&var, "PG_PORT", 0u16)?,
            None => naming::port_in_range(seeds.port, PORT_RANGE.0, PORT_RANGE.1),
        };
        validate_host_port(pg_port).map_err(|e| ConfigError {
            field: "PG_PORT",
            message: e.to_string(),
        })?;

        let pg_user = var("PG_USER").unwrap_or_else(|| "postgres".into());
        let pg_database = var("PG_DATABASE").unwrap_or_else(|| "postgres".into());
        let pg_password = var("PG_PASSWORD").unwrap_or_else(|| naming::secret(&seeds.password));

        let pull = match var("PULL_POLICY") {
            None => PullPolicy::Missing,
            Some(s) => PullPolicy::parse(&s).ok_or_else(|| ConfigError {
                field: "PULL_POLICY",
                message: format!("expected 'missing' or 'always', got '{}'", s),
            })?,
        };

        let attempts = parse_num(&var, "READY_ATTEMPTS", 30u32)?;
        if attempts == 0 {
            return Err(ConfigError {
                field: "READY_ATTEMPTS",
                message: "must be at least 1".into(),
            });
        }
        let interval = Duration::from_millis(parse_num(&var, "READY_INTERVAL_MS", 1000u64)?);

        let psql_mode = match var("PSQL_MODE") {
            None => PsqlMode::Container,
            Some(s) => PsqlMode::parse(&s).ok_or_else(|| ConfigError {
                field: "PSQL_MODE",
                message: format!("expected 'container' or 'host', got '{}'", s),
            })?,
        };
        let psql_bin = var("PSQL_BIN").unwrap_or_else(|| "psql".into());

        let keep_container = flag(&var, "KEEP_CONTAINER");
        let psql_on_error_stop = flag(&var, "PSQL_ON_ERROR_STOP");

        let docker_bin = var("DOCKER_BIN").unwrap_or_else(|| "docker".into());

        let log_format = LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            base_url,
            http_timeout,
            image,
            container_name,
            pg_host,
            pg_port,
            pg_user,
            pg_database,
            pg_password,
            pull,
            readiness: ReadinessPolicy { attempts, interval },
            keep_container,
            psql_mode,
            psql_bin,
            psql_on_error_stop,
            docker_bin,
            log_format,
        })
    }

    pub fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            name: self.container_name.clone(),
            host: self.pg_host.clone(),
            host_port: self.pg_port,
            container_port: CONTAINER_PORT,
            user: self.pg_user.clone(),
            database: self.pg_database.clone(),
            password: self.pg_password.clone(),
            pull: self.pull,
        }
    }

    pub fn restore_plan(&self) -> RestorePlan {
        RestorePlan {
            container: self.container_spec(),
            readiness: self.readiness,
            teardown: if self.keep_container {
                TeardownPolicy::Keep
            } else {
                TeardownPolicy::Remove
            },
        }
    }

    /// Log warnings about settings that leave things behind.
    pub fn warn_if_unusual(&self) {
        if self.keep_container {
            tracing::warn!(
                container = %self.container_name,
                "KEEP_CONTAINER is set: the container will be left running. \
                 Remove it with `docker rm -f {}`.",
                self.container_name
            );
        }
    }
}

fn parse_num<T, F>(var: &F, field: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(field) {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|e| ConfigError {
            field,
            message: format!("invalid number '{}': {}", s, e),
        }),
    }
}

fn flag<F>(var: &F, field: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    var(field)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
