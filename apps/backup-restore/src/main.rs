//! backup-restore — solves the hackattic `backup_restore` challenge.
//!
//! Starts a throwaway PostgreSQL container, downloads the challenge dump,
//! restores it, reports the SSNs of everyone still alive and prints the
//! grader's answer on stdout. Logs go to stderr.
//!
//! Run:
//! ```bash
//! # pretty logs (default)
//! cargo run -p backup-restore -- <ACCESS_TOKEN>
//!
//! # json logs, keep the container around afterwards
//! LOG_FORMAT=json KEEP_CONTAINER=1 cargo run -p backup-restore -- <ACCESS_TOKEN>
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::process::ExitCode;
use std::time::SystemTime;

use clap::Parser;
use docker_runtime::DockerCli;
use domain::service::{RestoreService, TeardownStatus};
use domain::{AccessToken, Clock, CoreError, Step, StepObserver, StepTiming};
use hackattic_client::HackatticClient;
use postgres_adapter::{PgDeriver, PsqlLoader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Challenge access token from hackattic.com
    access_token: String,
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Logs every pipeline step.
struct TracingObserver;

impl StepObserver for TracingObserver {
    fn started(&self, step: Step) {
        debug!(step = %step, "step started");
    }

    fn finished(&self, timing: &StepTiming) {
        info!(
            step = %timing.step,
            started_at = %http_common::system_time_to_rfc3339(timing.started_at),
            elapsed_ms = timing.elapsed.as_millis() as u64,
            "step finished"
        );
    }

    fn failed(&self, step: Step, err: &CoreError) {
        error!(step = %step, error = %err, "step failed");
    }
}

fn main() -> ExitCode {
    // A missing .env is fine; everything has a default.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&cfg);
    cfg.warn_if_unusual();

    match run(&cfg, cli.access_token) {
        Ok(body) => {
            println!("{}", body);
            ExitCode::SUCCESS
        }
        Err(()) => ExitCode::FAILURE,
    }
}

fn run(cfg: &config::Config, raw_token: String) -> Result<String, ()> {
    let token = AccessToken::new(raw_token).map_err(|e| error!(error = %e, "rejected access token"))?;

    let client = HackatticClient::new(&cfg.base_url, cfg.http_timeout)
        .map_err(|e| error!(error = %e, "failed to build http client"))?;
    let deriver =
        PgDeriver::new().map_err(|e| error!(error = %e, "failed to initialise postgres client"))?;
    let loader = PsqlLoader::new(
        cfg.psql_mode,
        &cfg.docker_bin,
        &cfg.psql_bin,
        cfg.psql_on_error_stop,
    );

    let service = RestoreService::new(
        DockerCli::new(&cfg.docker_bin),
        client.clone(),
        loader,
        deriver,
        client,
        SystemClock,
        cfg.restore_plan(),
    );

    info!(
        base_url = %cfg.base_url,
        image = %cfg.image,
        container = %cfg.container_name,
        port = cfg.pg_port,
        psql_mode = ?cfg.psql_mode,
        "starting restore"
    );

    match service.run(&token, &TracingObserver) {
        Ok(report) => {
            info!(
                dump_bytes = report.dump_bytes,
                alive = report.solution.alive_ssns.len(),
                status = report.outcome.status,
                "solution accepted by grader"
            );
            log_teardown(&report.teardown);
            Ok(report.outcome.body)
        }
        Err(e) => {
            if let Some(status) = &e.teardown {
                log_teardown(status);
            }
            error!(step = %e.step, error = %e, "restore failed");
            Err(())
        }
    }
}

fn log_teardown(status: &TeardownStatus) {
    match status {
        TeardownStatus::Removed => debug!("container removed"),
        TeardownStatus::Kept => info!("container kept running"),
        TeardownStatus::Failed(e) => warn!(error = %e, "container cleanup failed; remove it by hand"),
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the grader's answer only.
    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_takes_one_positional_token() {
        let cli = Cli::try_parse_from(["backup-restore", "abc123"]).unwrap();
        assert_eq!(cli.access_token, "abc123");
    }

    #[test]
    fn cli_requires_token() {
        assert!(Cli::try_parse_from(["backup-restore"]).is_err());
        assert!(Cli::try_parse_from(["backup-restore", "a", "b"]).is_err());
    }

    #[test]
    fn system_clock_moves_forward() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }
}
