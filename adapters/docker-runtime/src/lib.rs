//! docker-runtime — `ContainerRuntime` port backed by the docker CLI.
//!
//! Starts the PostgreSQL container with `docker run -d`, probes readiness with
//! `pg_isready` inside the container, and tears it down with `docker stop`
//! and `docker rm -v`. All calls are blocking `std::process::Command`
//! invocations; any non-zero exit is reported with the command's stderr.
//!
//! The command prefix is configurable (`DOCKER_BIN`), so `podman` or
//! `sudo docker` work the same way.

use std::process::{Command, Output, Stdio};

use domain::validate::{validate_container_name, validate_host_port};
use domain::{ContainerHandle, ContainerRuntime, ContainerSpec, CoreError};
use tracing::{debug, info, warn};

/// Host the readiness probe targets from inside the container. Using TCP
/// rather than the unix socket skips the image's temporary init server.
const PROBE_HOST: &str = "127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("invalid container spec: {0}")]
    InvalidSpec(String),
    #[error("could not execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("docker {command} failed (exit code {exit_code:?}): {stderr}")]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("docker run returned no container id")]
    MissingId,
    #[error("container {0} is not running")]
    NotRunning(String),
}

impl From<DockerError> for CoreError {
    fn from(e: DockerError) -> Self {
        match e {
            DockerError::InvalidSpec(msg) => CoreError::InvalidConfig(msg),
            other => CoreError::Runtime(other.to_string()),
        }
    }
}

/// Docker CLI wrapper.
#[derive(Clone, Debug)]
pub struct DockerCli {
    program: String,
    prefix: Vec<String>,
}

impl DockerCli {
    /// Build from a command line such as `docker`, `podman` or `sudo docker`.
    /// Blank input falls back to `docker`.
    pub fn new(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "docker".to_string());
        Self {
            program,
            prefix: parts.collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn output(&self, args: &[String]) -> Result<Output, DockerError> {
        debug!(program = %self.program, args = %redact_args(args).join(" "), "docker invocation");
        Command::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DockerError::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    /// Run a command that must succeed; returns trimmed stdout.
    fn checked(&self, args: &[String]) -> Result<String, DockerError> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(DockerError::Failed {
                command: args.first().cloned().unwrap_or_default(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn start_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, DockerError> {
        validate_container_name(&spec.name).map_err(|e| DockerError::InvalidSpec(e.to_string()))?;
        validate_host_port(spec.host_port).map_err(|e| DockerError::InvalidSpec(e.to_string()))?;

        let stdout = self.checked(&run_args(spec))?;
        // With --pull, docker may print progress before the id; the id is last.
        let id = stdout
            .lines()
            .last()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(DockerError::MissingId)?
            .to_string();
        info!(
            container = %spec.name,
            id = %short_id(&id),
            image = %spec.image,
            port = spec.host_port,
            "container started"
        );
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
            container_port: spec.container_port,
            connection: spec.connection(),
        })
    }

    pub fn probe(&self, handle: &ContainerHandle) -> Result<bool, DockerError> {
        let running = self.checked(&inspect_running_args(&handle.name))?;
        if running != "true" {
            return Err(DockerError::NotRunning(handle.name.clone()));
        }
        let output = self.output(&probe_args(handle))?;
        if output.status.success() {
            return Ok(true);
        }
        debug!(
            container = %handle.name,
            exit_code = ?output.status.code(),
            "database not accepting connections yet"
        );
        Ok(false)
    }

    pub fn stop_container(&self, handle: &ContainerHandle) -> Result<(), DockerError> {
        self.checked(&["stop".to_string(), handle.name.clone()])?;
        info!(container = %handle.name, "container stopped");
        Ok(())
    }

    pub fn remove_container(&self, handle: &ContainerHandle) -> Result<(), DockerError> {
        let res = self.checked(&["rm".to_string(), "-v".to_string(), handle.name.clone()]);
        match res {
            Ok(_) => {
                info!(container = %handle.name, "container removed");
                Ok(())
            }
            Err(e) => {
                warn!(container = %handle.name, error = %e, "container removal failed");
                Err(e)
            }
        }
    }
}

impl ContainerRuntime for DockerCli {
    fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, CoreError> {
        Ok(self.start_container(spec)?)
    }

    fn is_ready(&self, handle: &ContainerHandle) -> Result<bool, CoreError> {
        Ok(self.probe(handle)?)
    }

    fn stop(&self, handle: &ContainerHandle) -> Result<(), CoreError> {
        Ok(self.stop_container(handle)?)
    }

    fn remove(&self, handle: &ContainerHandle) -> Result<(), CoreError> {
        Ok(self.remove_container(handle)?)
    }
}

/// `docker run` arguments for `spec`.
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    vec![
        "run".into(),
        "-d".into(),
        format!("--pull={}", spec.pull.as_str()),
        "--name".into(),
        spec.name.clone(),
        "-p".into(),
        format!("{}:{}:{}", spec.host, spec.host_port, spec.container_port),
        "-e".into(),
        format!("POSTGRES_PASSWORD={}", spec.password),
        "-e".into(),
        format!("POSTGRES_USER={}", spec.user),
        "-e".into(),
        format!("POSTGRES_DB={}", spec.database),
        spec.image.clone(),
    ]
}

/// `docker inspect` arguments printing `true`/`false` for the running state.
pub fn inspect_running_args(name: &str) -> Vec<String> {
    vec![
        "inspect".into(),
        "-f".into(),
        "{{.State.Running}}".into(),
        name.to_string(),
    ]
}

/// `docker exec ... pg_isready` arguments for `handle`.
pub fn probe_args(handle: &ContainerHandle) -> Vec<String> {
    vec![
        "exec".into(),
        handle.name.clone(),
        "pg_isready".into(),
        "-q".into(),
        "-h".into(),
        PROBE_HOST.into(),
        "-p".into(),
        handle.container_port.to_string(),
        "-U".into(),
        handle.connection.user.clone(),
        "-d".into(),
        handle.connection.database.clone(),
    ]
}

/// Mask secret values (`*PASSWORD=…`) before arguments are logged.
pub fn redact_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|a| match a.split_once('=') {
            Some((key, _)) if key.ends_with("PASSWORD") => format!("{}=***", key),
            _ => a.clone(),
        })
        .collect()
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ConnectionInfo, PullPolicy};
    use std::fs;
    use std::path::PathBuf;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            image: "postgres:14.3-alpine".into(),
            name: "temp_postgres_abc".into(),
            host: "127.0.0.1".into(),
            host_port: 45000,
            container_port: 5432,
            user: "postgres".into(),
            database: "postgres".into(),
            password: "s3cret".into(),
            pull: PullPolicy::Missing,
        }
    }

    fn handle() -> ContainerHandle {
        ContainerHandle {
            id: "cafebabe".into(),
            name: "temp_postgres_abc".into(),
            container_port: 5432,
            connection: ConnectionInfo {
                host: "127.0.0.1".into(),
                port: 45000,
                user: "postgres".into(),
                database: "postgres".into(),
                password: "s3cret".into(),
            },
        }
    }

    /// A shell script standing in for docker. It appends its arguments to
    /// `calls.log` and then runs `body`.
    fn fake_docker(dir: &tempfile::TempDir, body: &str) -> (DockerCli, PathBuf) {
        let log = dir.path().join("calls.log");
        let script = dir.path().join("docker.sh");
        let text = format!("#!/bin/sh\necho \"$@\" >> '{}'\n{}\n", log.display(), body);
        fs::write(&script, text).unwrap();
        (DockerCli::new(&format!("sh {}", script.display())), log)
    }

    fn logged(log: &PathBuf) -> Vec<String> {
        fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn command_line_parsing() {
        let d = DockerCli::new("sudo docker");
        assert_eq!(d.program(), "sudo");
        assert_eq!(d.prefix, vec!["docker".to_string()]);
        assert_eq!(DockerCli::new("   ").program(), "docker");
    }

    #[test]
    fn run_args_publish_port_and_credentials() {
        let args = run_args(&spec());
        assert_eq!(&args[..3], &["run", "-d", "--pull=missing"]);
        assert!(args.contains(&"127.0.0.1:45000:5432".to_string()));
        assert!(args.contains(&"POSTGRES_PASSWORD=s3cret".to_string()));
        assert_eq!(args.last().unwrap(), "postgres:14.3-alpine");
    }

    #[test]
    fn probe_targets_tcp_listener_inside_container() {
        let args = probe_args(&handle());
        assert_eq!(&args[..3], &["exec", "temp_postgres_abc", "pg_isready"]);
        assert!(args.windows(2).any(|w| w[0] == "-h" && w[1] == "127.0.0.1"));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "5432"));
    }

    #[test]
    fn redaction_hides_passwords_only() {
        let out = redact_args(&run_args(&spec()));
        assert!(out.contains(&"POSTGRES_PASSWORD=***".to_string()));
        assert!(out.contains(&"POSTGRES_USER=postgres".to_string()));
        assert!(!out.iter().any(|a| a.contains("s3cret")));
    }

    #[test]
    fn start_returns_last_stdout_line_as_id() {
        let dir = tempfile::tempdir().unwrap();
        let (docker, log) = fake_docker(
            &dir,
            "echo 'Status: Downloaded newer image'\necho 0123456789abcdef",
        );
        let h = docker.start(&spec()).unwrap();
        assert_eq!(h.id, "0123456789abcdef");
        assert_eq!(h.connection.port, 45000);
        let calls = logged(&log);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("run -d --pull=missing --name temp_postgres_abc"));
    }

    #[test]
    fn start_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let (docker, _log) = fake_docker(&dir, "echo 'port is already allocated' >&2\nexit 125");
        let err = docker.start_container(&spec()).unwrap_err();
        match err {
            DockerError::Failed {
                command,
                exit_code,
                stderr,
            } => {
                assert_eq!(command, "run");
                assert_eq!(exit_code, Some(125));
                assert!(stderr.contains("already allocated"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn invalid_name_is_rejected_before_running_docker() {
        let dir = tempfile::tempdir().unwrap();
        let (docker, log) = fake_docker(&dir, "echo id");
        let mut bad = spec();
        bad.name = "bad name".into();
        let err: CoreError = docker.start(&bad).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
        assert!(logged(&log).is_empty());
    }

    #[test]
    fn probe_reports_ready_and_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let (ready, _) = fake_docker(
            &dir,
            "case \"$1\" in inspect) echo true ;; exec) exit 0 ;; esac",
        );
        assert!(ready.is_ready(&handle()).unwrap());

        let dir = tempfile::tempdir().unwrap();
        let (booting, _) = fake_docker(
            &dir,
            "case \"$1\" in inspect) echo true ;; exec) exit 2 ;; esac",
        );
        assert!(!booting.is_ready(&handle()).unwrap());
    }

    #[test]
    fn probe_fails_when_container_exited() {
        let dir = tempfile::tempdir().unwrap();
        let (docker, log) = fake_docker(&dir, "case \"$1\" in inspect) echo false ;; esac");
        let err = docker.is_ready(&handle()).unwrap_err();
        assert!(matches!(err, CoreError::Runtime(ref m) if m.contains("not running")));
        // no exec after a failed inspect
        assert_eq!(logged(&log).len(), 1);
    }

    #[test]
    fn teardown_stops_then_removes_with_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let (docker, log) = fake_docker(&dir, "echo \"$2\"");
        docker.stop(&handle()).unwrap();
        docker.remove(&handle()).unwrap();
        assert_eq!(
            logged(&log),
            vec!["stop temp_postgres_abc", "rm -v temp_postgres_abc"]
        );
    }

    #[test]
    fn missing_binary_is_a_runtime_error() {
        let docker = DockerCli::new("definitely-not-a-container-runtime-binary");
        let err = docker.start(&spec()).unwrap_err();
        assert!(matches!(err, CoreError::Runtime(ref m) if m.contains("could not execute")));
    }
}
