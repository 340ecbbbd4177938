use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use domain::{ContainerHandle, CoreError, DumpLoader, DumpPayload};
use tracing::{debug, info, warn};

use crate::PgError;

/// Where `psql` runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PsqlMode {
    /// Inside the database container via `docker exec -i`; needs nothing on the host.
    Container,
    /// On the host against the published port; needs a local `psql`.
    Host,
}

impl PsqlMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "container" => Some(PsqlMode::Container),
            "host" => Some(PsqlMode::Host),
            _ => None,
        }
    }
}

/// A fully resolved `psql` invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Restores a plain SQL dump by streaming it into `psql`.
#[derive(Clone, Debug)]
pub struct PsqlLoader {
    mode: PsqlMode,
    docker: Vec<String>,
    psql: Vec<String>,
    on_error_stop: bool,
}

impl PsqlLoader {
    /// `docker_cmd` and `psql_cmd` are command lines such as `sudo docker`.
    pub fn new(mode: PsqlMode, docker_cmd: &str, psql_cmd: &str, on_error_stop: bool) -> Self {
        Self {
            mode,
            docker: split_command(docker_cmd, "docker"),
            psql: split_command(psql_cmd, "psql"),
            on_error_stop,
        }
    }

    /// Build the command for loading into `handle`.
    pub fn invocation(&self, handle: &ContainerHandle) -> Invocation {
        let conn = &handle.connection;
        let psql_args = [
            "-X".to_string(),
            "-q".to_string(),
            "-v".to_string(),
            format!("ON_ERROR_STOP={}", u8::from(self.on_error_stop)),
            "-U".to_string(),
            conn.user.clone(),
            "-d".to_string(),
            conn.database.clone(),
            "-f".to_string(),
            "-".to_string(),
        ];
        match self.mode {
            PsqlMode::Container => {
                let mut args: Vec<String> = self.docker[1..].to_vec();
                args.extend(["exec".to_string(), "-i".to_string(), handle.name.clone()]);
                args.push("psql".to_string());
                args.extend(psql_args);
                Invocation {
                    program: self.docker[0].clone(),
                    args,
                    env: Vec::new(),
                }
            }
            PsqlMode::Host => {
                let mut args: Vec<String> = self.psql[1..].to_vec();
                args.extend([
                    "-h".to_string(),
                    conn.host.clone(),
                    "-p".to_string(),
                    conn.port.to_string(),
                ]);
                args.extend(psql_args);
                Invocation {
                    program: self.psql[0].clone(),
                    args,
                    env: vec![("PGPASSWORD".to_string(), conn.password.clone())],
                }
            }
        }
    }

    /// Pipe `dump` into psql and wait for it to finish.
    pub fn restore(&self, handle: &ContainerHandle, dump: &DumpPayload) -> Result<(), PgError> {
        let inv = self.invocation(handle);
        debug!(program = %inv.program, args = %inv.args.join(" "), "psql invocation");

        let mut child = Command::new(&inv.program)
            .args(&inv.args)
            .envs(inv.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PgError::Spawn {
                program: inv.program.clone(),
                source,
            })?;

        // Feed stdin from a separate thread so a chatty psql can't fill its
        // stdout pipe and deadlock against us.
        let stdin = child.stdin.take();
        let bytes = dump.as_bytes().to_vec();
        let writer = thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&bytes)?;
                stdin.flush()?;
            }
            Ok(())
        });

        let output = child.wait_with_output().map_err(|source| PgError::Spawn {
            program: inv.program.clone(),
            source,
        })?;
        let written = writer.join().unwrap_or_else(|_| {
            Err(std::io::Error::other("stdin writer thread panicked"))
        });

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(PgError::Import {
                exit_code: output.status.code(),
                stderr,
            });
        }
        written.map_err(PgError::Stdin)?;

        let errors = stderr.lines().filter(|l| l.contains("ERROR")).count();
        if errors > 0 {
            // Typically ownership or grants for roles that don't exist locally.
            warn!(errors, first = %stderr.lines().next().unwrap_or_default(), "psql reported errors while restoring");
        }
        info!(container = %handle.name, bytes = dump.len(), "dump restored");
        Ok(())
    }
}

impl DumpLoader for PsqlLoader {
    fn load(&self, handle: &ContainerHandle, dump: &DumpPayload) -> Result<(), CoreError> {
        Ok(self.restore(handle, dump)?)
    }
}

fn split_command(command_line: &str, fallback: &str) -> Vec<String> {
    let parts: Vec<String> = command_line.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        vec![fallback.to_string()]
    } else {
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ConnectionInfo;
    use std::fs;

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

    /// Host-mode loader whose "psql" is a shell script running `body`.
    fn fake_psql(dir: &tempfile::TempDir, body: &str) -> PsqlLoader {
        let script = dir.path().join("psql.sh");
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        PsqlLoader::new(
            PsqlMode::Host,
            "docker",
            &format!("sh {}", script.display()),
            false,
        )
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(PsqlMode::parse("container"), Some(PsqlMode::Container));
        assert_eq!(PsqlMode::parse("HOST"), Some(PsqlMode::Host));
        assert_eq!(PsqlMode::parse("ssh"), None);
    }

    #[test]
    fn container_invocation_execs_psql_inside() {
        let loader = PsqlLoader::new(PsqlMode::Container, "sudo docker", "psql", true);
        let inv = loader.invocation(&handle());
        assert_eq!(inv.program, "sudo");
        assert_eq!(
            &inv.args[..5],
            &["docker", "exec", "-i", "temp_postgres_abc", "psql"]
        );
        assert!(inv.args.contains(&"ON_ERROR_STOP=1".to_string()));
        assert!(inv.env.is_empty());
    }

    #[test]
    fn host_invocation_uses_published_port_and_password_env() {
        let loader = PsqlLoader::new(PsqlMode::Host, "docker", "psql", false);
        let inv = loader.invocation(&handle());
        assert_eq!(inv.program, "psql");
        assert_eq!(&inv.args[..4], &["-h", "127.0.0.1", "-p", "45000"]);
        assert!(inv.args.contains(&"ON_ERROR_STOP=0".to_string()));
        assert_eq!(
            inv.env,
            vec![("PGPASSWORD".to_string(), "s3cret".to_string())]
        );
        // password never appears on the command line
        assert!(!inv.args.iter().any(|a| a.contains("s3cret")));
    }

    #[test]
    fn restore_streams_exact_payload_to_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("received.sql");
        let loader = fake_psql(&dir, &format!("cat > '{}'", out.display()));
        let dump = DumpPayload::from("INSERT INTO t VALUES (1);");
        loader.load(&handle(), &dump).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"INSERT INTO t VALUES (1);".to_vec());
    }

    #[test]
    fn restore_handles_large_dumps_with_chatty_psql() {
        let dir = tempfile::tempdir().unwrap();
        // Echo everything back on stdout, like psql without -q would.
        let loader = fake_psql(&dir, "cat");
        let big = "INSERT INTO t VALUES (1);\n".repeat(100_000);
        let dump = DumpPayload::from(big.as_str());
        loader.load(&handle(), &dump).unwrap();
    }

    #[test]
    fn restore_passes_password_via_env() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pw.txt");
        let loader = fake_psql(
            &dir,
            &format!("cat > /dev/null; printf '%s' \"$PGPASSWORD\" > '{}'", out.display()),
        );
        loader.load(&handle(), &DumpPayload::from("SELECT 1;")).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "s3cret");
    }

    #[test]
    fn non_zero_exit_is_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = fake_psql(
            &dir,
            "cat > /dev/null; echo 'ERROR:  syntax error at or near \"garbage\"' >&2; exit 3",
        );
        let err = loader
            .restore(&handle(), &DumpPayload::from("garbage"))
            .unwrap_err();
        match err {
            PgError::Import { exit_code, stderr } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr.contains("syntax error"));
            }
            other => panic!("expected Import, got {:?}", other),
        }
    }

    #[test]
    fn errors_on_stderr_with_zero_exit_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let loader = fake_psql(
            &dir,
            "cat > /dev/null; echo 'ERROR:  role \"admin\" does not exist' >&2; exit 0",
        );
        assert!(loader
            .load(&handle(), &DumpPayload::from("ALTER TABLE t OWNER TO admin;"))
            .is_ok());
    }

    #[test]
    fn missing_psql_is_reported() {
        let loader = PsqlLoader::new(PsqlMode::Host, "docker", "no-such-psql-binary-here", false);
        let err: CoreError = loader
            .load(&handle(), &DumpPayload::from("SELECT 1;"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Import(ref m) if m.contains("could not execute")));
    }
}
