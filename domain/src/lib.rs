//! Domain library for the backup-restore challenge runner.
//!
//! This crate is dependency-light (serde only) and holds the domain types,
//! ports (traits), the restore pipeline and error definitions. Keep docker,
//! HTTP and database IO out of this crate; those live in the adapters.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Opaque credential identifying the challenge session.
///
/// The value never shows up in `Debug` output so it can't leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        crate::validate::validate_access_token(&val)?;
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken(<redacted, {} chars>)", self.0.len())
    }
}

/// Raw bytes of a database dump, already stripped of any transport encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpPayload(Vec<u8>);

impl DumpPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for DumpPayload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Whether the runtime should fetch the image before starting the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullPolicy {
    /// Pull only when the image is not present locally.
    Missing,
    /// Always pull, refreshing a stale local tag.
    Always,
}

impl PullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::Missing => "missing",
            PullPolicy::Always => "always",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "missing" => Some(PullPolicy::Missing),
            "always" => Some(PullPolicy::Always),
            _ => None,
        }
    }
}

/// Everything needed to start the database container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    /// Host interface the database port is published on.
    pub host: String,
    /// Published host port.
    pub host_port: u16,
    /// Port the engine listens on inside the container.
    pub container_port: u16,
    pub user: String,
    pub database: String,
    pub password: String,
    pub pull: PullPolicy,
}

impl ContainerSpec {
    /// Connection details a client on the host would use once the container runs.
    pub fn connection(&self) -> ConnectionInfo {
        ConnectionInfo {
            host: self.host.clone(),
            port: self.host_port,
            user: self.user.clone(),
            database: self.database.clone(),
            password: self.password.clone(),
        }
    }
}

/// Client-side connection details for the restored database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    pub password: String,
}

impl Debug for ConnectionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Reference to a running container owned by this process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Runtime-assigned id.
    pub id: String,
    pub name: String,
    /// Port the engine listens on inside the container.
    pub container_port: u16,
    pub connection: ConnectionInfo,
}

/// The value reported back to the grader: SSNs of every criminal record
/// marked alive, in ascending order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Solution {
    pub alive_ssns: Vec<String>,
}

impl Solution {
    /// Build a solution, sorting and de-duplicating so the payload depends only
    /// on the set of rows, never on scan order.
    pub fn from_alive_ssns<I: IntoIterator<Item = String>>(ssns: I) -> Self {
        let mut alive_ssns: Vec<String> = ssns.into_iter().collect();
        alive_ssns.sort();
        alive_ssns.dedup();
        Self { alive_ssns }
    }
}

/// What the grader said about a submitted solution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub status: u16,
    pub body: String,
}

/// Pipeline steps in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    LaunchContainer,
    FetchDump,
    AwaitReady,
    LoadDump,
    DeriveResult,
    SubmitResult,
    Teardown,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::LaunchContainer => "launch_container",
            Step::FetchDump => "fetch_dump",
            Step::AwaitReady => "await_ready",
            Step::LoadDump => "load_dump",
            Step::DeriveResult => "derive_result",
            Step::SubmitResult => "submit_result",
            Step::Teardown => "teardown",
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock cost of one completed step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepTiming {
    pub step: Step,
    pub started_at: SystemTime,
    pub elapsed: Duration,
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Container launcher port.
pub trait ContainerRuntime: Send + Sync {
    /// Start the container described by `spec` and return a handle to it.
    fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, CoreError>;
    /// Probe whether the database inside the container accepts connections.
    /// `Ok(false)` means "not yet"; errors are fatal.
    fn is_ready(&self, handle: &ContainerHandle) -> Result<bool, CoreError>;
    fn stop(&self, handle: &ContainerHandle) -> Result<(), CoreError>;
    fn remove(&self, handle: &ContainerHandle) -> Result<(), CoreError>;
}

/// Dump fetcher port.
pub trait DumpSource: Send + Sync {
    fn fetch_dump(&self, token: &AccessToken) -> Result<DumpPayload, CoreError>;
}

/// Dump loader port. Mutates the container's database state.
pub trait DumpLoader: Send + Sync {
    fn load(&self, handle: &ContainerHandle, dump: &DumpPayload) -> Result<(), CoreError>;
}

/// Reads the restored database and computes the value to report.
pub trait SolutionDeriver: Send + Sync {
    fn derive(&self, handle: &ContainerHandle) -> Result<Solution, CoreError>;
}

/// Result reporter port.
pub trait ResultSink: Send + Sync {
    fn submit(&self, token: &AccessToken, solution: &Solution)
        -> Result<SubmitOutcome, CoreError>;
}

/// Receives step lifecycle notifications, typically to log them.
pub trait StepObserver {
    fn started(&self, _step: Step) {}
    fn finished(&self, _timing: &StepTiming) {}
    fn failed(&self, _step: Step, _err: &CoreError) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl StepObserver for NoopObserver {}

/// Core domain errors (no external error crates to keep deps at zero).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoreError {
    InvalidToken(String),
    InvalidConfig(String),
    /// Container runtime unavailable or a runtime command failed.
    Runtime(String),
    /// The database never became ready.
    NotReady { attempts: u32 },
    /// The remote service answered with a non-success status.
    Http { status: u16, body: String },
    /// Transport-level failure talking to the remote service.
    Network(String),
    /// The payload could not be decoded.
    Decode(String),
    /// The database import utility failed.
    Import(String),
    /// Reading the restored state failed.
    Query(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidToken(msg) => write!(f, "invalid access token: {}", msg),
            CoreError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            CoreError::Runtime(msg) => write!(f, "container runtime error: {}", msg),
            CoreError::NotReady { attempts } => {
                write!(f, "database not ready after {} attempts", attempts)
            }
            CoreError::Http { status, body } => write!(f, "http status {}: {}", status, body),
            CoreError::Network(msg) => write!(f, "network error: {}", msg),
            CoreError::Decode(msg) => write!(f, "decode error: {}", msg),
            CoreError::Import(msg) => write!(f, "import failed: {}", msg),
            CoreError::Query(msg) => write!(f, "query failed: {}", msg),
        }
    }
}

impl Error for CoreError {}

pub mod adapters;
pub mod base62;
pub mod naming;
pub mod service;
pub mod validate;
