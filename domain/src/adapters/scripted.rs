use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::{
    AccessToken, Clock, ContainerHandle, ContainerRuntime, ContainerSpec, CoreError, DumpLoader,
    DumpPayload, DumpSource, ResultSink, Solution, SolutionDeriver, SubmitOutcome,
};

/// One observed port call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Start { name: String },
    Probe,
    Fetch,
    Load(Vec<u8>),
    Derive,
    Submit(Solution),
    Stop,
    Remove,
}

/// Clock that advances one second every time it is read.
///
/// Sharing it between the service and the fakes gives every recorded call a
/// strictly increasing timestamp.
#[derive(Clone, Default)]
pub struct TickClock {
    ticks: Arc<AtomicU64>,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for TickClock {
    fn now(&self) -> SystemTime {
        let n = self.ticks.fetch_add(1, Ordering::SeqCst);
        SystemTime::UNIX_EPOCH + Duration::from_secs(n)
    }
}

/// Shared, timestamped journal of calls across all scripted adapters.
#[derive(Clone, Default)]
pub struct CallLog {
    clock: TickClock,
    entries: Arc<Mutex<Vec<(SystemTime, Call)>>>,
}

impl CallLog {
    pub fn new(clock: TickClock) -> Self {
        Self {
            clock,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, call: Call) {
        let at = self.clock.now();
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((at, call));
        }
    }

    /// Calls in the order they happened.
    pub fn calls(&self) -> Vec<Call> {
        self.entries()
            .into_iter()
            .map(|(_, call)| call)
            .collect()
    }

    /// Calls with the time each was observed.
    pub fn entries(&self) -> Vec<(SystemTime, Call)> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Timestamp of the first call matching `pred`.
    pub fn first_at(&self, pred: impl Fn(&Call) -> bool) -> Option<SystemTime> {
        self.entries()
            .into_iter()
            .find(|(_, call)| pred(call))
            .map(|(at, _)| at)
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

/// Container runtime fake: starts instantly, becomes ready after a number of probes.
pub struct ScriptedRuntime {
    log: CallLog,
    start_error: Option<CoreError>,
    probe_error: Option<CoreError>,
    stop_error: Option<CoreError>,
    ready_after: u32,
    probes: AtomicU32,
}

impl ScriptedRuntime {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            start_error: None,
            probe_error: None,
            stop_error: None,
            ready_after: 0,
            probes: AtomicU32::new(0),
        }
    }

    pub fn failing_start(mut self, err: CoreError) -> Self {
        self.start_error = Some(err);
        self
    }

    pub fn failing_probe(mut self, err: CoreError) -> Self {
        self.probe_error = Some(err);
        self
    }

    pub fn failing_stop(mut self, err: CoreError) -> Self {
        self.stop_error = Some(err);
        self
    }

    /// Report "not ready" for the first `n` probes.
    pub fn ready_after(mut self, n: u32) -> Self {
        self.ready_after = n;
        self
    }
}

impl ContainerRuntime for ScriptedRuntime {
    fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, CoreError> {
        self.log.record(Call::Start {
            name: spec.name.clone(),
        });
        if let Some(err) = &self.start_error {
            return Err(err.clone());
        }
        Ok(ContainerHandle {
            id: format!("id-{}", spec.name),
            name: spec.name.clone(),
            container_port: spec.container_port,
            connection: spec.connection(),
        })
    }

    fn is_ready(&self, _handle: &ContainerHandle) -> Result<bool, CoreError> {
        self.log.record(Call::Probe);
        if let Some(err) = &self.probe_error {
            return Err(err.clone());
        }
        let seen = self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(seen >= self.ready_after)
    }

    fn stop(&self, _handle: &ContainerHandle) -> Result<(), CoreError> {
        self.log.record(Call::Stop);
        match &self.stop_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn remove(&self, _handle: &ContainerHandle) -> Result<(), CoreError> {
        self.log.record(Call::Remove);
        Ok(())
    }
}

/// Dump source fake returning a canned payload or error.
pub struct ScriptedSource {
    log: CallLog,
    result: Result<DumpPayload, CoreError>,
}

impl ScriptedSource {
    pub fn returning(log: CallLog, dump: DumpPayload) -> Self {
        Self { log, result: Ok(dump) }
    }

    pub fn failing(log: CallLog, err: CoreError) -> Self {
        Self {
            log,
            result: Err(err),
        }
    }
}

impl DumpSource for ScriptedSource {
    fn fetch_dump(&self, _token: &AccessToken) -> Result<DumpPayload, CoreError> {
        self.log.record(Call::Fetch);
        self.result.clone()
    }
}

/// Loader fake that records the exact bytes it was handed.
pub struct ScriptedLoader {
    log: CallLog,
    error: Option<CoreError>,
}

impl ScriptedLoader {
    pub fn new(log: CallLog) -> Self {
        Self { log, error: None }
    }

    pub fn failing(log: CallLog, err: CoreError) -> Self {
        Self {
            log,
            error: Some(err),
        }
    }
}

impl DumpLoader for ScriptedLoader {
    fn load(&self, _handle: &ContainerHandle, dump: &DumpPayload) -> Result<(), CoreError> {
        self.log.record(Call::Load(dump.as_bytes().to_vec()));
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Deriver fake standing in for the restored database.
pub struct ScriptedDeriver {
    log: CallLog,
    result: Result<Solution, CoreError>,
}

impl ScriptedDeriver {
    /// Rows as they would come back from an unordered table scan.
    pub fn with_rows(log: CallLog, rows: &[&str]) -> Self {
        let solution = Solution::from_alive_ssns(rows.iter().map(|s| s.to_string()));
        Self {
            log,
            result: Ok(solution),
        }
    }

    pub fn failing(log: CallLog, err: CoreError) -> Self {
        Self {
            log,
            result: Err(err),
        }
    }
}

impl SolutionDeriver for ScriptedDeriver {
    fn derive(&self, _handle: &ContainerHandle) -> Result<Solution, CoreError> {
        self.log.record(Call::Derive);
        self.result.clone()
    }
}

/// Result sink fake that acknowledges every submission.
pub struct ScriptedSink {
    log: CallLog,
    result: Result<SubmitOutcome, CoreError>,
}

impl ScriptedSink {
    pub fn accepting(log: CallLog, body: &str) -> Self {
        Self {
            log,
            result: Ok(SubmitOutcome {
                status: 200,
                body: body.to_string(),
            }),
        }
    }

    pub fn failing(log: CallLog, err: CoreError) -> Self {
        Self {
            log,
            result: Err(err),
        }
    }
}

impl ResultSink for ScriptedSink {
    fn submit(
        &self,
        _token: &AccessToken,
        solution: &Solution,
    ) -> Result<SubmitOutcome, CoreError> {
        self.log.record(Call::Submit(solution.clone()));
        self.result.clone()
    }
}
