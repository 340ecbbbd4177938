use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::{
    AccessToken, Clock, ContainerHandle, ContainerRuntime, ContainerSpec, CoreError, DumpLoader,
    DumpSource, ResultSink, Solution, SolutionDeriver, Step, StepObserver, StepTiming,
    SubmitOutcome,
};

/// How long to wait for the database to accept connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

/// What to do with the container once the pipeline is over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownPolicy {
    /// Stop and remove it, success or not.
    Remove,
    /// Leave it running for inspection.
    Keep,
}

/// Outcome of the teardown step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TeardownStatus {
    Removed,
    Kept,
    Failed(CoreError),
}

/// Static inputs of one run.
#[derive(Clone, Debug)]
pub struct RestorePlan {
    pub container: ContainerSpec,
    pub readiness: ReadinessPolicy,
    pub teardown: TeardownPolicy,
}

/// Everything a successful run produced.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub container: ContainerHandle,
    pub dump_bytes: usize,
    pub solution: Solution,
    pub outcome: SubmitOutcome,
    pub timings: Vec<StepTiming>,
    pub teardown: TeardownStatus,
}

/// A failed run: the step that broke, why, and what happened to the container.
#[derive(Debug)]
pub struct PipelineError {
    pub step: Step,
    pub source: CoreError,
    /// `None` when no container was ever started.
    pub teardown: Option<TeardownStatus>,
    pub timings: Vec<StepTiming>,
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "step {} failed: {}", self.step, self.source)?;
        if let Some(TeardownStatus::Failed(e)) = &self.teardown {
            write!(f, " (teardown also failed: {})", e)?;
        }
        Ok(())
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Application service running the restore challenge end to end.
///
/// Steps run strictly in order: launch the container, fetch the dump, wait
/// for the database, load the dump, derive the result, submit it. The
/// container is launched before any network call so its boot overlaps the
/// download. The first failing step short-circuits the rest; teardown runs
/// whenever a container was started.
pub struct RestoreService<R, S, L, D, K, C>
where
    R: ContainerRuntime,
    S: DumpSource,
    L: DumpLoader,
    D: SolutionDeriver,
    K: ResultSink,
    C: Clock,
{
    runtime: R,
    source: S,
    loader: L,
    deriver: D,
    sink: K,
    clock: C,
    plan: RestorePlan,
}

type StepResult<T> = Result<T, (Step, CoreError)>;

impl<R, S, L, D, K, C> RestoreService<R, S, L, D, K, C>
where
    R: ContainerRuntime,
    S: DumpSource,
    L: DumpLoader,
    D: SolutionDeriver,
    K: ResultSink,
    C: Clock,
{
    pub fn new(
        runtime: R,
        source: S,
        loader: L,
        deriver: D,
        sink: K,
        clock: C,
        plan: RestorePlan,
    ) -> Self {
        Self {
            runtime,
            source,
            loader,
            deriver,
            sink,
            clock,
            plan,
        }
    }

    pub fn plan(&self) -> &RestorePlan {
        &self.plan
    }

    /// Run the whole pipeline once.
    pub fn run(
        &self,
        token: &AccessToken,
        observer: &dyn StepObserver,
    ) -> Result<RunReport, PipelineError> {
        let mut timings = Vec::new();

        let handle = match self.timed(Step::LaunchContainer, observer, &mut timings, || {
            self.runtime.start(&self.plan.container)
        }) {
            Ok(h) => h,
            Err((step, source)) => {
                return Err(PipelineError {
                    step,
                    source,
                    teardown: None,
                    timings,
                })
            }
        };

        let result = self.run_with_container(token, &handle, observer, &mut timings);
        let teardown = self.teardown(&handle, observer, &mut timings);

        match result {
            Ok((dump_bytes, solution, outcome)) => Ok(RunReport {
                container: handle,
                dump_bytes,
                solution,
                outcome,
                timings,
                teardown,
            }),
            Err((step, source)) => Err(PipelineError {
                step,
                source,
                teardown: Some(teardown),
                timings,
            }),
        }
    }

    fn run_with_container(
        &self,
        token: &AccessToken,
        handle: &ContainerHandle,
        observer: &dyn StepObserver,
        timings: &mut Vec<StepTiming>,
    ) -> StepResult<(usize, Solution, SubmitOutcome)> {
        let dump = self.timed(Step::FetchDump, observer, timings, || {
            self.source.fetch_dump(token)
        })?;
        self.timed(Step::AwaitReady, observer, timings, || self.await_ready(handle))?;
        self.timed(Step::LoadDump, observer, timings, || {
            self.loader.load(handle, &dump)
        })?;
        let dump_bytes = dump.len();
        drop(dump);

        let solution = self.timed(Step::DeriveResult, observer, timings, || {
            self.deriver.derive(handle)
        })?;
        let outcome = self.timed(Step::SubmitResult, observer, timings, || {
            self.sink.submit(token, &solution)
        })?;
        Ok((dump_bytes, solution, outcome))
    }

    fn await_ready(&self, handle: &ContainerHandle) -> Result<(), CoreError> {
        let attempts = self.plan.readiness.attempts.max(1);
        for attempt in 1..=attempts {
            if self.runtime.is_ready(handle)? {
                return Ok(());
            }
            if attempt < attempts && !self.plan.readiness.interval.is_zero() {
                std::thread::sleep(self.plan.readiness.interval);
            }
        }
        Err(CoreError::NotReady { attempts })
    }

    fn teardown(
        &self,
        handle: &ContainerHandle,
        observer: &dyn StepObserver,
        timings: &mut Vec<StepTiming>,
    ) -> TeardownStatus {
        if self.plan.teardown == TeardownPolicy::Keep {
            return TeardownStatus::Kept;
        }
        let res = self.timed(Step::Teardown, observer, timings, || {
            // Attempt removal even when stop fails; report the first error.
            let stopped = self.runtime.stop(handle);
            let removed = self.runtime.remove(handle);
            stopped.and(removed)
        });
        match res {
            Ok(()) => TeardownStatus::Removed,
            Err((_, e)) => TeardownStatus::Failed(e),
        }
    }

    fn timed<T>(
        &self,
        step: Step,
        observer: &dyn StepObserver,
        timings: &mut Vec<StepTiming>,
        f: impl FnOnce() -> Result<T, CoreError>,
    ) -> StepResult<T> {
        observer.started(step);
        let started_at = self.clock.now();
        match f() {
            Ok(v) => {
                let elapsed = self
                    .clock
                    .now()
                    .duration_since(started_at)
                    .unwrap_or_default();
                let timing = StepTiming {
                    step,
                    started_at,
                    elapsed,
                };
                observer.finished(&timing);
                timings.push(timing);
                Ok(v)
            }
            Err(e) => {
                observer.failed(step, &e);
                Err((step, e))
            }
        }
    }
}
