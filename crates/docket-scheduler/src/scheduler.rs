//! Cron-driven job triggering.

use chrono::{DateTime, Utc};
use docket_core::{CronSchedule, Error, Executor, JobDefinition, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};

/// The first fire time of `schedule` strictly after `now`.
pub fn next_fire_time(schedule: &CronSchedule, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    schedule
        .next_after(now)
        .ok_or_else(|| Error::InvalidSchedule(format!("{}: no upcoming fire time", schedule)))
}

struct ScheduledJob {
    job: Arc<JobDefinition>,
    schedule: CronSchedule,
}

/// Runs one loop per scheduled job, each firing the job through an
/// [`Executor`] whenever its cron expression comes due.
///
/// Every loop and every invocation it fires is tracked, so [`shutdown`]
/// can cancel them and wait until all of them are gone. A failed
/// invocation is logged and never stops its loop.
///
/// [`shutdown`]: TriggerScheduler::shutdown
pub struct TriggerScheduler {
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    jobs: Vec<ScheduledJob>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl TriggerScheduler {
    /// Scheduler for every job in `jobs` that has a schedule.
    ///
    /// Fails if any schedule does not parse.
    pub fn new(
        executor: Arc<dyn Executor>,
        jobs: impl IntoIterator<Item = JobDefinition>,
    ) -> Result<Self> {
        let mut scheduled = Vec::new();
        for job in jobs {
            let Some(expression) = job.schedule.as_deref() else {
                continue;
            };
            let schedule = CronSchedule::parse(expression)?;
            scheduled.push(ScheduledJob {
                job: Arc::new(job),
                schedule,
            });
        }

        Ok(Self {
            executor,
            clock: Arc::new(SystemClock),
            jobs: scheduled,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Stop when `parent` is cancelled, as well as on [`shutdown`].
    ///
    /// [`shutdown`]: TriggerScheduler::shutdown
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Names of the jobs this scheduler drives.
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|s| s.job.name.as_str()).collect()
    }

    /// Number of live loops plus in-flight invocations.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Spawn one loop per scheduled job. Later calls do nothing.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already started");
            return;
        }

        for scheduled in &self.jobs {
            info!(
                job = %scheduled.job.name,
                schedule = %scheduled.schedule,
                "Scheduling job"
            );
            let job_loop = JobLoop {
                job: scheduled.job.clone(),
                schedule: scheduled.schedule.clone(),
                executor: self.executor.clone(),
                clock: self.clock.clone(),
                cancel: self.cancel.clone(),
                tracker: self.tracker.clone(),
            };
            self.tracker.spawn(job_loop.run());
        }
    }

    /// Wait until every loop and invocation has finished.
    ///
    /// Loops only finish once cancelled, so without a cancellation this
    /// waits for the life of the process.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Cancel all loops and in-flight invocations and wait for them.
    pub async fn shutdown(&self) {
        info!(active = self.tracker.len(), "Shutting down scheduler");
        self.cancel.cancel();
        self.wait().await;
        info!("Scheduler stopped");
    }
}

struct JobLoop {
    job: Arc<JobDefinition>,
    schedule: CronSchedule,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl JobLoop {
    async fn run(self) {
        let mut last_fire: Option<DateTime<Utc>> = None;
        loop {
            // a wall clock that lags the timer must not pick the same slot again
            let now = self.clock.now();
            let from = last_fire.map_or(now, |last| now.max(last));
            let next = match next_fire_time(&self.schedule, from) {
                Ok(next) => next,
                Err(e) => {
                    warn!(job = %self.job.name, error = %e, "Job will not run again");
                    return;
                }
            };
            debug!(job = %self.job.name, next = %next, "Next run");

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = self.clock.sleep_until(next) => {}
            }

            last_fire = Some(next);

            // arm the next cycle before this run finishes
            self.tracker.spawn(invoke(
                self.job.clone(),
                self.executor.clone(),
                self.cancel.clone(),
            ));
        }
    }
}

async fn invoke(job: Arc<JobDefinition>, executor: Arc<dyn Executor>, cancel: CancellationToken) {
    info!(job = %job.name, "Running scheduled job");

    match executor.execute(&job, &cancel).await {
        Ok(result) => {
            for line in result.lines() {
                info!(job = %job.name, "{}", line);
            }
            if result.status.is_success() {
                info!(job = %job.name, "Scheduled run succeeded");
            } else {
                warn!(job = %job.name, status = ?result.status, "Scheduled run failed");
            }
        }
        Err(Error::Cancelled) => {
            info!(job = %job.name, "Scheduled run cancelled");
        }
        Err(e) => {
            error!(job = %job.name, error = %e, "Scheduled run failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::PausedClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use docket_core::{ExecutionResult, JobKind};
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Reports each invocation on a channel; fails or hangs for chosen jobs.
    struct RecordingExecutor {
        fired: mpsc::UnboundedSender<String>,
        failing: HashSet<String>,
        hanging: HashSet<String>,
    }

    impl RecordingExecutor {
        fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
            let (fired, rx) = mpsc::unbounded_channel();
            let executor = Self {
                fired,
                failing: HashSet::new(),
                hanging: HashSet::new(),
            };
            (executor, rx)
        }

        fn failing(mut self, name: &str) -> Self {
            self.failing.insert(name.to_string());
            self
        }

        fn hanging(mut self, name: &str) -> Self {
            self.hanging.insert(name.to_string());
            self
        }
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn execute(
            &self,
            job: &JobDefinition,
            cancel: &CancellationToken,
        ) -> Result<ExecutionResult> {
            let _ = self.fired.send(job.name.clone());
            if self.hanging.contains(&job.name) {
                cancel.cancelled().await;
                return Err(Error::Cancelled);
            }
            if self.failing.contains(&job.name) {
                return Err(Error::CreateFailed("boom".to_string()));
            }
            Ok(ExecutionResult::succeeded(&b"ok\n"[..]))
        }
    }

    fn scheduled(name: &str, schedule: &str) -> JobDefinition {
        let mut job = JobDefinition::new(name, JobKind::SingleRun, "alpine");
        job.schedule = Some(schedule.to_string());
        job
    }

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn scheduler(executor: RecordingExecutor, jobs: Vec<JobDefinition>) -> TriggerScheduler {
        TriggerScheduler::new(Arc::new(executor), jobs)
            .unwrap()
            .with_clock(Arc::new(PausedClock::starting_at(origin())))
    }

    async fn next_fired(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(3600), rx.recv())
            .await
            .expect("no invocation within an hour")
            .expect("executor dropped")
    }

    #[test]
    fn test_next_fire_time_on_minute_boundary() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let now = origin();

        let next = next_fire_time(&schedule, now).unwrap();
        assert!(next > now);
        assert_eq!(next, now + chrono::Duration::minutes(1));
    }

    #[test]
    fn test_next_fire_time_between_boundaries() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let now = origin() + chrono::Duration::seconds(59);

        let next = next_fire_time(&schedule, now).unwrap();
        assert_eq!(next, origin() + chrono::Duration::minutes(1));
    }

    #[test]
    fn test_unscheduled_jobs_are_skipped() {
        let (executor, _rx) = RecordingExecutor::new();
        let manual = JobDefinition::new("manual", JobKind::SingleRun, "alpine");
        let scheduler = TriggerScheduler::new(
            Arc::new(executor),
            vec![manual, scheduled("nightly", "0 3 * * *")],
        )
        .unwrap();

        assert_eq!(scheduler.job_names(), vec!["nightly"]);
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let (executor, _rx) = RecordingExecutor::new();
        let result = TriggerScheduler::new(
            Arc::new(executor),
            vec![scheduled("broken", "not a schedule")],
        );

        assert!(matches!(result, Err(Error::InvalidSchedule(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_fires_repeatedly() {
        let (executor, mut rx) = RecordingExecutor::new();
        let scheduler = scheduler(executor, vec![scheduled("tick", "*/10 * * * * *")]);
        scheduler.start();

        for _ in 0..3 {
            assert_eq!(next_fired(&mut rx).await, "tick");
        }

        scheduler.shutdown().await;
        assert_eq!(scheduler.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_waits_for_fire_time() {
        let (executor, mut rx) = RecordingExecutor::new();
        let scheduler = scheduler(executor, vec![scheduled("minutely", "* * * * *")]);
        let started = tokio::time::Instant::now();
        scheduler.start();

        next_fired(&mut rx).await;
        assert_eq!(started.elapsed(), Duration::from_secs(60));

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_contained_to_one_run() {
        let (executor, mut rx) = RecordingExecutor::new();
        let executor = executor.failing("broken");
        let scheduler = scheduler(
            executor,
            vec![
                scheduled("broken", "*/10 * * * * *"),
                scheduled("healthy", "*/10 * * * * *"),
            ],
        );
        scheduler.start();

        let mut broken = 0;
        let mut healthy = 0;
        while broken < 3 || healthy < 3 {
            match next_fired(&mut rx).await.as_str() {
                "broken" => broken += 1,
                "healthy" => healthy += 1,
                other => panic!("unexpected job {}", other),
            }
        }

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_run_does_not_delay_next_cycle() {
        let (executor, mut rx) = RecordingExecutor::new();
        let executor = executor.hanging("stuck");
        let scheduler = scheduler(executor, vec![scheduled("stuck", "*/10 * * * * *")]);
        scheduler.start();

        for _ in 0..3 {
            next_fired(&mut rx).await;
        }
        // the loop plus three runs that never finished on their own
        assert_eq!(scheduler.active_tasks(), 4);

        scheduler.shutdown().await;
        assert_eq!(scheduler.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_token_stops_loops() {
        let (executor, mut rx) = RecordingExecutor::new();
        let parent = CancellationToken::new();
        let scheduler = scheduler(executor, vec![scheduled("tick", "*/10 * * * * *")])
            .with_parent_token(&parent);
        scheduler.start();

        next_fired(&mut rx).await;
        parent.cancel();
        scheduler.wait().await;

        assert_eq!(scheduler.active_tasks(), 0);
    }

    /// Wall clock running 500 ppm slow against tokio time, sleeping the
    /// way `SystemClock` does.
    struct SlowClock {
        origin: DateTime<Utc>,
        started: tokio::time::Instant,
    }

    #[async_trait]
    impl Clock for SlowClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = self.started.elapsed();
            self.origin + chrono::Duration::from_std(elapsed - elapsed / 2000).unwrap()
        }

        async fn sleep_until(&self, deadline: DateTime<Utc>) {
            if let Ok(remaining) = (deadline - self.now()).to_std() {
                tokio::time::sleep(remaining).await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_wall_clock_fires_each_slot_once() {
        let (executor, mut rx) = RecordingExecutor::new();
        let clock = SlowClock {
            origin: origin() + chrono::Duration::seconds(30),
            started: tokio::time::Instant::now(),
        };
        let scheduler = TriggerScheduler::new(
            Arc::new(executor),
            vec![scheduled("minutely", "* * * * *")],
        )
        .unwrap()
        .with_clock(Arc::new(clock));
        scheduler.start();

        next_fired(&mut rx).await;

        // the 12:01 slot fired; nothing more until 12:02
        let again = tokio::time::timeout(Duration::from_secs(40), rx.recv()).await;
        assert!(again.is_err(), "same slot fired twice");

        next_fired(&mut rx).await;
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (executor, _rx) = RecordingExecutor::new();
        let scheduler = scheduler(executor, vec![scheduled("nightly", "0 3 * * *")]);

        scheduler.start();
        scheduler.start();
        assert_eq!(scheduler.active_tasks(), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_with_nothing_scheduled() {
        let (executor, _rx) = RecordingExecutor::new();
        let scheduler = scheduler(executor, vec![]);

        scheduler.start();
        scheduler.shutdown().await;
        assert_eq!(scheduler.active_tasks(), 0);
    }
}
