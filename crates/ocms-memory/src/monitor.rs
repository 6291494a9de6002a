use crate::error::{MonitorError, NotifyError};
use crate::events::{CmsEvent, EventBus, EventKind};
use crate::notify::{StatusMessage, StatusNotifier};
use crate::registry::CacheRegistry;
use crate::report::{status_report, warning_report};
use crate::status::{MemorySampler, MemoryStatus, SystemMemorySampler};
use crate::util::now_millis;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Minimum spacing between two proactive flushes of all caches.
pub const CACHE_CLEAR_COOLDOWN: Duration = Duration::from_secs(10 * 60);

const WARNING_SUBJECT: &str = "Memory usage warning";
const STATUS_SUBJECT: &str = "Memory status report";

/// What the scheduler knows about the run it is starting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_name: String,
    /// Scheduled firing time, epoch milliseconds.
    pub fired_at: u64,
}

impl JobContext {
    /// Context for a run of `job_name` firing now.
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            fired_at: now_millis(),
        }
    }

    #[must_use]
    pub fn with_fired_at(mut self, fired_at: u64) -> Self {
        self.fired_at = fired_at;
        self
    }
}

/// Contract for jobs driven by an external scheduler.
pub trait ScheduledJob: Send + Sync {
    /// Run the job once. The returned string is the job's result message, if any.
    fn launch(&self, context: &JobContext, parameters: &BTreeMap<String, String>)
        -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Usage above this percentage of the maximum triggers warnings and a cache flush.
    pub max_usage_percent: u64,
    /// Spacing of status log reports; zero disables them.
    pub log_interval: Duration,
    /// Spacing of status mails; zero disables them.
    pub email_interval: Duration,
    /// Minimum spacing of warning mails.
    pub warning_interval: Duration,
    pub email_sender: String,
    pub email_receivers: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            max_usage_percent: 90,
            log_interval: Duration::from_secs(600),
            email_interval: Duration::ZERO,
            warning_interval: Duration::from_secs(3600),
            email_sender: "ocms@localhost".to_string(),
            email_receivers: Vec::new(),
        }
    }
}

/// What a single run of the monitor did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchReport {
    pub status: MemoryStatus,
    pub over_threshold: bool,
    pub warning_sent: bool,
    pub caches_cleared: bool,
    pub status_logged: bool,
    pub status_emailed: bool,
}

#[derive(Default)]
struct State {
    current: MemoryStatus,
    average: MemoryStatus,
    // `None` until the first run.
    last_log: Option<u64>,
    last_email: Option<u64>,
    last_warning: Option<u64>,
    last_cache_clear: Option<u64>,
}

/// Resets the running flag on every exit path, including unwinding.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic memory watchdog over a [`CacheRegistry`].
///
/// Each run samples memory, and when usage exceeds [`MonitorSettings::max_usage_percent`] it
/// warns, flushes every cache (at most once per [`CACHE_CLEAR_COOLDOWN`]) and fires
/// [`EventKind::ClearCaches`]. Status reports go to the log and, optionally, to mail on their
/// own intervals.
pub struct MemoryMonitor {
    caches: Arc<CacheRegistry>,
    settings: MonitorSettings,
    sampler: Arc<dyn MemorySampler>,
    notifier: Option<Arc<dyn StatusNotifier>>,
    events: Option<Arc<EventBus>>,
    state: Mutex<State>,
    running: AtomicBool,
}

impl MemoryMonitor {
    pub fn new(caches: Arc<CacheRegistry>, settings: MonitorSettings) -> Self {
        Self {
            caches,
            settings,
            sampler: Arc::new(SystemMemorySampler::new()),
            notifier: None,
            events: None,
            state: Mutex::new(State::default()),
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.sampler = sampler;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Bus that receives [`EventKind::ClearCaches`] after a proactive flush.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn caches(&self) -> &Arc<CacheRegistry> {
        &self.caches
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn current_status(&self) -> MemoryStatus {
        self.state.lock().current
    }

    pub fn average_status(&self) -> MemoryStatus {
        self.state.lock().average
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn launch_now(&self) -> Result<LaunchReport, MonitorError> {
        self.launch_at(now_millis())
    }

    /// Run the monitor once as if the clock read `now` (milliseconds since the epoch).
    ///
    /// Returns [`MonitorError::AlreadyRunning`] when another run is in progress.
    pub fn launch_at(&self, now: u64) -> Result<LaunchReport, MonitorError> {
        let _guard = RunningGuard::acquire(&self.running).ok_or(MonitorError::AlreadyRunning)?;

        let (status, average) = {
            let mut state = self.state.lock();
            state.current.update(self.sampler.as_ref());
            let current = state.current;
            state.average.calculate_average(&current);
            (current, state.average)
        };

        let mut report = LaunchReport {
            status,
            ..LaunchReport::default()
        };

        if status.usage_percent > self.settings.max_usage_percent {
            report.over_threshold = true;
            self.handle_high_usage(now, &status, &average, &mut report);
        }

        let (log_due, email_due) = {
            let mut state = self.state.lock();
            let log_due = interval_due(&mut state.last_log, now, self.settings.log_interval);
            let email_due = self.can_email()
                && interval_due(&mut state.last_email, now, self.settings.email_interval);
            (log_due, email_due)
        };

        if log_due || email_due {
            let text = status_report(
                &status,
                &average,
                &self.caches.cache_statistics(),
                self.settings.max_usage_percent,
            );
            if log_due {
                tracing::info!(target: "ocms.memory", "{text}");
                report.status_logged = true;
            }
            if email_due {
                report.status_emailed = self.send_best_effort(STATUS_SUBJECT, text);
            }
        }

        Ok(report)
    }

    fn handle_high_usage(
        &self,
        now: u64,
        status: &MemoryStatus,
        average: &MemoryStatus,
        report: &mut LaunchReport,
    ) {
        tracing::warn!(
            target: "ocms.memory",
            usage_percent = status.usage_percent,
            max_usage_percent = self.settings.max_usage_percent,
            used_mb = status.used_memory_mb,
            max_mb = status.max_memory_mb,
            "memory usage above configured limit"
        );

        if self.can_email() {
            let warning_due = {
                let mut state = self.state.lock();
                cooldown_elapsed(&mut state.last_warning, now, self.settings.warning_interval)
            };
            if warning_due {
                let text = warning_report(
                    status,
                    average,
                    &self.caches.cache_statistics(),
                    self.settings.max_usage_percent,
                );
                report.warning_sent = self.send_best_effort(WARNING_SUBJECT, text);
            }
        }

        let clear_due = {
            let mut state = self.state.lock();
            cooldown_elapsed(&mut state.last_cache_clear, now, CACHE_CLEAR_COOLDOWN)
        };
        if clear_due {
            self.clear_caches();
            report.caches_cleared = true;
        }
    }

    fn clear_caches(&self) {
        self.caches.flush_all();
        if let Some(events) = &self.events {
            events.fire(&CmsEvent::new(EventKind::ClearCaches));
        }
        release_free_memory();
        tracing::info!(target: "ocms.memory", "flushed all caches after high memory usage");
    }

    fn can_email(&self) -> bool {
        self.notifier.is_some() && !self.settings.email_receivers.is_empty()
    }

    /// Deliver a status message; failures are logged and reported as `false`.
    fn send_best_effort(&self, subject: &str, body: String) -> bool {
        match self.send(subject, body) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target: "ocms.memory",
                    subject,
                    error = %err,
                    "failed to send memory monitor message"
                );
                false
            }
        }
    }

    fn send(&self, subject: &str, body: String) -> Result<(), MonitorError> {
        let Some(notifier) = &self.notifier else {
            return Ok(());
        };
        if self.settings.email_receivers.is_empty() {
            return Err(NotifyError::NoReceivers.into());
        }
        let message = StatusMessage {
            from: self.settings.email_sender.clone(),
            to: self.settings.email_receivers.clone(),
            subject: subject.to_string(),
            body,
        };
        notifier.send(&message)?;
        Ok(())
    }

    /// React to a system event by invalidating the affected caches.
    pub fn handle_event(&self, event: &CmsEvent) {
        match event.kind {
            EventKind::ClearCaches | EventKind::PublishProject => self.caches.flush_all(),
            EventKind::ClearOfflineCaches => self.caches.clear_offline_caches(),
            EventKind::ClearOnlineCaches => self.caches.clear_online_caches(),
            EventKind::UserModified | EventKind::GroupModified | EventKind::OuModified => {
                self.caches.clear_principals_cache()
            }
        }
    }

    /// Subscribe to `bus`. The subscription does not keep the monitor alive.
    pub fn listen(self: &Arc<Self>, bus: &EventBus) {
        let monitor = Arc::downgrade(self);
        bus.subscribe(Arc::new(move |event: &CmsEvent| {
            if let Some(monitor) = monitor.upgrade() {
                monitor.handle_event(event);
            }
        }));
    }

    /// Drive [`MemoryMonitor::launch_now`] every `period` on the blocking pool until `cancel`
    /// fires. Must be called from within a tokio runtime.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let job = Arc::clone(&monitor);
                        match tokio::task::spawn_blocking(move || job.launch_now()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(err)) => {
                                tracing::debug!(target: "ocms.memory", error = %err, "skipped memory monitor run");
                            }
                            Err(err) => {
                                tracing::warn!(target: "ocms.memory", error = %err, "memory monitor run failed");
                            }
                        }
                    }
                }
            }
            tracing::debug!(target: "ocms.memory", "memory monitor stopped");
        })
    }

    /// Log a final status report and drop all cached values.
    pub fn shutdown(&self) {
        let (status, average) = {
            let mut state = self.state.lock();
            state.current.update(self.sampler.as_ref());
            (state.current, state.average)
        };
        let text = status_report(
            &status,
            &average,
            &self.caches.cache_statistics(),
            self.settings.max_usage_percent,
        );
        tracing::info!(target: "ocms.memory", "final memory status\n{text}");
        self.caches.flush_all();
    }
}

impl ScheduledJob for MemoryMonitor {
    fn launch(
        &self,
        context: &JobContext,
        _parameters: &BTreeMap<String, String>,
    ) -> Option<String> {
        if let Err(err) = self.launch_at(context.fired_at) {
            tracing::debug!(
                target: "ocms.memory",
                job = %context.job_name,
                error = %err,
                "skipped memory monitor run"
            );
        }
        None
    }
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Periodic trigger: the first call only records the baseline; later calls fire once
/// `interval` has passed since the last firing. A zero interval never fires.
fn interval_due(last: &mut Option<u64>, now: u64, interval: Duration) -> bool {
    if interval.is_zero() {
        return false;
    }
    match *last {
        None => {
            *last = Some(now);
            false
        }
        Some(previous) if now.saturating_sub(previous) >= interval.as_millis() as u64 => {
            *last = Some(now);
            true
        }
        Some(_) => false,
    }
}

/// Rate limit: fires immediately the first time, then at most once per `cooldown`.
fn cooldown_elapsed(last: &mut Option<u64>, now: u64, cooldown: Duration) -> bool {
    let elapsed = match *last {
        None => true,
        Some(previous) => now.saturating_sub(previous) >= cooldown.as_millis() as u64,
    };
    if elapsed {
        *last = Some(now);
    }
    elapsed
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn release_free_memory() {
    // SAFETY: `malloc_trim` only returns free heap pages to the OS.
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn release_free_memory() {}
