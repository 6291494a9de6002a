use ocms_memory::{
    cache_key, CacheRegistry, CacheType, CmsEvent, CmsUuid, EventBus, EventKind, JobContext,
    MemoryMonitor, MemorySampler, MonitorError, MonitorSettings, NotifyError, RawMemory, Resource,
    ScheduledJob, StatusMessage, StatusNotifier, User, CACHE_CLEAR_COOLDOWN, MB,
};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const MINUTE: u64 = 60_000;

/// Sampler reporting `used_mb` out of 1000 MB.
struct TestSampler {
    used_mb: AtomicU64,
    panic_next: AtomicBool,
    samples: AtomicUsize,
}

impl TestSampler {
    fn new(used_mb: u64) -> Arc<Self> {
        Arc::new(Self {
            used_mb: AtomicU64::new(used_mb),
            panic_next: AtomicBool::new(false),
            samples: AtomicUsize::new(0),
        })
    }

    fn set_used(&self, used_mb: u64) {
        self.used_mb.store(used_mb, Ordering::SeqCst);
    }

    fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

impl MemorySampler for TestSampler {
    fn sample(&self) -> RawMemory {
        self.samples.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("sampler failure");
        }
        let used = self.used_mb.load(Ordering::SeqCst) * MB;
        RawMemory {
            limit_bytes: 1000 * MB,
            committed_bytes: used,
            used_bytes: used,
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<StatusMessage>>,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|message| message.subject.clone())
            .collect()
    }
}

impl StatusNotifier for RecordingNotifier {
    fn send(&self, message: &StatusMessage) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Delivery {
                message: "smtp unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn resource(path: &str) -> Resource {
    Resource {
        structure_id: CmsUuid::new_random(),
        resource_id: CmsUuid::new_random(),
        root_path: path.to_string(),
        type_id: 1,
        is_folder: false,
        flags: 0,
        date_last_modified: 0,
        length: 0,
    }
}

fn settings() -> MonitorSettings {
    MonitorSettings {
        max_usage_percent: 90,
        log_interval: Duration::from_secs(60),
        email_interval: Duration::ZERO,
        warning_interval: Duration::from_secs(3600),
        email_sender: "ocms@localhost".into(),
        email_receivers: vec!["admin@localhost".into()],
    }
}

fn monitor(sampler: &Arc<TestSampler>, settings: MonitorSettings) -> MemoryMonitor {
    MemoryMonitor::new(Arc::new(CacheRegistry::default()), settings).with_sampler(sampler.clone())
}

#[test]
fn usage_below_limit_keeps_caches() {
    let sampler = TestSampler::new(500);
    let monitor = monitor(&sampler, settings());
    monitor.caches().cache_resource("r", resource("/r"));

    let report = monitor.launch_at(0).unwrap();

    assert_eq!(report.status.usage_percent, 50);
    assert!(!report.over_threshold);
    assert!(!report.caches_cleared);
    assert!(monitor.caches().get_cached_resource("r").is_some());
}

#[test]
fn usage_at_the_limit_is_not_over_it() {
    let sampler = TestSampler::new(900);
    let monitor = monitor(&sampler, settings());
    let report = monitor.launch_at(0).unwrap();
    assert_eq!(report.status.usage_percent, 90);
    assert!(!report.over_threshold);
}

#[test]
fn usage_above_limit_flushes_everything_and_fires_event() {
    let sampler = TestSampler::new(950);
    let events = Arc::new(EventBus::new());
    let fired: Arc<Mutex<Vec<EventKind>>> = Arc::new(Mutex::new(Vec::new()));
    events.subscribe({
        let fired = fired.clone();
        Arc::new(move |event: &CmsEvent| fired.lock().unwrap().push(event.kind))
    });
    let monitor = monitor(&sampler, settings()).with_events(events);
    monitor.caches().cache_resource("r", resource("/r"));
    monitor.caches().cache_user(User {
        id: CmsUuid::new_random(),
        name: "/alice".into(),
        email: String::new(),
    });

    let report = monitor.launch_at(0).unwrap();

    assert!(report.over_threshold);
    assert!(report.caches_cleared);
    for ty in CacheType::ALL {
        assert_eq!(monitor.caches().size(ty), 0, "{ty} survived the flush");
    }
    assert_eq!(*fired.lock().unwrap(), vec![EventKind::ClearCaches]);
}

#[test]
fn cache_clear_waits_for_the_cooldown() {
    let sampler = TestSampler::new(950);
    let monitor = monitor(&sampler, settings());
    let cooldown = CACHE_CLEAR_COOLDOWN.as_millis() as u64;

    assert!(monitor.launch_at(0).unwrap().caches_cleared);

    monitor.caches().cache_resource("r", resource("/r"));
    let report = monitor.launch_at(cooldown / 2).unwrap();
    assert!(report.over_threshold);
    assert!(!report.caches_cleared);
    assert!(monitor.caches().get_cached_resource("r").is_some());

    assert!(monitor.launch_at(cooldown).unwrap().caches_cleared);
    assert!(monitor.caches().get_cached_resource("r").is_none());
}

#[test]
fn warning_mail_is_rate_limited() {
    let sampler = TestSampler::new(950);
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(&sampler, settings()).with_notifier(notifier.clone());

    assert!(monitor.launch_at(0).unwrap().warning_sent);
    assert!(!monitor.launch_at(30 * MINUTE).unwrap().warning_sent);
    assert!(monitor.launch_at(60 * MINUTE).unwrap().warning_sent);

    assert_eq!(
        notifier.subjects(),
        vec!["Memory usage warning", "Memory usage warning"]
    );
    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent[0].to, vec!["admin@localhost".to_string()]);
    assert!(sent[0].body.contains("exceeds the configured limit of 90%"));
}

#[test]
fn no_warning_mail_without_receivers() {
    let sampler = TestSampler::new(950);
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = MonitorSettings {
        email_receivers: Vec::new(),
        ..settings()
    };
    let monitor = monitor(&sampler, settings).with_notifier(notifier.clone());

    let report = monitor.launch_at(0).unwrap();

    assert!(!report.warning_sent);
    assert!(report.caches_cleared);
    assert!(notifier.subjects().is_empty());
}

#[test]
fn status_log_fires_on_its_interval_after_the_baseline_run() {
    let sampler = TestSampler::new(100);
    let monitor = monitor(&sampler, settings());

    assert!(!monitor.launch_at(0).unwrap().status_logged);
    assert!(!monitor.launch_at(30_000).unwrap().status_logged);
    assert!(monitor.launch_at(MINUTE).unwrap().status_logged);
    assert!(!monitor.launch_at(MINUTE + 1).unwrap().status_logged);
}

#[test]
fn failing_status_mail_does_not_block_the_status_log() {
    let sampler = TestSampler::new(100);
    let settings = MonitorSettings {
        email_interval: Duration::from_secs(60),
        ..settings()
    };
    let monitor = monitor(&sampler, settings).with_notifier(Arc::new(RecordingNotifier::failing()));

    monitor.launch_at(0).unwrap();
    let report = monitor.launch_at(MINUTE).unwrap();

    assert!(report.status_logged);
    assert!(!report.status_emailed);
}

#[test]
fn status_mail_and_log_are_independent() {
    let sampler = TestSampler::new(100);
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = MonitorSettings {
        log_interval: Duration::ZERO,
        email_interval: Duration::from_secs(60),
        ..settings()
    };
    let monitor = monitor(&sampler, settings).with_notifier(notifier.clone());

    monitor.launch_at(0).unwrap();
    let report = monitor.launch_at(MINUTE).unwrap();

    assert!(!report.status_logged);
    assert!(report.status_emailed);
    assert_eq!(notifier.subjects(), vec!["Memory status report"]);
}

#[test]
fn average_of_uniform_samples_is_that_sample() {
    let sampler = TestSampler::new(400);
    let monitor = monitor(&sampler, settings());
    for run in 0..5 {
        monitor.launch_at(run).unwrap();
    }

    let average = monitor.average_status();
    let current = monitor.current_status();
    assert_eq!(average.sample_count, 5);
    assert_eq!(average.used_memory_mb, current.used_memory_mb);
    assert_eq!(average.usage_percent, 40);
    assert_eq!(average.max_memory_mb, 1000);
}

#[test]
fn average_tracks_changing_usage() {
    let sampler = TestSampler::new(200);
    let monitor = monitor(&sampler, settings());
    monitor.launch_at(0).unwrap();
    sampler.set_used(400);
    monitor.launch_at(1).unwrap();

    assert_eq!(monitor.average_status().used_memory_mb, 300);
    assert_eq!(monitor.current_status().used_memory_mb, 400);
}

#[test]
fn panicking_run_does_not_leave_the_job_stuck() {
    let sampler = TestSampler::new(100);
    let monitor = monitor(&sampler, settings());
    sampler.panic_next.store(true, Ordering::SeqCst);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| monitor.launch_at(0)));

    assert!(outcome.is_err());
    assert!(!monitor.is_running());
    assert!(monitor.launch_at(1).is_ok());
}

/// Sampler that parks inside `sample` until released.
struct GateSampler {
    entered: Barrier,
    release: Barrier,
}

impl MemorySampler for GateSampler {
    fn sample(&self) -> RawMemory {
        self.entered.wait();
        self.release.wait();
        RawMemory {
            limit_bytes: 1000 * MB,
            committed_bytes: 0,
            used_bytes: 0,
        }
    }
}

#[test]
fn overlapping_runs_are_rejected() {
    let sampler = Arc::new(GateSampler {
        entered: Barrier::new(2),
        release: Barrier::new(2),
    });
    let monitor = Arc::new(
        MemoryMonitor::new(Arc::new(CacheRegistry::default()), settings()).with_sampler(sampler.clone()),
    );

    let background = {
        let monitor = monitor.clone();
        thread::spawn(move || monitor.launch_at(0))
    };
    sampler.entered.wait();

    assert!(monitor.is_running());
    assert!(matches!(monitor.launch_at(1), Err(MonitorError::AlreadyRunning)));

    sampler.release.wait();
    assert!(background.join().unwrap().is_ok());
    assert!(!monitor.is_running());
}

#[test]
fn scheduled_launch_returns_no_result() {
    let sampler = TestSampler::new(100);
    let monitor = monitor(&sampler, settings());
    let job: &dyn ScheduledJob = &monitor;

    let context = JobContext::new("memory-monitor");
    assert_eq!(job.launch(&context, &BTreeMap::new()), None);
    assert_eq!(sampler.samples(), 1);
}

#[test]
fn scheduled_launch_runs_at_the_firing_time() {
    let sampler = TestSampler::new(950);
    let monitor = monitor(&sampler, settings());
    let job: &dyn ScheduledJob = &monitor;
    let context = JobContext::new("memory-monitor");
    let cooldown = CACHE_CLEAR_COOLDOWN.as_millis() as u64;

    job.launch(&context.clone().with_fired_at(0), &BTreeMap::new());

    monitor.caches().cache_resource("r", resource("/r"));
    job.launch(&context.clone().with_fired_at(cooldown / 2), &BTreeMap::new());
    assert!(monitor.caches().get_cached_resource("r").is_some());

    job.launch(&context.with_fired_at(cooldown), &BTreeMap::new());
    assert!(monitor.caches().get_cached_resource("r").is_none());
}

#[test]
fn events_invalidate_their_scopes() {
    let sampler = TestSampler::new(100);
    let monitor = Arc::new(monitor(&sampler, settings()));
    let bus = EventBus::new();
    monitor.listen(&bus);
    let caches = monitor.caches();

    caches.cache_resource(cache_key(false, &["/a"]), resource("/a"));
    caches.cache_resource(cache_key(true, &["/a"]), resource("/a"));
    bus.fire(&CmsEvent::new(EventKind::ClearOfflineCaches));
    assert!(caches.get_cached_resource(&cache_key(false, &["/a"])).is_none());
    assert!(caches.get_cached_resource(&cache_key(true, &["/a"])).is_some());

    caches.cache_group(ocms_memory::Group {
        id: CmsUuid::new_random(),
        name: "Users".into(),
        description: String::new(),
    });
    bus.fire(&CmsEvent::new(EventKind::GroupModified));
    assert!(caches.get_cached_group("Users").is_none());
    assert!(caches.get_cached_resource(&cache_key(true, &["/a"])).is_some());

    bus.fire(&CmsEvent::new(EventKind::PublishProject));
    assert_eq!(caches.size(CacheType::Resource), 0);
}

#[test]
fn dropped_monitor_stops_listening() {
    let sampler = TestSampler::new(100);
    let caches = Arc::new(CacheRegistry::default());
    let bus = EventBus::new();
    {
        let monitor = Arc::new(MemoryMonitor::new(caches.clone(), settings()).with_sampler(sampler));
        monitor.listen(&bus);
    }
    caches.cache_resource("r", resource("/r"));
    bus.fire(&CmsEvent::new(EventKind::ClearCaches));
    assert!(caches.get_cached_resource("r").is_some());
}

#[test]
fn shutdown_flushes_caches() {
    let sampler = TestSampler::new(100);
    let monitor = monitor(&sampler, settings());
    monitor.caches().cache_resource("r", resource("/r"));

    monitor.shutdown();

    assert_eq!(monitor.caches().size(CacheType::Resource), 0);
}

#[tokio::test]
async fn periodic_job_runs_until_cancelled() {
    let sampler = TestSampler::new(100);
    let monitor = Arc::new(monitor(&sampler, settings()));
    let cancel = CancellationToken::new();

    let handle = monitor.spawn_periodic(Duration::from_millis(5), cancel.clone());

    let deadline = Instant::now() + Duration::from_secs(10);
    while sampler.samples() < 2 {
        assert!(Instant::now() < deadline, "periodic job did not run");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();
    handle.await.unwrap();

    let runs = sampler.samples();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(sampler.samples(), runs);
    assert!(!monitor.is_running());
}
