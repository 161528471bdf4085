// Live data source - demo/live session orchestration with fallback polling
use crate::application::demo_simulator::DemoSimulator;
use crate::application::fallback::{first_success, FallbackError, Strategy};
use crate::application::payload::decode_list;
use crate::application::transport::{AuthMode, CallRequest, Transport, TransportError};
use crate::domain::device::{Device, Frame, Position};
use crate::infrastructure::config::{endpoint_url, BackendSettings, DemoSettings, PollingSettings};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    Idle,
    Demo,
    Live,
}

impl FeedMode {
    pub fn for_auth(auth: &AuthMode) -> Self {
        match auth {
            AuthMode::None => FeedMode::Demo,
            AuthMode::Bearer(_) | AuthMode::Session => FeedMode::Live,
        }
    }
}

/// Everything downstream consumers see of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub mode: FeedMode,
    pub devices: Vec<Device>,
    pub positions: Vec<Position>,
    pub loading: bool,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for FeedSnapshot {
    fn default() -> Self {
        Self {
            mode: FeedMode::Idle,
            devices: Vec::new(),
            positions: Vec::new(),
            loading: false,
            error: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    Applied,
    Failed,
    /// Another poll was in flight, or the session is not live.
    Skipped,
    /// The session ended while the poll was running.
    Discarded,
}

/// One devices/positions endpoint pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEndpoints {
    pub name: String,
    pub devices: String,
    pub positions: String,
}

impl Strategy for FeedEndpoints {
    fn name(&self) -> &str {
        &self.name
    }
}

impl FeedEndpoints {
    /// Proxy pair first, then the direct pair.
    pub fn from_settings(backend: &BackendSettings) -> Vec<Self> {
        [("proxy", &backend.proxy_url), ("direct", &backend.direct_url)]
            .into_iter()
            .map(|(name, base)| Self {
                name: name.to_string(),
                devices: endpoint_url(base, &backend.devices_path),
                positions: endpoint_url(base, &backend.positions_path),
            })
            .collect()
    }
}

struct SessionContext {
    generation: u64,
    mode: FeedMode,
    auth: AuthMode,
    in_flight: AtomicBool,
}

struct ActiveSession {
    context: Arc<SessionContext>,
    task: JoinHandle<()>,
}

/// Releases the in-flight flag on drop, including when the poll is cancelled.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    endpoints: Vec<FeedEndpoints>,
    polling: PollingSettings,
    demo: DemoSettings,
    snapshot: watch::Sender<FeedSnapshot>,
    next_generation: AtomicU64,
    session: Mutex<Option<ActiveSession>>,
}

#[derive(Clone)]
pub struct LiveDataSource {
    inner: Arc<Inner>,
}

impl LiveDataSource {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: Vec<FeedEndpoints>,
        polling: PollingSettings,
        demo: DemoSettings,
    ) -> Self {
        let (snapshot, _) = watch::channel(FeedSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                transport,
                endpoints,
                polling,
                demo,
                snapshot,
                next_generation: AtomicU64::new(1),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Start a session for `auth`, tearing down whatever ran before.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, auth: AuthMode) {
        let mut session = self.inner.session.lock();
        if let Some(previous) = session.take() {
            previous.task.abort();
            tracing::info!("Stopped {:?} feed session #{}", previous.context.mode, previous.context.generation);
        }

        let mode = FeedMode::for_auth(&auth);
        let context = Arc::new(SessionContext {
            generation: self.inner.next_generation.fetch_add(1, Ordering::AcqRel),
            mode,
            auth,
            in_flight: AtomicBool::new(false),
        });

        self.inner.snapshot.send_modify(|snapshot| {
            *snapshot = FeedSnapshot {
                mode,
                loading: mode == FeedMode::Live,
                ..FeedSnapshot::default()
            };
        });

        let inner = self.inner.clone();
        let task_context = context.clone();
        let task = match mode {
            FeedMode::Demo => tokio::spawn(async move { inner.run_demo(task_context).await }),
            _ => tokio::spawn(async move { inner.run_live(task_context).await }),
        };

        tracing::info!("Started {:?} feed session #{}", mode, context.generation);
        *session = Some(ActiveSession { context, task });
    }

    /// End the current session and clear its data. Pending timers and fetches
    /// are cancelled and nothing from the old session reaches the snapshot afterwards.
    pub fn stop(&self) {
        let mut session = self.inner.session.lock();
        if let Some(previous) = session.take() {
            previous.task.abort();
            tracing::info!("Stopped {:?} feed session #{}", previous.context.mode, previous.context.generation);
        }
        self.inner.snapshot.send_modify(|snapshot| {
            *snapshot = FeedSnapshot::default();
        });
    }

    /// Poll now, out of band. A no-op unless a live session is active and idle.
    pub async fn refresh(&self) -> PollOutcome {
        let context = {
            let session = self.inner.session.lock();
            match session.as_ref() {
                Some(active) if active.context.mode == FeedMode::Live => active.context.clone(),
                _ => return PollOutcome::Skipped,
            }
        };
        self.inner.poll(&context).await
    }
}

impl Inner {
    async fn run_live(self: Arc<Self>, context: Arc<SessionContext>) {
        let mut ticker = time::interval(self.polling.live_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.poll(&context).await;
        }
    }

    async fn run_demo(self: Arc<Self>, context: Arc<SessionContext>) {
        let mut simulator = DemoSimulator::new(self.demo.clone(), Utc::now());
        self.apply_frame(context.generation, simulator.frame());

        let period = self.polling.demo_interval();
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            simulator.step(Utc::now());
            self.apply_frame(context.generation, simulator.frame());
        }
    }

    async fn poll(&self, context: &SessionContext) -> PollOutcome {
        let Some(_guard) = InFlightGuard::acquire(&context.in_flight) else {
            tracing::debug!("Poll already in flight for session #{}, skipping", context.generation);
            return PollOutcome::Skipped;
        };

        self.apply_if_current(context.generation, |snapshot| snapshot.loading = true);

        match self.fetch_frame(&context.auth).await {
            Ok(frame) => {
                tracing::debug!(
                    "Polled {} devices and {} positions",
                    frame.devices.len(),
                    frame.positions.len()
                );
                if self.apply_frame(context.generation, frame) {
                    PollOutcome::Applied
                } else {
                    PollOutcome::Discarded
                }
            }
            Err(e) => {
                tracing::warn!("Poll failed, keeping last known data: {}", e);
                let message = e.to_string();
                let applied = self.apply_if_current(context.generation, |snapshot| {
                    snapshot.loading = false;
                    snapshot.error = Some(message);
                });
                if applied {
                    PollOutcome::Failed
                } else {
                    PollOutcome::Discarded
                }
            }
        }
    }

    async fn fetch_frame(&self, auth: &AuthMode) -> Result<Frame, FallbackError> {
        first_success(&self.endpoints, |endpoints| self.fetch_pair(endpoints, auth))
            .await
            .map(|attempt| attempt.value)
    }

    /// Devices and positions are fetched concurrently and fail together.
    async fn fetch_pair(&self, endpoints: &FeedEndpoints, auth: &AuthMode) -> Result<Frame, TransportError> {
        let (devices, positions) = futures::try_join!(
            self.transport.call(&endpoints.devices, CallRequest::get(auth.clone())),
            self.transport.call(&endpoints.positions, CallRequest::get(auth.clone())),
        )?;

        Ok(Frame {
            devices: decode_list(devices, "devices")?,
            positions: decode_list(positions, "positions")?,
        })
    }

    fn apply_frame(&self, generation: u64, frame: Frame) -> bool {
        self.apply_if_current(generation, |snapshot| {
            snapshot.devices = frame.devices;
            snapshot.positions = frame.positions;
            snapshot.loading = false;
            snapshot.error = None;
            snapshot.updated_at = Some(Utc::now());
        })
    }

    /// Apply `update` as one change, only while `generation` is still the active session.
    fn apply_if_current(&self, generation: u64, update: impl FnOnce(&mut FeedSnapshot)) -> bool {
        let session = self.session.lock();
        let current = session.as_ref().map(|active| active.context.generation);
        if current != Some(generation) {
            tracing::debug!("Dropping result of ended session #{}", generation);
            return false;
        }
        self.snapshot.send_modify(update);
        true
    }
}
