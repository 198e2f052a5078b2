//! Preview loader and failure detector
//!
//! Every frame of a session is driven from a single task: mounts are staggered
//! by a fixed increment per index, then each frame races its native signal
//! against the inspection timer. A newer session cancels everything that is
//! still pending, including mounts that have not happened yet.

use crate::embed::{Embedder, LoadSignal, MountRequest, MountedFrame};
use crate::frame::{Frame, FrameEvent, FrameState, Resolution};
use crate::sandbox::SandboxFlags;
use crate::session::{FramePlan, PreviewSession, SessionClock, SessionId};
use futures::future::{self, join_all};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

/// Delay between consecutive mounts in a session
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(100);
/// How long a frame may stay silent before its document is inspected
pub const DEFAULT_INSPECT_DELAY: Duration = Duration::from_millis(5000);

/// Timer settings for the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderTimings {
    pub stagger: Duration,
    pub inspect_delay: Duration,
}

impl Default for LoaderTimings {
    fn default() -> Self {
        Self {
            stagger: DEFAULT_STAGGER,
            inspect_delay: DEFAULT_INSPECT_DELAY,
        }
    }
}

/// State change published while a session loads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameUpdate {
    pub session: SessionId,
    pub device: &'static str,
    pub state: FrameState,
}

/// How a frame ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FrameOutcome {
    Settled {
        state: FrameState,
        resolution: Resolution,
    },
    /// A newer session started before this frame settled
    Superseded,
}

/// Final report for one device of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub session: SessionId,
    pub device: &'static str,
    pub index: usize,
    /// Time from batch start to mount; `None` if the frame was never mounted
    pub mounted_after_ms: Option<u64>,
    #[serde(flatten)]
    pub outcome: FrameOutcome,
}

impl FrameReport {
    pub fn state(&self) -> Option<FrameState> {
        match &self.outcome {
            FrameOutcome::Settled { state, .. } => Some(*state),
            FrameOutcome::Superseded => None,
        }
    }
}

/// Loads sessions through an [`Embedder`]
pub struct Loader<E> {
    embedder: E,
    clock: SessionClock,
    timings: LoaderTimings,
    sandbox: SandboxFlags,
    updates: Option<mpsc::UnboundedSender<FrameUpdate>>,
}

impl<E: Embedder> Loader<E> {
    pub fn new(embedder: E, clock: SessionClock) -> Self {
        Self {
            embedder,
            clock,
            timings: LoaderTimings::default(),
            sandbox: SandboxFlags::preview(),
            updates: None,
        }
    }

    pub fn with_timings(mut self, timings: LoaderTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxFlags) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Publish every frame state change on `tx`
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<FrameUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Mount and settle every frame of `session`
    ///
    /// Frames are mounted in order, `stagger × index` after the call; they
    /// settle in whatever order their pages answer. Reports come back in
    /// mount order.
    pub async fn load_session(&self, session: &PreviewSession) -> Vec<FrameReport> {
        log::info!(
            "session {}: loading {} on {} device(s)",
            session.id,
            session.url,
            session.frames.len()
        );
        let start = Instant::now();
        let reports = join_all(
            session
                .frames
                .iter()
                .enumerate()
                .map(|(index, plan)| self.load_slot(session, index, plan, start)),
        )
        .await;

        let blocked = reports
            .iter()
            .filter(|r| r.state() == Some(FrameState::Blocked))
            .count();
        log::info!(
            "session {}: finished, {} of {} frame(s) blocked",
            session.id,
            blocked,
            reports.len()
        );
        reports
    }

    async fn load_slot(
        &self,
        session: &PreviewSession,
        index: usize,
        plan: &FramePlan,
        start: Instant,
    ) -> FrameReport {
        let superseded = FrameReport {
            session: session.id,
            device: plan.device.id,
            index,
            mounted_after_ms: None,
            outcome: FrameOutcome::Superseded,
        };

        let offset = self.timings.stagger * index as u32;
        tokio::select! {
            biased;
            _ = self.clock.superseded(session.id) => return superseded,
            _ = time::sleep_until(start + offset) => {}
        }
        // The grid this slot belongs to may have been replaced meanwhile
        if !self.clock.is_current(session.id) {
            log::debug!("session {}: skipping stale mount of {}", session.id, plan.device.id);
            return superseded;
        }

        let request = MountRequest {
            session: session.id,
            index,
            device: plan.device,
            url: session.url.clone(),
            viewport: plan.viewport,
            sandbox: self.sandbox.clone(),
        };
        let mounted_after = start.elapsed();
        let mut report = self.load_frame(&request).await;
        report.mounted_after_ms = Some(mounted_after.as_millis() as u64);
        report
    }

    /// Mount a single frame and wait for it to settle
    pub async fn load_frame(&self, request: &MountRequest) -> FrameReport {
        let device = request.device.id;
        let mut frame = Frame::new();
        self.publish(request.session, device, FrameState::Loading);
        log::debug!(
            "session {}: mounting {} at {}x{} (scale {:.3})",
            request.session,
            device,
            request.viewport.frame_width,
            request.viewport.frame_height,
            request.viewport.scale
        );

        let event = match self.embedder.mount(request) {
            Ok(MountedFrame { signal, document }) => {
                // A dropped sender never resolves: only the timer can settle it
                let signal = async {
                    match signal.await {
                        Ok(signal) => signal,
                        Err(_) => future::pending().await,
                    }
                };
                tokio::select! {
                    biased;
                    _ = self.clock.superseded(request.session) => {
                        log::debug!(
                            "session {}: dropping {} (superseded)",
                            request.session,
                            device
                        );
                        return FrameReport {
                            session: request.session,
                            device,
                            index: request.index,
                            mounted_after_ms: None,
                            outcome: FrameOutcome::Superseded,
                        };
                    }
                    signal = signal => match signal {
                        LoadSignal::Loaded => FrameEvent::LoadSucceeded,
                        LoadSignal::Failed(reason) => FrameEvent::LoadFailed(reason),
                    },
                    _ = time::sleep(self.timings.inspect_delay) => {
                        FrameEvent::InspectionDue(document.inspect())
                    }
                }
            }
            Err(err) => FrameEvent::LoadFailed(err.to_string()),
        };

        if let Some(state) = frame.apply(event) {
            self.publish(request.session, device, state);
        }
        let resolution = frame
            .resolution()
            .cloned()
            .unwrap_or(Resolution::AssumedLoaded);
        match frame.state() {
            FrameState::Blocked => {
                log::warn!("session {}: {} blocked ({:?})", request.session, device, resolution)
            }
            state => log::debug!(
                "session {}: {} {} ({:?})",
                request.session,
                device,
                state,
                resolution
            ),
        }

        FrameReport {
            session: request.session,
            device,
            index: request.index,
            mounted_after_ms: None,
            outcome: FrameOutcome::Settled {
                state: frame.state(),
                resolution,
            },
        }
    }

    fn publish(&self, session: SessionId, device: &'static str, state: FrameState) {
        if let Some(tx) = &self.updates {
            let _ = tx.send(FrameUpdate {
                session,
                device,
                state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{Script, ScriptedEmbedder};
    use crate::frame::Inspection;
    use crate::session::{ActiveDevices, Settings};
    use url::Url;

    fn session(clock: &SessionClock, devices: &[&str]) -> PreviewSession {
        Settings::new(1312.0)
            .with_url(Url::parse("https://example.com/").unwrap())
            .with_active(ActiveDevices::from_ids(devices).unwrap())
            .render(clock.begin())
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn load_signal_cancels_the_inspection() {
        let clock = SessionClock::new();
        let embedder = ScriptedEmbedder::new();
        embedder.script(
            "iphone-se",
            Script::loads_after(Duration::from_millis(800)).with_inspection(Inspection::Empty),
        );
        let loader = Loader::new(embedder.clone(), clock.clone());
        let session = session(&clock, &["iphone-se"]);

        let reports = loader.load_session(&session).await;
        assert_eq!(reports[0].state(), Some(FrameState::Loaded));
        assert_eq!(
            reports[0].outcome,
            FrameOutcome::Settled {
                state: FrameState::Loaded,
                resolution: Resolution::Signalled
            }
        );

        time::sleep(DEFAULT_INSPECT_DELAY * 2).await;
        assert_eq!(embedder.inspections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_empty_frame_is_blocked_after_the_delay() {
        let clock = SessionClock::new();
        let embedder = ScriptedEmbedder::new();
        embedder.script("pixel-7", Script::silent(Inspection::Empty));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let loader = Loader::new(embedder.clone(), clock.clone()).with_updates(tx);
        let session = session(&clock, &["pixel-7"]);

        let started = Instant::now();
        let reports = loader.load_session(&session).await;
        assert_eq!(started.elapsed(), DEFAULT_INSPECT_DELAY);
        assert_eq!(
            reports[0].outcome,
            FrameOutcome::Settled {
                state: FrameState::Blocked,
                resolution: Resolution::InspectedEmpty
            }
        );
        assert_eq!(embedder.inspections(), 1);

        let states: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|u| u.state)
            .collect();
        assert_eq!(states, vec![FrameState::Loading, FrameState::Blocked]);
    }

    #[tokio::test(start_paused = true)]
    async fn inaccessible_document_is_assumed_loaded() {
        let clock = SessionClock::new();
        let embedder = ScriptedEmbedder::new();
        let loader = Loader::new(embedder, clock.clone());
        let session = session(&clock, &["ipad-mini"]);

        let reports = loader.load_session(&session).await;
        assert_eq!(
            reports[0].outcome,
            FrameOutcome::Settled {
                state: FrameState::Loaded,
                resolution: Resolution::AssumedLoaded
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn error_signal_skips_the_wait() {
        let clock = SessionClock::new();
        let embedder = ScriptedEmbedder::new();
        embedder.script(
            "desktop-hd",
            Script::fails_after(Duration::from_millis(300), "net::ERR_BLOCKED"),
        );
        let loader = Loader::new(embedder, clock.clone());
        let session = session(&clock, &["desktop-hd"]);

        let started = Instant::now();
        let reports = loader.load_session(&session).await;
        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert_eq!(reports[0].state(), Some(FrameState::Blocked));
    }

    #[tokio::test(start_paused = true)]
    async fn mounts_are_staggered_in_order() {
        let clock = SessionClock::new();
        let embedder =
            ScriptedEmbedder::new().with_fallback(Script::loads_after(Duration::from_millis(50)));
        let loader = Loader::new(embedder.clone(), clock.clone());
        let session = session(&clock, &["iphone-se", "ipad-mini", "desktop-hd"]);

        let reports = loader.load_session(&session).await;
        let mounts = embedder.mounts();
        let order: Vec<_> = mounts.iter().map(|m| m.device).collect();
        assert_eq!(order, vec!["iphone-se", "ipad-mini", "desktop-hd"]);
        assert_eq!(mounts[1].at - mounts[0].at, DEFAULT_STAGGER);
        assert_eq!(mounts[2].at - mounts[0].at, DEFAULT_STAGGER * 2);
        let offsets: Vec<_> = reports.iter().map(|r| r.mounted_after_ms).collect();
        assert_eq!(offsets, vec![Some(0), Some(100), Some(200)]);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_mount_at_native_size() {
        let clock = SessionClock::new();
        let embedder = ScriptedEmbedder::new().with_fallback(Script::loads_after(Duration::ZERO));
        let loader = Loader::new(embedder.clone(), clock.clone());
        let session = session(&clock, &["monitor-4k"]);

        loader.load_session(&session).await;
        let mount = &embedder.mounts()[0];
        assert_eq!((mount.frame_width, mount.frame_height), (3840, 2160));
        assert_eq!(mount.scale, 1280.0 / 3840.0);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_session_never_mounts_stragglers() {
        let clock = SessionClock::new();
        let embedder = ScriptedEmbedder::new();
        let loader = Loader::new(embedder.clone(), clock.clone());
        let first = session(&clock, &["iphone-se", "ipad-mini", "desktop-hd"]);

        let (reports, _) = tokio::join!(loader.load_session(&first), async {
            time::sleep(Duration::from_millis(150)).await;
            clock.begin();
        });

        let mounted: Vec<_> = embedder.mounts().iter().map(|m| m.device).collect();
        assert_eq!(mounted, vec!["iphone-se", "ipad-mini"]);
        assert!(reports.iter().all(|r| r.outcome == FrameOutcome::Superseded));
        assert_eq!(reports[2].mounted_after_ms, None);
        assert_eq!(embedder.inspections(), 0);
    }
}
