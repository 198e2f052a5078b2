//! Event-driven preview controller
//!
//! [`Previewer`] turns user actions into new [`Settings`] values and decides
//! when a render is due. [`Previewer::run`] wires it to a loader: it consumes
//! events from a channel, starts a session per render, debounces resizes and
//! hands a [`Snapshot`] to the caller whenever something visible changed.

use crate::embed::Embedder;
use crate::frame::FrameState;
use crate::loader::{FrameReport, Loader, LoaderTimings};
use crate::markup::{self, FrameStates};
use crate::sandbox::SandboxFlags;
use crate::scale::ZoomMode;
use crate::session::{PreviewSession, SessionClock, Settings};
use crate::target;
use futures::future::OptionFuture;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

/// Default quiet period after the last resize
pub const DEFAULT_RESIZE_DEBOUNCE: Duration = Duration::from_millis(200);

/// A user action
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// The URL form was submitted with this text
    Submit(String),
    /// A device toggle was clicked
    Toggle(String),
    Zoom(ZoomMode),
    /// The grid was resized to this width
    Resize(f64),
    /// The URL field was edited; clears the inline error
    Input,
}

/// Everything needed to draw the page
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub settings: Settings,
    pub session: Option<PreviewSession>,
    pub states: FrameStates,
    pub error: Option<String>,
}

impl Snapshot {
    pub fn to_html(&self, sandbox: &SandboxFlags) -> String {
        markup::render_document(
            &self.settings,
            self.session.as_ref(),
            sandbox,
            &self.states,
            self.error.as_deref(),
        )
    }

    /// Number of frames in `state`
    pub fn count(&self, state: FrameState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }
}

/// Owns the current settings, the last render and the inline error
pub struct Previewer {
    settings: Settings,
    clock: SessionClock,
    session: Option<PreviewSession>,
    error: Option<String>,
    timings: LoaderTimings,
    resize_debounce: Duration,
    sandbox: SandboxFlags,
}

impl Previewer {
    pub fn new(settings: Settings, clock: SessionClock) -> Self {
        Self {
            settings,
            clock,
            session: None,
            error: None,
            timings: LoaderTimings::default(),
            resize_debounce: DEFAULT_RESIZE_DEBOUNCE,
            sandbox: SandboxFlags::preview(),
        }
    }

    pub fn with_timings(mut self, timings: LoaderTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_resize_debounce(mut self, debounce: Duration) -> Self {
        self.resize_debounce = debounce;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxFlags) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// The most recent render, kept across rejected input
    pub fn session(&self) -> Option<&PreviewSession> {
        self.session.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn sandbox(&self) -> &SandboxFlags {
        &self.sandbox
    }

    /// Validate the URL field and render it
    pub fn submit(&mut self, input: &str) -> Option<PreviewSession> {
        match target::normalize_url(input) {
            Ok(url) => {
                self.error = None;
                self.settings = self.settings.with_url(url);
                self.rerender()
            }
            Err(err) => {
                log::debug!("rejected input {:?}: {}", input, err);
                self.error = Some(err.inline_message());
                None
            }
        }
    }

    /// Flip a device; deactivating the last one does nothing
    pub fn toggle(&mut self, id: &str) -> Option<PreviewSession> {
        let (active, outcome) = match self.settings.active.toggled(id) {
            Ok(toggled) => toggled,
            Err(err) => {
                log::warn!("toggle ignored: {}", err);
                return None;
            }
        };
        if !outcome.changed() {
            log::debug!("keeping {}: it is the only active device", id);
            return None;
        }
        self.settings = self.settings.with_active(active);
        self.rerender()
    }

    pub fn set_zoom(&mut self, zoom: ZoomMode) -> Option<PreviewSession> {
        if zoom == self.settings.zoom {
            return None;
        }
        self.settings = self.settings.with_zoom(zoom);
        self.rerender()
    }

    /// Apply a new grid width immediately
    pub fn resize(&mut self, grid_width: f64) -> Option<PreviewSession> {
        self.settings = self.settings.with_grid_width(grid_width);
        self.rerender()
    }

    pub fn input(&mut self) {
        self.error = None;
    }

    /// Apply one event without debouncing
    pub fn handle(&mut self, event: UiEvent) -> Option<PreviewSession> {
        match event {
            UiEvent::Submit(text) => self.submit(&text),
            UiEvent::Toggle(id) => self.toggle(&id),
            UiEvent::Zoom(zoom) => self.set_zoom(zoom),
            UiEvent::Resize(width) => self.resize(width),
            UiEvent::Input => {
                self.input();
                None
            }
        }
    }

    fn rerender(&mut self) -> Option<PreviewSession> {
        self.settings.url.as_ref()?;
        let session = self.settings.render(self.clock.begin())?;
        self.session = Some(session.clone());
        Some(session)
    }

    pub fn snapshot(&self, states: &FrameStates) -> Snapshot {
        Snapshot {
            settings: self.settings.clone(),
            session: self.session.clone(),
            states: states.clone(),
            error: self.error.clone(),
        }
    }

    /// Drive the previewer from `events` until the channel closes
    ///
    /// `sink` sees a snapshot after every visible change. Returns the reports
    /// of the last session that finished loading.
    pub async fn run<E, F>(
        &mut self,
        mut events: mpsc::UnboundedReceiver<UiEvent>,
        embedder: E,
        mut sink: F,
    ) -> Vec<FrameReport>
    where
        E: Embedder,
        F: FnMut(&Snapshot),
    {
        let (updates_tx, mut updates) = mpsc::unbounded_channel();
        let loader = Loader::new(embedder, self.clock.clone())
            .with_timings(self.timings)
            .with_sandbox(self.sandbox.clone())
            .with_updates(updates_tx);

        let mut states = FrameStates::new();
        let mut load: Option<Pin<Box<dyn Future<Output = Vec<FrameReport>> + '_>>> = None;
        let mut resize_deadline: Option<Instant> = None;
        let mut pending_width = self.settings.grid_width;
        let mut last_reports = Vec::new();
        let mut open = true;

        loop {
            if !open && load.is_none() && resize_deadline.is_none() {
                break;
            }
            let mut started = None;
            tokio::select! {
                biased;
                event = events.recv(), if open => match event {
                    None => open = false,
                    Some(UiEvent::Resize(width)) => {
                        pending_width = width;
                        resize_deadline = Some(Instant::now() + self.resize_debounce);
                    }
                    Some(event) => {
                        started = self.handle(event);
                        // A new session is drawn below, after its states are cleared
                        if started.is_none() {
                            sink(&self.snapshot(&states));
                        }
                    }
                },
                Some(update) = updates.recv() => {
                    if self.clock.is_current(update.session) {
                        states.insert(update.device, update.state);
                        sink(&self.snapshot(&states));
                    }
                }
                _ = time::sleep_until(resize_deadline.unwrap_or_else(Instant::now)),
                    if resize_deadline.is_some() =>
                {
                    resize_deadline = None;
                    log::debug!("grid resized to {}px", pending_width);
                    started = self.resize(pending_width);
                    if started.is_none() {
                        sink(&self.snapshot(&states));
                    }
                }
                Some(reports) = OptionFuture::from(load.as_mut()), if load.is_some() => {
                    load = None;
                    last_reports = reports;
                    // The last frame's update was published during this poll
                    let mut changed = false;
                    while let Ok(update) = updates.try_recv() {
                        if self.clock.is_current(update.session) {
                            states.insert(update.device, update.state);
                            changed = true;
                        }
                    }
                    if changed {
                        sink(&self.snapshot(&states));
                    }
                }
            }

            if let Some(session) = started {
                // Replacing the future drops every pending mount and timer
                states.clear();
                sink(&self.snapshot(&states));
                let loader = &loader;
                load = Some(Box::pin(async move { loader.load_session(&session).await }));
            }
        }

        last_reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{Script, ScriptedEmbedder};
    use crate::frame::Inspection;
    use crate::session::{ActiveDevices, SessionId};
    use crate::DEFAULT_GRID_WIDTH;

    fn previewer(devices: &[&str]) -> Previewer {
        let active = ActiveDevices::from_ids(devices).unwrap();
        let settings = Settings::new(DEFAULT_GRID_WIDTH).with_active(active);
        Previewer::new(settings, SessionClock::new())
    }

    #[test]
    fn invalid_input_is_reported_inline() {
        let mut p = previewer(&["iphone-se"]);
        let first = p.submit("example.com").unwrap();
        assert_eq!(first.id, SessionId(1));

        assert!(p.submit("   ").is_none());
        assert_eq!(p.error(), Some("Please enter a URL"));
        assert!(p.submit("not a url!!").is_none());
        assert_eq!(p.error(), Some("Please enter a valid URL"));
        assert!(p.submit("javascript:alert(1)").is_none());
        assert_eq!(p.error(), Some("Please enter a valid URL"));

        // The previous render is untouched
        assert_eq!(p.session(), Some(&first));
        assert!(p.clock().is_current(first.id));

        p.input();
        assert!(p.error().is_none());
    }

    #[test]
    fn controls_rerender_only_with_a_url() {
        let mut p = previewer(&["iphone-se", "pixel-7"]);
        assert!(p.toggle("desktop-hd").is_none());
        assert!(p.set_zoom(ZoomMode::Fixed(0.5)).is_none());
        assert!(p.settings().active.contains("desktop-hd"));

        p.submit("https://example.com").unwrap();
        let session = p.toggle("pixel-7").unwrap();
        assert_eq!(session.frames.len(), 2);
        assert_eq!(session.zoom, ZoomMode::Fixed(0.5));
    }

    #[test]
    fn last_device_toggle_is_silent() {
        let mut p = previewer(&["iphone-se"]);
        p.submit("example.com").unwrap();
        let before = p.clock().current();
        assert!(p.toggle("iphone-se").is_none());
        assert!(p.error().is_none());
        assert_eq!(p.clock().current(), before);
        assert!(p.toggle("nokia-3310").is_none());
    }

    #[test]
    fn resize_changes_auto_scale() {
        let mut p = previewer(&["desktop-hd"]);
        p.submit("example.com").unwrap();
        let session = p.resize(992.0).unwrap();
        assert_eq!(session.frames[0].viewport.scale, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn resizes_are_debounced() {
        let embedder =
            ScriptedEmbedder::new().with_fallback(Script::loads_after(Duration::from_millis(10)));
        let mut p = previewer(&["desktop-hd"]);
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = async {
            tx.send(UiEvent::Submit("example.com".into())).unwrap();
            time::sleep(Duration::from_millis(500)).await;
            for width in [1200.0, 1100.0, 992.0] {
                tx.send(UiEvent::Resize(width)).unwrap();
                time::sleep(Duration::from_millis(50)).await;
            }
            time::sleep(Duration::from_millis(500)).await;
            drop(tx);
        };

        let mut snapshots = Vec::new();
        let (reports, ()) = tokio::join!(
            p.run(rx, embedder.clone(), |s| snapshots.push(s.clone())),
            driver
        );

        let mounts = embedder.mounts();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[1].scale, 0.5);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].state(), Some(FrameState::Loaded));
        assert_eq!(p.clock().current(), SessionId(2));
        assert!(snapshots.last().map_or(false, |s| s.count(FrameState::Loaded) == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_starts_without_previous_states() {
        let embedder = ScriptedEmbedder::new().with_fallback(Script::silent(Inspection::Empty));
        let mut p = previewer(&["iphone-se"]);
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = async {
            tx.send(UiEvent::Submit("first.example".into())).unwrap();
            time::sleep(Duration::from_secs(6)).await;
            tx.send(UiEvent::Submit("second.example".into())).unwrap();
            time::sleep(Duration::from_secs(6)).await;
            tx.send(UiEvent::Zoom(ZoomMode::Fixed(0.5))).unwrap();
            drop(tx);
        };

        let mut snapshots = Vec::new();
        tokio::join!(
            p.run(rx, embedder, |s| snapshots.push(s.clone())),
            driver
        );

        for id in [SessionId(1), SessionId(2), SessionId(3)] {
            let first = snapshots
                .iter()
                .find(|s| s.session.as_ref().map(|s| s.id) == Some(id))
                .unwrap();
            assert_eq!(first.count(FrameState::Blocked), 0, "session {}", id);
            assert_eq!(first.count(FrameState::Loaded), 0, "session {}", id);
            assert!(!first.to_html(p.sandbox()).contains("This website blocked the preview"));
        }
        // The first session did settle before being replaced
        assert!(snapshots.iter().any(|s| {
            s.session.as_ref().map(|s| s.id) == Some(SessionId(1))
                && s.count(FrameState::Blocked) == 1
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn new_submit_supersedes_a_loading_session() {
        let embedder = ScriptedEmbedder::new().with_fallback(Script::silent(Inspection::Empty));
        let mut p = previewer(&["iphone-se", "pixel-7", "desktop-hd"]);
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = async {
            tx.send(UiEvent::Submit("first.example".into())).unwrap();
            time::sleep(Duration::from_millis(150)).await;
            tx.send(UiEvent::Submit("second.example".into())).unwrap();
            drop(tx);
        };

        let mut last = None;
        let (reports, ()) = tokio::join!(
            p.run(rx, embedder.clone(), |s| last = Some(s.clone())),
            driver
        );

        // Two mounts from the first session, three from the second
        let mounts = embedder.mounts();
        assert_eq!(mounts.iter().filter(|m| m.session == SessionId(1)).count(), 2);
        assert_eq!(mounts.iter().filter(|m| m.session == SessionId(2)).count(), 3);

        assert!(reports.iter().all(|r| r.session == SessionId(2)));
        assert!(reports.iter().all(|r| r.state() == Some(FrameState::Blocked)));

        let last = last.unwrap();
        assert_eq!(last.session.as_ref().unwrap().url.as_str(), "https://second.example/");
        assert_eq!(last.count(FrameState::Blocked), 3);
        assert!(last.to_html(p.sandbox()).contains("This website blocked the preview"));
    }
}
