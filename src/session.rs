//! Preview settings and sessions
//!
//! [`Settings`] is an immutable value: every user action produces a new one.
//! Rendering turns the current settings into a [`PreviewSession`] stamped with
//! an id from the [`SessionClock`]; work scheduled for a session checks that id
//! before touching anything, so a superseded session can never mount frames
//! into its successor's grid.

use crate::devices::{self, DeviceSpec, ALL_DEVICES_ID};
use crate::scale::{self, ScaledViewport, ZoomMode};
use crate::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

/// Outcome of a device toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Activated,
    Deactivated,
    /// The device was the only active one; nothing changed
    RefusedLast,
    /// The "All Devices" preset replaced the selection
    Preset,
}

impl Toggle {
    pub fn changed(self) -> bool {
        !matches!(self, Toggle::RefusedLast)
    }
}

/// Non-empty set of active devices, kept in table order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDevices {
    ids: Vec<&'static str>,
}

impl ActiveDevices {
    /// Every renderable device
    pub fn all() -> Self {
        Self {
            ids: devices::renderable().map(|d| d.id).collect(),
        }
    }

    /// The "All Devices" preset
    pub fn preset() -> Self {
        Self {
            ids: devices::all_devices_preset(),
        }
    }

    /// Build from a list of identifiers; fails on unknown ids or an empty list
    pub fn from_ids<I, S>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Vec::new();
        for id in ids {
            let id = id.as_ref().trim();
            if id == ALL_DEVICES_ID {
                return Ok(Self::preset());
            }
            let device = renderable_device(id)?;
            if !set.contains(&device.id) {
                set.push(device.id);
            }
        }
        if set.is_empty() {
            return Err(Error::ConfigError("at least one device is required".into()));
        }
        set.sort_by_key(|id| devices::position(id));
        Ok(Self { ids: set })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|a| *a == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[&'static str] {
        &self.ids
    }

    /// Flip one device, refusing to deactivate the last one
    pub fn toggled(&self, id: &str) -> Result<(Self, Toggle)> {
        if id == ALL_DEVICES_ID {
            return Ok((Self::preset(), Toggle::Preset));
        }
        let device = renderable_device(id)?;

        let mut next = self.clone();
        if let Some(pos) = next.ids.iter().position(|a| *a == device.id) {
            if next.ids.len() == 1 {
                return Ok((next, Toggle::RefusedLast));
            }
            next.ids.remove(pos);
            Ok((next, Toggle::Deactivated))
        } else {
            next.ids.push(device.id);
            next.ids.sort_by_key(|id| devices::position(id));
            Ok((next, Toggle::Activated))
        }
    }

    /// Active device descriptors in render order
    pub fn ordered(&self) -> Vec<&'static DeviceSpec> {
        self.ids.iter().filter_map(|id| devices::find(id)).collect()
    }
}

impl Default for ActiveDevices {
    fn default() -> Self {
        Self::all()
    }
}

fn renderable_device(id: &str) -> Result<&'static DeviceSpec> {
    devices::find(id)
        .filter(|d| d.dimensions.is_some())
        .ok_or_else(|| Error::UnknownDevice(id.to_string()))
}

/// Everything a render reads
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub url: Option<Url>,
    pub zoom: ZoomMode,
    pub active: ActiveDevices,
    /// Width of the preview grid, before padding
    pub grid_width: f64,
}

impl Settings {
    pub fn new(grid_width: f64) -> Self {
        Self {
            url: None,
            zoom: ZoomMode::Auto,
            active: ActiveDevices::all(),
            grid_width,
        }
    }

    pub fn with_url(&self, url: Url) -> Self {
        Self {
            url: Some(url),
            ..self.clone()
        }
    }

    pub fn with_zoom(&self, zoom: ZoomMode) -> Self {
        Self {
            zoom,
            ..self.clone()
        }
    }

    pub fn with_active(&self, active: ActiveDevices) -> Self {
        Self {
            active,
            ..self.clone()
        }
    }

    pub fn with_grid_width(&self, grid_width: f64) -> Self {
        Self {
            grid_width,
            ..self.clone()
        }
    }

    /// Width available to each frame
    pub fn available_width(&self) -> f64 {
        scale::available_width(self.grid_width)
    }

    /// Produce the session for this render, or `None` while no URL is set
    pub fn render(&self, id: SessionId) -> Option<PreviewSession> {
        let url = self.url.clone()?;
        let available = self.available_width();
        let frames = self
            .active
            .ordered()
            .into_iter()
            .filter_map(|device| {
                let dimensions = device.dimensions?;
                Some(FramePlan {
                    device,
                    viewport: scale::fit(dimensions, available, self.zoom),
                })
            })
            .collect();
        Some(PreviewSession {
            id,
            url,
            zoom: self.zoom,
            available_width: available,
            frames,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(crate::DEFAULT_GRID_WIDTH)
    }
}

/// Identifier of one render cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One device's slot in a session
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub device: &'static DeviceSpec,
    pub viewport: ScaledViewport,
}

/// A single render cycle: discarded wholesale by the next one
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewSession {
    pub id: SessionId,
    pub url: Url,
    pub zoom: ZoomMode,
    pub available_width: f64,
    /// Frames in mount order
    pub frames: Vec<FramePlan>,
}

/// Hands out session ids and tracks which one is current
#[derive(Debug, Clone)]
pub struct SessionClock {
    tx: Arc<watch::Sender<SessionId>>,
}

impl SessionClock {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionId(0));
        Self { tx: Arc::new(tx) }
    }

    /// Start a new session, superseding the current one
    pub fn begin(&self) -> SessionId {
        let mut next = SessionId(0);
        self.tx.send_modify(|current| {
            current.0 += 1;
            next = *current;
        });
        log::debug!("session {} started", next);
        next
    }

    pub fn current(&self) -> SessionId {
        *self.tx.borrow()
    }

    pub fn is_current(&self, id: SessionId) -> bool {
        self.current() == id
    }

    /// Resolves once a session newer than `id` has begun
    pub async fn superseded(&self, id: SessionId) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `changed` cannot fail while we wait
        while *rx.borrow_and_update() == id {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_the_last_device_is_a_no_op() {
        let active = ActiveDevices::from_ids(["iphone-se"]).unwrap();
        let (next, outcome) = active.toggled("iphone-se").unwrap();
        assert_eq!(outcome, Toggle::RefusedLast);
        assert!(!outcome.changed());
        assert_eq!(next.len(), active.len());
        assert!(next.contains("iphone-se"));
    }

    #[test]
    fn toggles_keep_table_order() {
        let active = ActiveDevices::from_ids(["desktop-hd", "iphone-se"]).unwrap();
        assert_eq!(active.ids(), &["iphone-se", "desktop-hd"]);

        let (active, outcome) = active.toggled("ipad-mini").unwrap();
        assert_eq!(outcome, Toggle::Activated);
        assert_eq!(active.ids(), &["iphone-se", "ipad-mini", "desktop-hd"]);

        let (active, outcome) = active.toggled("iphone-se").unwrap();
        assert_eq!(outcome, Toggle::Deactivated);
        assert_eq!(active.ids(), &["ipad-mini", "desktop-hd"]);
    }

    #[test]
    fn no_toggle_sequence_empties_the_set() {
        let mut active = ActiveDevices::all();
        for device in devices::renderable() {
            let (next, _) = active.toggled(device.id).unwrap();
            active = next;
            assert!(!active.is_empty());
        }
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn all_entry_selects_the_preset() {
        let active = ActiveDevices::from_ids(["pixel-7"]).unwrap();
        let (active, outcome) = active.toggled(ALL_DEVICES_ID).unwrap();
        assert_eq!(outcome, Toggle::Preset);
        assert_eq!(active, ActiveDevices::preset());
    }

    #[test]
    fn unknown_devices_are_rejected() {
        assert!(matches!(
            ActiveDevices::all().toggled("nokia-3310"),
            Err(Error::UnknownDevice(_))
        ));
        assert!(ActiveDevices::from_ids(Vec::<String>::new()).is_err());
    }

    #[test]
    fn render_requires_a_url() {
        let settings = Settings::new(1312.0);
        assert!(settings.render(SessionId(1)).is_none());

        let url = Url::parse("https://example.com/").unwrap();
        let settings = settings
            .with_url(url)
            .with_active(ActiveDevices::from_ids(["iphone-se", "desktop-hd"]).unwrap());
        let session = settings.render(SessionId(7)).unwrap();
        assert_eq!(session.id, SessionId(7));
        assert_eq!(session.available_width, 1280.0);
        assert_eq!(session.frames.len(), 2);
        assert_eq!(session.frames[0].viewport.scale, 1.0);
        assert_eq!(session.frames[1].viewport.scale, 1280.0 / 1920.0);
        assert_eq!(session.frames[1].viewport.container_width, 1280);
    }

    #[test]
    fn settings_are_values() {
        let base = Settings::new(800.0);
        let zoomed = base.with_zoom(ZoomMode::Fixed(0.5));
        assert_eq!(base.zoom, ZoomMode::Auto);
        assert_eq!(zoomed.zoom, ZoomMode::Fixed(0.5));
    }

    #[tokio::test]
    async fn clock_supersedes_sessions() {
        let clock = SessionClock::new();
        let first = clock.begin();
        assert!(clock.is_current(first));

        let waiter = {
            let clock = clock.clone();
            tokio::spawn(async move { clock.superseded(first).await })
        };
        let second = clock.begin();
        assert!(second > first);
        assert!(!clock.is_current(first));
        waiter.await.unwrap();

        // Already superseded: resolves immediately
        clock.superseded(first).await;
    }
}
