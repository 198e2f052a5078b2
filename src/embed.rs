//! Embedded browsing contexts
//!
//! An [`Embedder`] mounts one frame per device and hands back the two things
//! the loader races: a one-shot native signal (load or error) and a handle for
//! inspecting the embedded document once the timeout fires.

use crate::devices::DeviceSpec;
use crate::frame::Inspection;
use crate::sandbox::SandboxFlags;
use crate::scale::ScaledViewport;
use crate::session::SessionId;
use crate::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;

/// Native signal delivered at most once per mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSignal {
    Loaded,
    Failed(String),
}

/// Everything needed to mount one frame
#[derive(Debug, Clone)]
pub struct MountRequest {
    pub session: SessionId,
    /// Position in the session's mount order
    pub index: usize,
    pub device: &'static DeviceSpec,
    pub url: Url,
    /// Scaled container plus the unscaled frame box
    pub viewport: ScaledViewport,
    pub sandbox: SandboxFlags,
}

/// Read access to a mounted frame's document
pub trait DocumentAccess: Send + Sync {
    fn inspect(&self) -> Inspection;
}

/// A frame that has been attached and is navigating
pub struct MountedFrame {
    /// Dropping the sender without sending means no signal will ever arrive
    pub signal: oneshot::Receiver<LoadSignal>,
    pub document: Box<dyn DocumentAccess>,
}

/// Backend that creates embedded browsing contexts
pub trait Embedder: Send + Sync {
    /// Attach a frame and start navigating it to `request.url`
    fn mount(&self, request: &MountRequest) -> Result<MountedFrame>;
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn mount(&self, request: &MountRequest) -> Result<MountedFrame> {
        (**self).mount(request)
    }
}

/// Scripted behaviour for one device in a [`ScriptedEmbedder`]
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    /// Signal to deliver and how long after mount; `None` never signals
    pub signal: Option<(Duration, LoadSignal)>,
    /// What inspecting the document reports
    pub inspection: Inspection,
}

impl Script {
    pub fn loads_after(delay: Duration) -> Self {
        Self {
            signal: Some((delay, LoadSignal::Loaded)),
            inspection: Inspection::AccessDenied,
        }
    }

    pub fn fails_after(delay: Duration, reason: &str) -> Self {
        Self {
            signal: Some((delay, LoadSignal::Failed(reason.to_string()))),
            inspection: Inspection::AccessDenied,
        }
    }

    pub fn silent(inspection: Inspection) -> Self {
        Self {
            signal: None,
            inspection,
        }
    }

    pub fn with_inspection(mut self, inspection: Inspection) -> Self {
        self.inspection = inspection;
        self
    }
}

/// A mount observed by a [`ScriptedEmbedder`]
#[derive(Debug, Clone, PartialEq)]
pub struct MountRecord {
    pub session: SessionId,
    pub device: &'static str,
    pub at: tokio::time::Instant,
    pub frame_width: u32,
    pub frame_height: u32,
    pub scale: f64,
}

/// Deterministic embedder driven by per-device scripts
///
/// Used by tests and demos; pairs well with tokio's paused clock.
#[derive(Clone, Default)]
pub struct ScriptedEmbedder {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    fallback: Option<Script>,
    mounts: Arc<Mutex<Vec<MountRecord>>>,
    inspections: Arc<AtomicUsize>,
}

impl ScriptedEmbedder {
    /// Devices without a script never signal and report `AccessDenied`
    pub fn new() -> Self {
        Self::default()
    }

    /// Script applied to devices without their own entry
    pub fn with_fallback(mut self, script: Script) -> Self {
        self.fallback = Some(script);
        self
    }

    pub fn script(&self, device: &str, script: Script) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(device.to_string(), script);
        }
    }

    /// Mounts observed so far, in mount order
    pub fn mounts(&self) -> Vec<MountRecord> {
        self.mounts.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// How many times any mounted document was inspected
    pub fn inspections(&self) -> usize {
        self.inspections.load(Ordering::SeqCst)
    }

    fn script_for(&self, device: &str) -> Script {
        self.scripts
            .lock()
            .ok()
            .and_then(|s| s.get(device).cloned())
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Script::silent(Inspection::AccessDenied))
    }
}

struct ScriptedDocument {
    inspection: Inspection,
    counter: Arc<AtomicUsize>,
}

impl DocumentAccess for ScriptedDocument {
    fn inspect(&self) -> Inspection {
        self.counter.fetch_add(1, Ordering::SeqCst);
        self.inspection
    }
}

impl Embedder for ScriptedEmbedder {
    fn mount(&self, request: &MountRequest) -> Result<MountedFrame> {
        if let Ok(mut mounts) = self.mounts.lock() {
            mounts.push(MountRecord {
                session: request.session,
                device: request.device.id,
                at: tokio::time::Instant::now(),
                frame_width: request.viewport.frame_width,
                frame_height: request.viewport.frame_height,
                scale: request.viewport.scale,
            });
        }

        let script = self.script_for(request.device.id);
        let (tx, rx) = oneshot::channel();
        match script.signal {
            Some((delay, signal)) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(signal);
                });
            }
            None => drop(tx),
        }

        Ok(MountedFrame {
            signal: rx,
            document: Box::new(ScriptedDocument {
                inspection: script.inspection,
                counter: self.inspections.clone(),
            }),
        })
    }
}
