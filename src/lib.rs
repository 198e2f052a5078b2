//! RFox Responsive Preview
//!
//! Loads one web page into many device-sized viewports at once and reports,
//! per device, whether the page rendered or refused to be embedded.
//!
//! # Features
//!
//! - **Device table**: phones, tablets, laptops and desktops with nominal sizes
//! - **Viewport scaler**: auto-fit or fixed zoom, native layout preserved
//! - **Failure detector**: native load/error signals raced against an
//!   inspection timer, for targets that refuse framing without telling anyone
//! - **Fetch backend** (default): `FetchEmbedder` emulates embedded frames
//!   over HTTP, honouring `X-Frame-Options` and CSP `frame-ancestors`
//!
//! # Example
//!
//! ```no_run
//! use rfpreview::{target, ActiveDevices, Loader, PreviewConfig, SessionClock, Settings};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PreviewConfig::default();
//! let url = target::normalize_url("example.com")?;
//! let settings = Settings::default()
//!     .with_url(url)
//!     .with_active(ActiveDevices::from_ids(["iphone-se", "desktop-hd"])?);
//!
//! let clock = SessionClock::new();
//! let embedder = rfpreview::fetch::FetchEmbedder::new(&config)?;
//! let loader = Loader::new(embedder, clock.clone()).with_timings(config.timings());
//! if let Some(session) = settings.render(clock.begin()) {
//!     for report in loader.load_session(&session).await {
//!         println!("{}: {:?}", report.device, report.state());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod devices;
pub mod frame;
pub mod sandbox;
pub mod scale;
pub mod session;
pub mod target;

// Embedding seam plus the scripted backend used by tests and demos
pub mod embed;
pub mod loader;

pub mod controller;
pub mod markup;

// HTTP-backed embedder (no JS, no layout)
#[cfg(feature = "fetch")]
pub mod fetch;

pub use controller::{Previewer, UiEvent};
pub use devices::{DeviceSpec, DEVICES};
pub use embed::{Embedder, ScriptedEmbedder};
pub use frame::FrameState;
pub use loader::{FrameReport, Loader, LoaderTimings};
pub use sandbox::SandboxFlags;
pub use scale::ZoomMode;
pub use session::{ActiveDevices, PreviewSession, SessionClock, SessionId, Settings};

/// Grid width assumed when nothing better is known (1280px per frame after padding)
pub const DEFAULT_GRID_WIDTH: f64 = 1312.0;

/// Configuration for the previewer
///
/// Every field has a conservative default, so a config file only needs the
/// keys it changes:
///
/// ```
/// let cfg: rfpreview::PreviewConfig = serde_json::from_str(r#"{"timeout_ms": 5000}"#).unwrap();
/// assert_eq!(cfg.timeout_ms, 5000);
/// assert!(cfg.user_agent.contains("RFOX"));
/// ```
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// User agent string to send with requests
    pub user_agent: String,
    /// Timeout for page fetches in milliseconds
    pub timeout_ms: u64,
    /// Custom HTTP headers
    pub headers: HashMap<String, String>,
    /// Origin of the page hosting the previews
    ///
    /// With `None` every fetched page is cross-origin and cannot be read.
    /// Frames that never committed, or whose page refused embedding, still
    /// read as empty documents either way.
    pub host_origin: Option<String>,
    /// Delay between consecutive frame mounts
    pub stagger_ms: u64,
    /// Silence allowed before a frame's document is inspected
    pub inspect_delay_ms: u64,
    /// Quiet period after the last resize before re-rendering
    pub resize_debounce_ms: u64,
    /// Width of the preview grid, before padding
    pub grid_width: f64,
    pub zoom: ZoomMode,
    /// Initially active devices; `None` selects every device
    pub devices: Option<Vec<String>>,
    /// `sandbox` attribute for preview frames; `None` keeps the preview policy
    pub sandbox: Option<String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/115.0 RFOX-Preview/0.1"
                .to_string(),
            timeout_ms: 30000,
            headers: HashMap::new(),
            host_origin: None,
            stagger_ms: 100,
            inspect_delay_ms: 5000,
            resize_debounce_ms: 200,
            grid_width: DEFAULT_GRID_WIDTH,
            zoom: ZoomMode::Auto,
            devices: None,
            sandbox: None,
        }
    }
}

impl PreviewConfig {
    /// Read a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values no session could be built from
    pub fn validate(&self) -> Result<()> {
        if let ZoomMode::Fixed(m) = self.zoom {
            ZoomMode::fixed(m)?;
        }
        if !self.grid_width.is_finite() {
            return Err(Error::ConfigError(format!("grid_width {}", self.grid_width)));
        }
        if let Some(ids) = &self.devices {
            ActiveDevices::from_ids(ids)?;
        }
        if let Some(origin) = &self.host_origin {
            url::Url::parse(origin)
                .map_err(|e| Error::ConfigError(format!("host_origin {}: {}", origin, e)))?;
        }
        Ok(())
    }

    pub fn timings(&self) -> LoaderTimings {
        LoaderTimings {
            stagger: Duration::from_millis(self.stagger_ms),
            inspect_delay: Duration::from_millis(self.inspect_delay_ms),
        }
    }

    pub fn sandbox_flags(&self) -> SandboxFlags {
        match &self.sandbox {
            Some(attribute) => SandboxFlags::parse(attribute),
            None => SandboxFlags::preview(),
        }
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    /// Initial settings: no URL yet, configured zoom, devices and width
    pub fn settings(&self) -> Result<Settings> {
        let active = match &self.devices {
            Some(ids) => ActiveDevices::from_ids(ids)?,
            None => ActiveDevices::all(),
        };
        Ok(Settings::new(self.grid_width)
            .with_zoom(self.zoom)
            .with_active(active))
    }
}
