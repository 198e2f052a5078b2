//! Viewport scaler
//!
//! Maps a device's nominal size, the width available in the preview grid and
//! the zoom mode to a scale factor and the container box for the frame. The
//! frame itself keeps the unscaled size and is shrunk with a transform, so the
//! page lays out at the device's native resolution.

use crate::devices::Dimensions;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest manual zoom multiplier accepted from the user
pub const MIN_ZOOM: f64 = 0.1;
/// Largest manual zoom multiplier accepted from the user
pub const MAX_ZOOM: f64 = 2.0;
/// Multipliers offered as zoom buttons
pub const ZOOM_PRESETS: [f64; 4] = [0.25, 0.5, 0.75, 1.0];
/// Scale used in auto mode when the grid has no usable width
pub const MIN_VISIBLE_SCALE: f64 = 0.01;
/// Horizontal padding of the preview grid, subtracted before fitting
pub const GRID_PADDING: f64 = 32.0;

/// How frames are scaled
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomMode {
    /// Shrink to fit the available width, never above 1:1
    #[default]
    Auto,
    /// Fixed multiplier applied to every device
    Fixed(f64),
}

impl ZoomMode {
    /// Build a manual zoom, rejecting values outside `MIN_ZOOM..=MAX_ZOOM`
    pub fn fixed(multiplier: f64) -> Result<Self> {
        if !multiplier.is_finite() || !(MIN_ZOOM..=MAX_ZOOM).contains(&multiplier) {
            return Err(Error::InvalidZoom(format!(
                "{} is outside {}..={}",
                multiplier, MIN_ZOOM, MAX_ZOOM
            )));
        }
        Ok(ZoomMode::Fixed(multiplier))
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, ZoomMode::Auto)
    }
}

impl FromStr for ZoomMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ZoomMode::Auto);
        }
        let value = s.trim_end_matches('%');
        let parsed: f64 = value
            .parse()
            .map_err(|_| Error::InvalidZoom(s.to_string()))?;
        // "50%" means 0.5
        let multiplier = if value.len() != s.len() { parsed / 100.0 } else { parsed };
        ZoomMode::fixed(multiplier)
    }
}

impl fmt::Display for ZoomMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoomMode::Auto => f.write_str("auto"),
            ZoomMode::Fixed(m) => write!(f, "{}", m),
        }
    }
}

/// Scale factor plus the boxes to allocate for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaledViewport {
    pub scale: f64,
    /// Outer container, floored so it never exceeds the scaled content
    pub container_width: u32,
    pub container_height: u32,
    /// The frame's own layout box: the device's unscaled size
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Width left for frames once the grid padding is removed
pub fn available_width(grid_width: f64) -> f64 {
    grid_width - GRID_PADDING
}

/// Scale factor for a device of nominal width `device_width`
///
/// Manual multipliers pass through unchanged. In auto mode the result is
/// `min(1, available / device_width)`; a non-positive available width clamps
/// to [`MIN_VISIBLE_SCALE`].
pub fn scale_factor(device_width: u32, available: f64, zoom: ZoomMode) -> f64 {
    match zoom {
        ZoomMode::Fixed(m) => m,
        ZoomMode::Auto => {
            if available <= 0.0 || !available.is_finite() {
                log::warn!(
                    "no usable preview width ({}), clamping scale to {}",
                    available,
                    MIN_VISIBLE_SCALE
                );
                return MIN_VISIBLE_SCALE;
            }
            (available / f64::from(device_width)).min(1.0)
        }
    }
}

/// Compute the scale and container size for a device
pub fn fit(dimensions: Dimensions, available: f64, zoom: ZoomMode) -> ScaledViewport {
    let scale = scale_factor(dimensions.width, available, zoom);
    ScaledViewport {
        scale,
        container_width: floor_px(dimensions.width, scale),
        container_height: floor_px(dimensions.height, scale),
        frame_width: dimensions.width,
        frame_height: dimensions.height,
    }
}

fn floor_px(length: u32, scale: f64) -> u32 {
    let scaled = (f64::from(length) * scale).floor();
    // Negative or NaN multipliers collapse to an empty box
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else {
        scaled as u32
    }
}
