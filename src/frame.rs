//! Per-frame lifecycle
//!
//! A frame starts out loading and settles exactly once. The native signal and
//! the inspection timer race for that transition; whichever arrives second is
//! ignored, and the loader drops the loser's timer.

use serde::Serialize;
use std::fmt;

/// Message shown in place of a frame the page refused to be embedded in
pub const BLOCKED_MESSAGE: &str = "This website blocked the preview";

/// Lifecycle state of one device frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameState {
    Loading,
    Loaded,
    Blocked,
}

impl FrameState {
    pub fn is_settled(self) -> bool {
        !matches!(self, FrameState::Loading)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameState::Loading => "loading",
            FrameState::Loaded => "loaded",
            FrameState::Blocked => "blocked",
        })
    }
}

/// What the inspection timer found in the embedded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Inspection {
    /// Cross-origin isolation denied access; the page is probably fine
    AccessDenied,
    /// The document is readable and has no content
    Empty,
    /// The document is readable and has content
    HasContent,
}

/// Inputs to the frame state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// The embed reported a successful load
    LoadSucceeded,
    /// The embed reported a hard error
    LoadFailed(String),
    /// The inspection delay elapsed with no signal
    InspectionDue(Inspection),
}

/// Why a frame settled the way it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum Resolution {
    /// Native load signal
    Signalled,
    /// Native error signal
    Errored(String),
    /// Timer fired and the document could not be inspected
    AssumedLoaded,
    /// Timer fired and the document had content
    InspectedContent,
    /// Timer fired and the document was empty
    InspectedEmpty,
}

/// What the frame overlay shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indicator {
    Spinner,
    Hidden,
    Failure(&'static str),
}

/// State machine for one mounted frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    state: FrameState,
    resolution: Option<Resolution>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            state: FrameState::Loading,
            resolution: None,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn indicator(&self) -> Indicator {
        indicator_for(self.state)
    }

    /// Feed an event; returns the new state if it caused a transition
    ///
    /// Settled frames ignore everything, which is how the loser of the
    /// signal/timer race is discarded.
    pub fn apply(&mut self, event: FrameEvent) -> Option<FrameState> {
        if self.state.is_settled() {
            return None;
        }
        let (state, resolution) = match event {
            FrameEvent::LoadSucceeded => (FrameState::Loaded, Resolution::Signalled),
            FrameEvent::LoadFailed(reason) => (FrameState::Blocked, Resolution::Errored(reason)),
            FrameEvent::InspectionDue(Inspection::AccessDenied) => {
                (FrameState::Loaded, Resolution::AssumedLoaded)
            }
            FrameEvent::InspectionDue(Inspection::HasContent) => {
                (FrameState::Loaded, Resolution::InspectedContent)
            }
            FrameEvent::InspectionDue(Inspection::Empty) => {
                (FrameState::Blocked, Resolution::InspectedEmpty)
            }
        };
        self.state = state;
        self.resolution = Some(resolution);
        Some(state)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay for a frame in `state`
pub fn indicator_for(state: FrameState) -> Indicator {
    match state {
        FrameState::Loading => Indicator::Spinner,
        FrameState::Loaded => Indicator::Hidden,
        FrameState::Blocked => Indicator::Failure(BLOCKED_MESSAGE),
    }
}
