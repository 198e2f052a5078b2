//! HTML for the preview grid
//!
//! One `device-frame` per active device. The container is sized to the
//! floored scaled box; the `<iframe>` inside keeps the device's native size and
//! is shrunk with a top-left anchored transform.

use crate::devices::{self, DeviceIcon, DeviceSpec, ERROR_ICON_PATH};
use crate::frame::{indicator_for, FrameState, Indicator};
use crate::sandbox::SandboxFlags;
use crate::scale::{ZoomMode, ZOOM_PRESETS};
use crate::session::{FramePlan, PreviewSession, Settings};
use std::collections::HashMap;
use std::fmt::Write;

/// Known frame states by device id; missing devices are still loading
pub type FrameStates = HashMap<&'static str, FrameState>;

const STYLE: &str = r#"
body { margin: 0; font-family: system-ui, sans-serif; background: #0f1115; color: #e6e6e6; }
.toolbar { padding: 16px; display: flex; flex-wrap: wrap; gap: 8px; align-items: center; }
.device-toggle, .zoom-btn { background: #1c1f26; color: inherit; border: 1px solid #2c313c; border-radius: 6px; padding: 4px 8px; }
.device-toggle.active, .zoom-btn.active { border-color: #4f8cff; }
.error-message { color: #ff6b6b; min-height: 1em; padding: 0 16px; }
.preview-grid { padding: 16px; display: grid; grid-template-columns: repeat(auto-fill, minmax(320px, 1fr)); gap: 16px; }
.device-large { grid-column: span 2; }
.device-header { display: flex; justify-content: space-between; font-size: 13px; margin-bottom: 6px; }
.device-icon svg { width: 14px; height: 14px; vertical-align: middle; }
.iframe-container { position: relative; overflow: hidden; background: #fff; }
.iframe-loading { position: absolute; inset: 0; display: flex; flex-direction: column; align-items: center; justify-content: center; color: #555; }
.iframe-error { text-align: center; color: #b00020; }
.empty-state { padding: 48px; text-align: center; color: #888; }
"#;

/// Escape text content
fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

/// Escape an attribute value
fn escape_attribute(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

fn text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_text(s, &mut out);
    out
}

fn attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_attribute(s, &mut out);
    out
}

fn icon(path: &str) -> String {
    format!(
        r#"<svg viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2"><path d="{}"/></svg>"#,
        attr(path)
    )
}

fn device_icon(icon_ref: DeviceIcon) -> String {
    icon(icon_ref.path())
}

/// Overlay markup for a frame in `state`
pub fn render_overlay(device: &DeviceSpec, state: FrameState) -> String {
    match indicator_for(state) {
        Indicator::Hidden => String::new(),
        Indicator::Spinner => format!(
            r#"<div class="iframe-loading" id="loading-{}"><div class="spinner"></div><span>Loading preview...</span></div>"#,
            attr(device.id)
        ),
        Indicator::Failure(message) => format!(
            r#"<div class="iframe-loading" id="loading-{}"><div class="iframe-error"><svg width="48" height="48" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="1.5"><path d="{}"/></svg><p>{}</p></div></div>"#,
            attr(device.id),
            ERROR_ICON_PATH,
            text(message)
        ),
    }
}

/// Markup for one device frame
pub fn render_frame(
    index: usize,
    plan: &FramePlan,
    url: &str,
    sandbox: &SandboxFlags,
    state: FrameState,
) -> String {
    let device = plan.device;
    let v = &plan.viewport;
    let extra_class = if device.is_large() { " device-large" } else { "" };

    let mut out = String::new();
    let _ = write!(
        out,
        r#"<div class="device-frame{extra}" data-device-id="{id}" data-state="{state}" style="animation-delay: {delay:.1}s">"#,
        extra = extra_class,
        id = attr(device.id),
        state = state,
        delay = index as f64 * 0.1,
    );
    let _ = write!(
        out,
        r#"<div class="device-header"><div class="device-info"><span class="device-icon">{icon}</span><span class="device-name">{name}</span></div><span class="device-dimensions">{w} × {h}</span></div>"#,
        icon = device_icon(device.icon),
        name = text(device.name),
        w = v.frame_width,
        h = v.frame_height,
    );
    let _ = write!(
        out,
        r#"<div class="device-viewport"><div class="iframe-container" style="width: {cw}px; height: {ch}px;">"#,
        cw = v.container_width,
        ch = v.container_height,
    );
    out.push_str(&render_overlay(device, state));
    let _ = write!(
        out,
        r#"<iframe src="{src}" width="{w}" height="{h}" style="width: {w}px; height: {h}px; transform: scale({scale}); transform-origin: top left; border: none;" sandbox="{sandbox}" loading="lazy" title="{title}"></iframe>"#,
        src = attr(url),
        w = v.frame_width,
        h = v.frame_height,
        scale = v.scale,
        sandbox = attr(&sandbox.serialize()),
        title = attr(device.name),
    );
    out.push_str("</div></div></div>");
    out
}

/// The grid for a session, one frame per active device
pub fn render_grid(
    session: &PreviewSession,
    sandbox: &SandboxFlags,
    states: &FrameStates,
) -> String {
    let mut out = String::from(r#"<div class="preview-grid has-content" id="previewGrid">"#);
    for (index, plan) in session.frames.iter().enumerate() {
        let state = states
            .get(plan.device.id)
            .copied()
            .unwrap_or(FrameState::Loading);
        out.push_str(&render_frame(index, plan, session.url.as_str(), sandbox, state));
    }
    out.push_str("</div>");
    out
}

fn render_toggles(settings: &Settings) -> String {
    let mut out = String::from(r#"<div class="device-toggles" id="deviceToggles">"#);
    for device in devices::DEVICES {
        let active = device.dimensions.is_some() && settings.active.contains(device.id);
        let _ = write!(
            out,
            r#"<button type="button" class="device-toggle{active}" data-device-id="{id}" title="{title}"><span class="device-icon">{icon}</span><span>{name}</span></button>"#,
            active = if active { " active" } else { "" },
            id = attr(device.id),
            title = attr(&device.label()),
            icon = device_icon(device.icon),
            name = text(device.name),
        );
    }
    out.push_str("</div>");
    out
}

fn render_zoom_buttons(zoom: ZoomMode) -> String {
    let mut out = String::from(r#"<div class="zoom-buttons">"#);
    let mut button = |value: String, label: String, active: bool| {
        let _ = write!(
            out,
            r#"<button type="button" class="zoom-btn{}" data-zoom="{}">{}</button>"#,
            if active { " active" } else { "" },
            attr(&value),
            text(&label)
        );
    };
    button("auto".into(), "Auto".into(), zoom.is_auto());
    for preset in ZOOM_PRESETS {
        button(
            preset.to_string(),
            format!("{}%", (preset * 100.0).round()),
            zoom == ZoomMode::Fixed(preset),
        );
    }
    out.push_str("</div>");
    out
}

/// Complete standalone page: form, toggles, zoom buttons and the grid
pub fn render_document(
    settings: &Settings,
    session: Option<&PreviewSession>,
    sandbox: &SandboxFlags,
    states: &FrameStates,
    error: Option<&str>,
) -> String {
    let url_value = settings.url.as_ref().map(|u| u.as_str()).unwrap_or("");
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Responsive Preview</title>\n<style>");
    out.push_str(STYLE);
    out.push_str("</style>\n</head>\n<body>\n");
    let _ = write!(
        out,
        r#"<form class="toolbar" id="urlForm"><input type="text" id="urlInput" placeholder="Enter a URL" value="{}"><button type="submit">Preview</button></form>"#,
        attr(url_value)
    );
    let _ = write!(
        out,
        r#"<div class="error-message" id="errorMessage">{}</div>"#,
        text(error.unwrap_or(""))
    );
    let _ = write!(
        out,
        r#"<div class="toolbar">{}{}</div>"#,
        render_toggles(settings),
        render_zoom_buttons(settings.zoom)
    );
    out.push('\n');
    match session {
        Some(session) => out.push_str(&render_grid(session, sandbox, states)),
        None => out.push_str(
            r#"<div class="preview-grid" id="previewGrid"><div class="empty-state"><p>Enter a URL to preview it across devices</p></div></div>"#,
        ),
    }
    out.push_str("\n</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BLOCKED_MESSAGE;
    use crate::session::{ActiveDevices, SessionId};
    use url::Url;

    fn session() -> (Settings, PreviewSession) {
        let settings = Settings::new(992.0)
            .with_url(Url::parse("https://example.com/?a=1&b=2").unwrap())
            .with_active(ActiveDevices::from_ids(["iphone-se", "desktop-hd"]).unwrap());
        let session = settings.render(SessionId(1)).unwrap();
        (settings, session)
    }

    #[test]
    fn frames_carry_native_size_and_transform() {
        let (_, session) = session();
        let html = render_grid(&session, &SandboxFlags::preview(), &FrameStates::new());
        // 960 / 1920 = 0.5
        assert!(html.contains(r#"style="width: 960px; height: 540px;""#));
        assert!(html.contains(r#"width="1920" height="1080""#));
        assert!(html.contains("transform: scale(0.5); transform-origin: top left;"));
        assert!(html.contains(r#"sandbox="allow-scripts allow-same-origin allow-forms""#));
        assert!(html.contains(r#"src="https://example.com/?a=1&amp;b=2""#));
        assert!(html.contains("device-frame device-large"));
        assert!(html.contains("animation-delay: 0.1s"));
        assert_eq!(html.matches("<iframe").count(), 2);
    }

    #[test]
    fn overlays_follow_frame_state() {
        let (_, session) = session();
        let mut states = FrameStates::new();
        states.insert("iphone-se", FrameState::Loaded);
        states.insert("desktop-hd", FrameState::Blocked);
        let html = render_grid(&session, &SandboxFlags::preview(), &states);
        assert!(!html.contains("Loading preview..."));
        assert_eq!(html.matches(BLOCKED_MESSAGE).count(), 1);
        assert!(html.contains(r#"data-device-id="desktop-hd" data-state="blocked""#));
    }

    #[test]
    fn document_marks_active_controls() {
        let (settings, session) = session();
        let html = render_document(
            &settings,
            Some(&session),
            &SandboxFlags::preview(),
            &FrameStates::new(),
            Some("<oops>"),
        );
        assert!(html.contains(r#"class="device-toggle active" data-device-id="iphone-se""#));
        assert!(html.contains(r#"class="device-toggle" data-device-id="pixel-7""#));
        assert!(html.contains(r#"class="zoom-btn active" data-zoom="auto""#));
        assert!(html.contains(r#"title="iPhone SE (375×667)""#));
        assert!(html.contains("&lt;oops&gt;"));
        assert_eq!(html.matches("Loading preview...").count(), 2);
    }

    #[test]
    fn document_without_session_shows_empty_state() {
        let settings = Settings::new(1000.0).with_zoom(ZoomMode::Fixed(0.5));
        let sandbox = SandboxFlags::preview();
        let html = render_document(&settings, None, &sandbox, &FrameStates::new(), None);
        assert!(html.contains("empty-state"));
        assert!(!html.contains("<iframe"));
        assert!(html.contains(r#"class="zoom-btn active" data-zoom="0.5">50%"#));
    }

    #[test]
    fn escaping() {
        assert_eq!(text("a<b>&c"), "a&lt;b&gt;&amp;c");
        assert_eq!(attr(r#"iPad Pro 11""#), "iPad Pro 11&quot;");
    }
}
