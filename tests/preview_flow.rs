//! End-to-end preview flow on a scripted embedder with a paused clock

use rfpreview::embed::{Script, ScriptedEmbedder};
use rfpreview::frame::{FrameState, Inspection, BLOCKED_MESSAGE};
use rfpreview::loader::FrameUpdate;
use rfpreview::markup::{self, FrameStates};
use rfpreview::{ActiveDevices, Loader, SandboxFlags, SessionClock, Settings, ZoomMode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn settings(devices: &[&str]) -> Settings {
    Settings::new(1312.0)
        .with_url(rfpreview::target::normalize_url("example.com").unwrap())
        .with_active(ActiveDevices::from_ids(devices).unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_mixed_targets_render_their_own_state() {
    let embedder = ScriptedEmbedder::new();
    embedder.script("iphone-se", Script::loads_after(Duration::from_millis(300)));
    embedder.script("ipad-mini", Script::silent(Inspection::Empty));
    embedder.script(
        "desktop-hd",
        Script::fails_after(Duration::from_millis(50), "net::ERR_FAILED"),
    );

    let clock = SessionClock::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let loader = Loader::new(embedder.clone(), clock.clone()).with_updates(tx);
    let session = settings(&["iphone-se", "ipad-mini", "desktop-hd"])
        .render(clock.begin())
        .unwrap();

    let started = Instant::now();
    let reports = loader.load_session(&session).await;
    // The silent frame settles at its mount (100ms) plus the inspection delay
    assert_eq!(started.elapsed(), Duration::from_millis(5100));

    let states: FrameStates = reports
        .iter()
        .filter_map(|r| r.state().map(|s| (r.device, s)))
        .collect();
    assert_eq!(states["iphone-se"], FrameState::Loaded);
    assert_eq!(states["ipad-mini"], FrameState::Blocked);
    assert_eq!(states["desktop-hd"], FrameState::Blocked);

    let mut updates: Vec<FrameUpdate> = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    assert_eq!(updates.len(), 6);
    assert!(updates.iter().all(|u| u.session == session.id));

    let html = markup::render_grid(&session, &SandboxFlags::preview(), &states);
    assert_eq!(html.matches(BLOCKED_MESSAGE).count(), 2);
    assert!(!html.contains("Loading preview..."));
}

#[tokio::test(start_paused = true)]
async fn test_mounts_are_staggered_in_table_order() {
    let embedder =
        ScriptedEmbedder::new().with_fallback(Script::loads_after(Duration::from_millis(1)));
    let clock = SessionClock::new();
    let loader = Loader::new(embedder.clone(), clock.clone());
    // Selection order does not matter; the table does
    let session = settings(&["desktop-hd", "galaxy-fold", "ipad-mini", "iphone-se"])
        .render(clock.begin())
        .unwrap();

    let reports = loader.load_session(&session).await;
    let order: Vec<_> = embedder.mounts().iter().map(|m| m.device).collect();
    assert_eq!(order, ["galaxy-fold", "iphone-se", "ipad-mini", "desktop-hd"]);

    let offsets: Vec<_> = reports.iter().map(|r| r.mounted_after_ms).collect();
    assert_eq!(offsets, [Some(0), Some(100), Some(200), Some(300)]);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_zoom_mounts_native_size() {
    let embedder =
        ScriptedEmbedder::new().with_fallback(Script::loads_after(Duration::from_millis(1)));
    let clock = SessionClock::new();
    let loader = Loader::new(embedder.clone(), clock.clone());
    let session = settings(&["monitor-4k", "iphone-se"])
        .with_zoom(ZoomMode::Fixed(0.25))
        .render(clock.begin())
        .unwrap();

    loader.load_session(&session).await;
    for mount in embedder.mounts() {
        assert_eq!(mount.scale, 0.25);
    }
    let plan = &session.frames[1];
    assert_eq!(plan.device.id, "monitor-4k");
    assert_eq!(plan.viewport.frame_width, 3840);
    assert_eq!(plan.viewport.container_width, 960);
    assert_eq!(plan.viewport.container_height, 540);
}
