use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use env_logger::Env;
use rfpreview::controller::{Previewer, UiEvent};
use rfpreview::frame::FrameState;
use rfpreview::loader::{FrameReport, Loader};
use rfpreview::markup::{self, FrameStates};
use rfpreview::{devices, target, PreviewConfig, PreviewSession, SessionClock, Settings, ZoomMode};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "rfpreview", version, about = "Preview a web page across device viewports")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct Layout {
    /// Comma separated device ids, or `all` for the preset
    #[arg(long, value_delimiter = ',')]
    devices: Option<Vec<String>>,

    /// `auto`, a multiplier (0.5) or a percentage (50%)
    #[arg(long)]
    zoom: Option<ZoomMode>,

    /// Width of the preview grid in pixels
    #[arg(long)]
    width: Option<f64>,
}

#[derive(Subcommand)]
enum Command {
    /// List the device table
    Devices {
        #[arg(long)]
        json: bool,
    },
    /// Write the preview grid for a URL as a standalone HTML page
    Render {
        url: String,
        #[command(flatten)]
        layout: Layout,
        /// Draw frames without checking whether the target allows embedding
        #[arg(long)]
        no_probe: bool,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Load a URL on every active device and report which ones are blocked
    Probe {
        url: String,
        #[command(flatten)]
        layout: Layout,
        #[arg(long)]
        json: bool,
    },
    /// Read commands from stdin: url, toggle, zoom, resize, quit
    Interactive {
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => PreviewConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PreviewConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;

    match cli.command {
        Command::Devices { json } => list_devices(json),
        Command::Render {
            url,
            layout,
            no_probe,
            out,
        } => runtime.block_on(render(&apply(config, layout)?, &url, no_probe, out.as_deref())),
        Command::Probe { url, layout, json } => {
            runtime.block_on(probe(&apply(config, layout)?, &url, json))
        }
        Command::Interactive { out } => runtime.block_on(interactive(&config, out)),
    }
}

/// Command line flags win over the config file
fn apply(mut config: PreviewConfig, layout: Layout) -> anyhow::Result<PreviewConfig> {
    if let Some(devices) = layout.devices {
        config.devices = Some(devices);
    }
    if let Some(zoom) = layout.zoom {
        config.zoom = zoom;
    }
    if let Some(width) = layout.width {
        config.grid_width = width;
    }
    config.validate()?;
    Ok(config)
}

fn list_devices(json: bool) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, devices::DEVICES)?;
        writeln!(out)?;
        return Ok(());
    }
    for device in devices::DEVICES {
        let size = match device.dimensions {
            Some(d) => format!("{}x{}", d.width, d.height),
            None => "-".to_string(),
        };
        let preset = if device.show_in_all { "*" } else { "" };
        writeln!(
            out,
            "{:<20} {:<20} {:>10} {:<8} {}",
            device.id,
            device.name,
            size,
            format!("{:?}", device.category).to_lowercase(),
            preset
        )?;
    }
    Ok(())
}

#[cfg(feature = "fetch")]
fn embedder(config: &PreviewConfig) -> anyhow::Result<rfpreview::fetch::FetchEmbedder> {
    Ok(rfpreview::fetch::FetchEmbedder::new(config)?)
}

#[cfg(not(feature = "fetch"))]
fn embedder(_config: &PreviewConfig) -> anyhow::Result<rfpreview::ScriptedEmbedder> {
    bail!("rfpreview was built without the `fetch` feature")
}

type Loaded = (Settings, PreviewSession, Vec<FrameReport>);

async fn load(config: &PreviewConfig, input: &str) -> anyhow::Result<Loaded> {
    let url = target::normalize_url(input).map_err(|e| anyhow::anyhow!(e.inline_message()))?;
    let settings = config.settings()?.with_url(url);
    let clock = SessionClock::new();
    let session = match settings.render(clock.begin()) {
        Some(session) => session,
        None => bail!("nothing to render"),
    };
    let loader = Loader::new(embedder(config)?, clock)
        .with_timings(config.timings())
        .with_sandbox(config.sandbox_flags());
    let reports = loader.load_session(&session).await;
    Ok((settings, session, reports))
}

async fn render(
    config: &PreviewConfig,
    input: &str,
    no_probe: bool,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let (settings, session, states) = if no_probe {
        let url = target::normalize_url(input).map_err(|e| anyhow::anyhow!(e.inline_message()))?;
        let settings = config.settings()?.with_url(url);
        let session = match settings.render(SessionClock::new().begin()) {
            Some(session) => session,
            None => bail!("nothing to render"),
        };
        // Without a probe nothing is known; draw bare frames
        let states: FrameStates = session
            .frames
            .iter()
            .map(|f| (f.device.id, FrameState::Loaded))
            .collect();
        (settings, session, states)
    } else {
        let (settings, session, reports) = load(config, input).await?;
        let states = reports
            .iter()
            .filter_map(|r| r.state().map(|s| (r.device, s)))
            .collect();
        (settings, session, states)
    };

    let html = markup::render_document(
        &settings,
        Some(&session),
        &config.sandbox_flags(),
        &states,
        None,
    );
    write_output(out, &html)?;
    Ok(())
}

async fn probe(config: &PreviewConfig, input: &str, json: bool) -> anyhow::Result<()> {
    let (_, session, reports) = load(config, input).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    println!("{}", session.url);
    for (report, plan) in reports.iter().zip(&session.frames) {
        let state = report
            .state()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "superseded".to_string());
        println!(
            "  {:<20} {:>5}x{:<5} scale {:<6.3} {}",
            report.device,
            plan.viewport.frame_width,
            plan.viewport.frame_height,
            plan.viewport.scale,
            state
        );
    }
    Ok(())
}

fn parse_command(line: &str) -> anyhow::Result<Option<UiEvent>> {
    let line = line.trim();
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };
    let event = match command {
        "" => return Ok(None),
        "url" => UiEvent::Submit(arg.to_string()),
        "toggle" => UiEvent::Toggle(arg.to_string()),
        "zoom" => UiEvent::Zoom(arg.parse()?),
        "resize" => UiEvent::Resize(arg.parse().context("resize expects a width in pixels")?),
        "clear" => UiEvent::Input,
        other => bail!("unknown command {:?} (url, toggle, zoom, resize, clear, quit)", other),
    };
    Ok(Some(event))
}

async fn interactive(config: &PreviewConfig, out: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = config.settings()?;
    let mut previewer = Previewer::new(settings, SessionClock::new())
        .with_timings(config.timings())
        .with_resize_debounce(config.resize_debounce())
        .with_sandbox(config.sandbox_flags());
    let sandbox = previewer.sandbox().clone();
    let embedder = embedder(config)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let reader = async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim() == "quit" {
                break;
            }
            match parse_command(&line) {
                Ok(Some(event)) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => eprintln!("{:#}", err),
            }
        }
    };

    let sink = |snapshot: &rfpreview::controller::Snapshot| {
        if let Some(error) = &snapshot.error {
            eprintln!("{}", error);
        }
        if let Err(err) = write_output(out.as_deref(), &snapshot.to_html(&sandbox)) {
            log::error!("writing preview failed: {:#}", err);
        }
    };

    let (reports, ()) = tokio::join!(previewer.run(rx, embedder, sink), reader);
    let blocked = reports
        .iter()
        .filter(|r| r.state() == Some(FrameState::Blocked))
        .count();
    log::info!("last session: {} frame(s), {} blocked", reports.len(), blocked);
    Ok(())
}

fn write_output(out: Option<&Path>, html: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => std::fs::write(path, html)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            lock.write_all(html.as_bytes())?;
            lock.flush()?;
        }
    }
    Ok(())
}
