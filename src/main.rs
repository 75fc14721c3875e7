//! Ledfield - Main Entry Point
//!
//! Runs the compositing loop against a device node or file, and offers a few
//! offline helpers for inspecting effects, layouts and packets.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use ledfield::effects::EffectRegistry;
use ledfield::geometry::BoardLayout;
use ledfield::layout::LayoutDocument;
use ledfield::output::encode_packet;
use ledfield::settings::{AppPreferences, EngineSettings};
use ledfield::telemetry::{init_logging, LogConfig};
use ledfield::{App, LayerEngine, OriginState};

/// Host tick rate; render and draw cadences are derived from elapsed time
const TICK_INTERVAL: Duration = Duration::from_micros(8_333);
const STATUS_INTERVAL_SECS: f64 = 1.0;

#[derive(Parser, Debug)]
#[command(name = "ledfield", version, about = "LED board effect compositor")]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the tick loop and stream frames to a port
    Run(RunArgs),
    /// List registered effects and their parameters
    Effects,
    /// Write the default layout document
    ExportLayout {
        /// Output JSON path; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Hex-dump the packet for a test frame
    Packet {
        #[arg(long, default_value_t = 0)]
        seq: u16,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Settings XML file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Layout JSON to import at startup
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Device node or file frames are written to
    #[arg(long)]
    port: Option<PathBuf>,

    /// Render rate in Hz (10-60)
    #[arg(long)]
    fps: Option<u32>,

    /// Active effect id
    #[arg(long)]
    effect: Option<String>,

    /// External track feed URL; enables feed tracking
    #[arg(long)]
    feed: Option<String>,

    /// Camera index to follow in the track feed
    #[arg(long)]
    camera_index: Option<i64>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        file_enabled: cli.log_file.is_some(),
        file_path: cli.log_file.clone(),
        ..Default::default()
    };
    let _log_guard = init_logging(&log_config).map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Effects => cmd_effects(),
        Command::ExportLayout { out } => cmd_export_layout(out),
        Command::Packet { seq } => cmd_packet(seq),
    }
}

fn load_settings(args: &RunArgs, prefs: &AppPreferences) -> anyhow::Result<EngineSettings> {
    let mut settings = match &args.settings {
        Some(path) => EngineSettings::load_from_file(path)
            .with_context(|| format!("load settings '{}'", path.display()))?,
        None => {
            let mut settings = EngineSettings::default();
            prefs.apply_to(&mut settings.tracking);
            settings
        }
    };

    if let Some(fps) = args.fps {
        settings.render_fps = fps;
    }
    if let Some(effect) = &args.effect {
        settings.active_effect = Some(effect.clone());
    }
    if let Some(url) = &args.feed {
        settings.tracking.use_feed = true;
        settings.tracking.feed_url = url.clone();
    }
    if let Some(index) = args.camera_index {
        settings.tracking.camera_index = index;
    }
    if let Some(port) = &args.port {
        settings.link.port = Some(port.to_string_lossy().into_owned());
    }
    settings.clamp_ranges();
    Ok(settings)
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut prefs = AppPreferences::load();
    let settings = load_settings(&args, &prefs)?;
    let registry = Arc::new(EffectRegistry::with_builtins());
    let mut app = App::new(settings, registry);

    let layout_path = args.layout.clone().or_else(|| prefs.last_layout());
    if let Some(path) = &layout_path {
        match LayoutDocument::load_file(path).and_then(|doc| app.apply_layout(&doc)) {
            Ok(()) => prefs.set_last_layout(path),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "layout not imported"),
        }
    }

    let started = Instant::now();
    if let Some(port) = app.settings().link.port.clone() {
        app.connect_port(&PathBuf::from(&port), 0.0)
            .with_context(|| format!("open port '{port}'"))?;
    } else {
        tracing::warn!("no port configured, running without output");
    }

    let mut last_status = 0.0;
    loop {
        let now = started.elapsed().as_secs_f64();
        if args.duration.is_some_and(|d| now >= d) {
            break;
        }
        if !app.is_running() && app.status() == "connected" {
            app.start(now);
        }
        if app.status() == "send error" {
            anyhow::bail!("frame link failed: {}", app.status_sub());
        }

        app.tick(now);

        if now - last_status >= STATUS_INTERVAL_SECS {
            last_status = now;
            tracing::info!(status = app.status(), "{}", app.status_line());
        }
        std::thread::sleep(TICK_INTERVAL);
    }

    app.disconnect();
    prefs.capture_from(&app.settings().tracking);
    if let Err(e) = prefs.save() {
        tracing::warn!(error = %e, "preferences not saved");
    }
    Ok(())
}

fn cmd_effects() -> anyhow::Result<()> {
    let registry = EffectRegistry::with_builtins();
    for def in registry.iter() {
        println!("{:<12} {} - {}", def.id(), def.label(), def.description());
        for p in def.params() {
            println!(
                "    {:<10} {:<16} default {:<8} range {}..{} step {}",
                p.key, p.label, p.default, p.min, p.max, p.step
            );
        }
    }
    Ok(())
}

fn cmd_export_layout(out: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = LayerEngine::new(Arc::new(EffectRegistry::with_builtins()));
    let doc = LayoutDocument::capture(&BoardLayout::default(), &OriginState::new(), &engine);
    match out {
        Some(path) => {
            doc.save_file(&path)
                .with_context(|| format!("write layout '{}'", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{}", doc.to_json_pretty()?),
    }
    Ok(())
}

fn cmd_packet(seq: u16) -> anyhow::Result<()> {
    let layout = BoardLayout::default();
    let mut engine = LayerEngine::new(Arc::new(EffectRegistry::with_builtins()));
    engine.set_active("red20");
    let mut frame = vec![0u8; layout.world().frame_len()];
    engine.render_frame(0.0, 0.0, 0.0, layout.world(), &mut frame);

    let packet = encode_packet(&frame, seq)?;
    for (i, chunk) in packet.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("{:06x}  {}", i * 16, hex.join(" "));
    }
    eprintln!("{} bytes, seq {}", packet.len(), seq);
    Ok(())
}
