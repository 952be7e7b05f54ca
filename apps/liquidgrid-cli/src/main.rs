use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use glam::Vec2;
use liquidgrid_activation::{ActivationController, WarpConfig, intersects_with_margin};
use liquidgrid_assets::{QueuedImageLoader, SourceImage, decode_image};
use liquidgrid_common::{ContainerRect, ContainerSize};
use liquidgrid_field::DisplacementField;
use liquidgrid_input::PointerTracker;
use liquidgrid_render::RecordingFactory;
use liquidgrid_tools::{FieldInspector, FieldSummary};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "liquidgrid-cli", about = "Headless driver for the liquid grid warp")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML or JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PointerScript {
    /// Horizontal sweep across the middle, left to right.
    Sweep,
    /// Circle around the centre.
    Circle,
    /// Short flick, then the pointer rests.
    Flick,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the effective configuration
    Info,
    /// Drive the displacement field with a scripted pointer
    Simulate {
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "120")]
        ticks: u64,
        /// Pointer path
        #[arg(short, long, value_enum, default_value = "circle")]
        script: PointerScript,
        /// Print a summary every N ticks (0 = only at the end)
        #[arg(long, default_value = "0")]
        every: u64,
        /// Run the script twice and compare trajectories bit for bit
        #[arg(long)]
        replay_check: bool,
        /// Emit the final summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Scroll a container into view, then resize it, printing every
    /// activation transition
    Scroll {
        /// Image file; a generated checkerboard is used when omitted
        #[arg(long)]
        image: Option<PathBuf>,
        /// Generated image size as WIDTHxHEIGHT
        #[arg(long, default_value = "1600x900")]
        image_size: String,
        /// Container heights applied after activation
        #[arg(long, value_delimiter = ',', default_value = "600,1200,1203,400")]
        heights: Vec<f32>,
        /// Frames rendered after every step
        #[arg(long, default_value = "5")]
        frames: u32,
    },
    /// Validate a config file and print it with defaults filled in
    ValidateConfig {
        path: PathBuf,
    },
}

const CONTAINER_WIDTH: f32 = 800.0;
const VIEWPORT: ContainerRect = ContainerRect {
    left: 0.0,
    top: 0.0,
    width: 1280.0,
    height: 720.0,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = WarpConfig::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;

    match cli.command {
        Commands::Info => {
            println!("liquidgrid-cli v{}", env!("CARGO_PKG_VERSION"));
            print!("{}", config.to_yaml()?);
        }
        Commands::Simulate {
            ticks,
            script,
            every,
            replay_check,
            json,
        } => {
            let (field, trace) = simulate(&config, script, ticks, every)?;
            let summary = FieldInspector::summary(&field);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for line in &trace {
                    println!("{line}");
                }
                println!("{summary}");
                if let Some((x, y)) = FieldInspector::peak_cell(&field) {
                    println!("Peak cell: ({x}, {y})");
                }
            }
            if replay_check {
                let (again, _) = simulate(&config, script, ticks, 0)?;
                let matched = again.state_hash() == field.state_hash();
                println!(
                    "Replay: {} ({:016x} vs {:016x})",
                    if matched { "OK" } else { "MISMATCH" },
                    field.state_hash(),
                    again.state_hash()
                );
                if !matched {
                    bail!("replay diverged");
                }
            }
        }
        Commands::Scroll {
            image,
            image_size,
            heights,
            frames,
        } => {
            let source = match image {
                Some(path) => decode_image(&path)
                    .with_context(|| format!("decoding {}", path.display()))?,
                None => {
                    let (w, h) = parse_size(&image_size)?;
                    SourceImage::checkerboard(w, h, 64)?
                }
            };
            scroll(&config, Arc::new(source), &heights, frames)?;
        }
        Commands::ValidateConfig { path } => {
            let loaded = WarpConfig::load(&path)
                .with_context(|| format!("validating {}", path.display()))?;
            println!("{}: OK", path.display());
            print!("{}", loaded.to_yaml()?);
        }
    }

    Ok(())
}

fn parse_size(text: &str) -> anyhow::Result<(u32, u32)> {
    let Some((w, h)) = text.split_once(['x', 'X']) else {
        bail!("expected WIDTHxHEIGHT, got {text:?}");
    };
    Ok((w.trim().parse()?, h.trim().parse()?))
}

/// Client-space pointer position at `tick` inside a `rect`.
fn pointer_at(script: PointerScript, tick: u64, ticks: u64, rect: &ContainerRect) -> Option<Vec2> {
    let t = tick as f32 / ticks.max(1) as f32;
    let (u, v) = match script {
        PointerScript::Sweep => (0.05 + 0.9 * t, 0.5),
        PointerScript::Circle => {
            let a = t * std::f32::consts::TAU * 2.0;
            (0.5 + 0.3 * a.cos(), 0.5 + 0.3 * a.sin())
        }
        PointerScript::Flick if tick < 10 => (0.3 + 0.04 * tick as f32, 0.4),
        PointerScript::Flick => return None,
    };
    Some(Vec2::new(rect.left + u * rect.width, rect.top + v * rect.height))
}

fn simulate(
    config: &WarpConfig,
    script: PointerScript,
    ticks: u64,
    every: u64,
) -> anyhow::Result<(DisplacementField, Vec<String>)> {
    let mut field = DisplacementField::new(config.field)?;
    let mut tracker = PointerTracker::new(config.pointer);
    let rect = ContainerRect::new(
        0.0,
        0.0,
        CONTAINER_WIDTH,
        CONTAINER_WIDTH / config.render.fallback_aspect,
    );
    let mut trace = Vec::new();

    for tick in 0..ticks {
        if let Some(client) = pointer_at(script, tick, ticks, &rect) {
            tracker.on_move(client, &rect);
        }
        field.tick(&tracker.state());
        tracker.damp();
        if every > 0 && (tick + 1) % every == 0 {
            let s: FieldSummary = FieldInspector::summary(&field);
            trace.push(format!(
                "tick {:>5}: max={:.4} energy={:.4} active={}",
                s.ticks, s.max_magnitude, s.energy, s.active_cells
            ));
        }
    }
    Ok((field, trace))
}

fn scroll(
    config: &WarpConfig,
    image: Arc<SourceImage>,
    heights: &[f32],
    frames: u32,
) -> anyhow::Result<()> {
    let factory = RecordingFactory::new(config.render);
    let ledger = factory.ledger();
    let mut controller = ActivationController::new(config, factory, QueuedImageLoader::new())?;
    let margin = config.activation.root_margin;

    controller.mount();
    let initial = heights.first().copied().unwrap_or(600.0);
    controller.on_resize(ContainerSize::new(CONTAINER_WIDTH, initial));

    // Container sits below the fold; scroll it up until it becomes visible.
    let page_top = 1600.0;
    let mut scroll_y = 0.0;
    while controller.visibility_subscription().is_active() && scroll_y <= page_top {
        let container = ContainerRect::new(0.0, page_top - scroll_y, CONTAINER_WIDTH, initial);
        let visible = intersects_with_margin(&container, &VIEWPORT, margin);
        println!(
            "scroll {:>6.0}: container top {:>6.0} visible={visible}",
            scroll_y, container.top
        );
        controller.on_visibility(visible);
        scroll_y += 150.0;
    }

    let step = |controller: &mut ActivationController<RecordingFactory, QueuedImageLoader>| {
        for ticket in controller.loader_mut().take_pending() {
            controller.on_image_loaded(ticket, Ok(Arc::clone(&image)));
        }
        for _ in 0..frames {
            let Some(handle) = controller.pending_frame() else {
                break;
            };
            let rect = controller.surface_rect();
            controller.on_pointer_move(Vec2::new(rect.width * 0.5, rect.height * 0.5), &rect);
            controller.on_pointer_move(Vec2::new(rect.width * 0.55, rect.height * 0.5), &rect);
            if let Err(e) = controller.run_frame(handle, &()) {
                tracing::warn!(error = %e, "frame failed");
            }
        }
    };

    step(&mut controller);
    for &height in heights.iter().skip(1) {
        controller.on_resize(ContainerSize::new(CONTAINER_WIDTH, height));
        step(&mut controller);
        println!(
            "height {:>6.0}: state={} presentation={:?}",
            height,
            controller.state(),
            controller.presentation()
        );
    }
    controller.dispose();

    println!("\nTransitions:");
    for t in controller.history() {
        println!(
            "  {:<10} -> {:<10} {:?} (height {:.0})",
            t.from.to_string(),
            t.to.to_string(),
            t.reason,
            t.height
        );
    }
    let ledger = ledger.borrow();
    println!(
        "\nPipelines: built={} released={} max_live={} frames={}",
        ledger.built, ledger.released, ledger.max_live, ledger.frames
    );
    if ledger.live() != 0 || ledger.max_live > 1 {
        bail!("pipeline lifecycle violated: live={} max_live={}", ledger.live(), ledger.max_live);
    }
    Ok(())
}
