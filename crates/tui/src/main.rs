mod app;
mod renderer;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use massif_view_core::config::ViewerConfig;
use massif_view_core::svg::render_svg;
use massif_view_core::views::{
    AllocTreeView, MemgraphView, Renderable, SparklinesView, TimelineView, TreemapView,
};
use massif_view_core::MassifData;
use massif_view_protocol::Viewport;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Browse a heap-profile snapshot in the terminal, or export one view as SVG.
#[derive(Debug, Parser)]
#[command(name = "massif-view", version)]
struct Cli {
    /// Snapshot JSON produced by the profile converter.
    snapshot: PathBuf,

    /// Viewer settings (JSON). Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the chosen view to this SVG file instead of starting the UI.
    #[arg(long, value_name = "FILE")]
    svg: Option<PathBuf>,

    /// View to export with --svg.
    #[arg(long, value_enum, default_value_t = ViewKind::Treemap)]
    view: ViewKind,

    #[arg(long, default_value_t = 1024.0)]
    width: f64,

    #[arg(long, default_value_t = 768.0)]
    height: f64,

    /// Use the dark palette for SVG export.
    #[arg(long)]
    dark: bool,

    /// Append logs here; nothing is logged otherwise. Filter with RUST_LOG.
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ViewKind {
    Treemap,
    Memgraph,
    Sparklines,
    AllocTree,
    Timeline,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }

    let config = match &cli.config {
        Some(path) => ViewerConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    let bytes = std::fs::read(&cli.snapshot)
        .with_context(|| format!("reading {}", cli.snapshot.display()))?;
    let data = MassifData::from_json(&bytes, &config.model)
        .with_context(|| format!("loading snapshot {}", cli.snapshot.display()))?;
    info!(path = %cli.snapshot.display(), nodes = data.len(), "snapshot loaded");

    match &cli.svg {
        Some(out) => export_svg(&data, &config, &cli, out),
        None => renderer::run(data, config),
    }
}

/// The terminal owns stdout, so logs only ever go to a file.
fn init_logging(path: &Path) -> Result<()> {
    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn export_svg(data: &MassifData, config: &ViewerConfig, cli: &Cli, out: &Path) -> Result<()> {
    let mut view: Box<dyn Renderable> = match cli.view {
        ViewKind::Treemap => Box::new(TreemapView::new(config.treemap.clone())),
        ViewKind::Memgraph => Box::new(MemgraphView::new(config.memgraph.clone())),
        ViewKind::Sparklines => Box::new(SparklinesView::new(config.sparklines.clone())),
        ViewKind::AllocTree => Box::new(AllocTreeView::new(config.alloc_tree.clone())),
        ViewKind::Timeline => Box::new(TimelineView::new(config.playback.clone())),
    };
    let viewport = Viewport::sized(cli.width, cli.height);
    let commands = view.draw(data, &viewport);
    let svg = render_svg(&commands, cli.width, cli.height, cli.dark);
    std::fs::write(out, svg).with_context(|| format!("writing {}", out.display()))?;
    info!(view = ?cli.view, path = %out.display(), commands = commands.len(), "exported svg");
    Ok(())
}
