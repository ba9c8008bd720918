//! Writes the operating-room KPI Sankey diagram as a standalone HTML page.

use anyhow::{Context, Result};
use bdx_bridge::services::sankey::{
    build_diagram, generate_dataset, plotly_figure, render_html, DEFAULT_SEED,
};
use bdx_bridge::telemetry;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "or_sankey", about = "Generate the weekly operating-room KPI Sankey diagram")]
struct Args {
    #[arg(long, default_value = "operating_room_sankey_diagram.html")]
    output: PathBuf,
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = telemetry::init_tracing(None)?;

    let dataset = generate_dataset(args.seed);
    let diagram = build_diagram(&dataset);
    let html = render_html(&plotly_figure(&diagram));
    std::fs::write(&args.output, html)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    tracing::info!(
        path = %args.output.display(),
        rooms = dataset.rooms.len(),
        links = diagram.links.len(),
        "sankey diagram written"
    );
    Ok(())
}
