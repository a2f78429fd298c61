use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use drift_chains::render::emit;
use drift_chains::*;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(about = "Neutral Wright-Fisher drift: lineage chains and trait proportion")]
struct Args {
    /// JSON run configuration; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,
    /// Population size N
    #[arg(short = 'n', long)]
    population_size: Option<usize>,
    /// Generations drawn, including the initial one
    #[arg(short = 't', long)]
    generations: Option<usize>,
    /// Random seed (random if omitted)
    #[arg(long)]
    seed: Option<u64>,
    /// Trait whose proportion is plotted
    #[arg(long)]
    reference: Option<String>,
    /// Trait color as LABEL=COLOR, e.g. A=#eb6864 (repeatable)
    #[arg(long = "color", value_parser = parse_color_arg)]
    colors: Vec<(String, String)>,
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long)]
    dpi: Option<u32>,
    /// Write the figure as SVG to stdout instead of saving a PNG
    #[arg(long)]
    display: bool,
    /// Trim arrows to the circle boundaries
    #[arg(long)]
    shorten_edges: bool,
    /// Omit axis labels and ticks
    #[arg(long)]
    no_labels: bool,
}

fn parse_color_arg(value: &str) -> Result<(String, String)> {
    let (label, color) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("expected LABEL=COLOR, got '{value}'"))?;
    Ok((label.to_string(), color.to_string()))
}

impl Args {
    fn into_config(self) -> Result<ChainsConfig> {
        let mut config = match &self.config {
            Some(path) => ChainsConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ChainsConfig::default(),
        };
        if let Some(n) = self.population_size {
            config.population_size = n;
        }
        if let Some(t) = self.generations {
            config.generations = t;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(reference) = self.reference {
            config.reference_trait = reference;
        }
        config.colors.extend(self.colors);
        if let Some(path) = self.output {
            config.output.path = path;
        }
        if let Some(dpi) = self.dpi {
            config.output.dpi = dpi;
        }
        if self.display {
            config.output.mode = OutputMode::Display;
        }
        config.shorten_edges |= self.shorten_edges;
        if self.no_labels {
            config.annotate = false;
        }
        Ok(config)
    }
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::init();
    let config = Args::parse().into_config()?;
    config.validate()?;
    log::debug!("{config:?}");

    let palette = config.palette()?;
    let history = simulate(&config)?;
    log::info!(
        "seed {}: proportion of '{}' {:?}",
        history.random_seed,
        history.alphabet.label(history.reference),
        history.proportions()
    );

    emit(&history, &palette, &config.render_options(), &config.output)
        .with_context(|| format!("rendering seed {}", history.random_seed))?;
    Ok(())
}
