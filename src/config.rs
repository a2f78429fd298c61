use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChainsError, Result};
use crate::palette::Palette;
use crate::render::{MAX_FIGURE_PIXELS, RenderOptions, figure_pixels};
use crate::{Alphabet, Parameters};

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Write a PNG to `OutputConfig::path`.
    #[default]
    Save,
    /// Write the figure as SVG to stdout.
    Display,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub path: PathBuf,
    pub dpi: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Save,
            path: PathBuf::from("img/chains.png"),
            dpi: 300,
        }
    }
}

// ── Run configuration ─────────────────────────────────────────────────────────

/// Every knob of a run. Missing JSON fields take their default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainsConfig {
    pub population_size: usize,
    /// Generations drawn, including the initial one.
    pub generations: usize,
    /// Random seed (random if omitted)
    pub seed: Option<u64>,
    pub traits: Vec<String>,
    /// Label of the trait whose proportion is plotted.
    pub reference_trait: String,
    /// Relative probability of each trait in the initial population.
    pub initial_weights: Vec<f64>,
    /// Trait label → color (`#rrggbb`, `#rgb`, or a named color).
    pub colors: BTreeMap<String, String>,
    /// Trim arrows to the circle boundaries.
    pub shorten_edges: bool,
    /// Draw axis labels and ticks.
    pub annotate: bool,
    pub output: OutputConfig,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            population_size: 5,
            generations: 11,
            seed: None,
            traits: vec!["A".to_string(), "B".to_string()],
            reference_trait: "A".to_string(),
            initial_weights: vec![0.5, 0.5],
            colors: BTreeMap::from([
                ("A".to_string(), "#eb6864".to_string()),
                ("B".to_string(), "lightgrey".to_string()),
            ]),
            shorten_edges: false,
            annotate: true,
            output: OutputConfig::default(),
        }
    }
}

impl ChainsConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ChainsError::io(path, e))?;
        Self::from_json_str(&text).map_err(|e| match e {
            ChainsError::InvalidParameter(msg) => {
                ChainsError::invalid(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ChainsError::invalid(format!("malformed config: {e}")))
    }

    /// Checks every parameter. Nothing is simulated or drawn before this passes.
    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(ChainsError::invalid("population size must be positive"));
        }
        if self.generations == 0 {
            return Err(ChainsError::invalid("number of generations must be positive"));
        }
        if self.output.dpi == 0 {
            return Err(ChainsError::invalid("dpi must be positive"));
        }
        let pixels = figure_pixels(self.population_size, self.generations, self.output.dpi);
        if pixels > MAX_FIGURE_PIXELS {
            return Err(ChainsError::invalid(format!(
                "figure of {pixels:.0} pixels exceeds the {MAX_FIGURE_PIXELS:.0} pixel limit; \
                 lower the dpi, population size, or generations"
            )));
        }
        let alphabet = Alphabet::new(&self.traits)?;
        alphabet.id_of(&self.reference_trait)?;
        if self.initial_weights.len() != alphabet.len()
            || self
                .initial_weights
                .iter()
                .any(|w| !w.is_finite() || *w < 0.0)
            || self.initial_weights.iter().sum::<f64>() <= 0.0
        {
            return Err(ChainsError::invalid(format!(
                "initial weights must be {} non-negative numbers with a positive sum, got {:?}",
                alphabet.len(),
                self.initial_weights
            )));
        }
        self.palette()?;
        Ok(())
    }

    pub fn palette(&self) -> Result<Palette> {
        Palette::new(&Alphabet::new(&self.traits)?, &self.colors)
    }

    /// Simulation parameters; an absent seed is drawn fresh on every call.
    pub fn parameters(&self) -> Parameters {
        let defaults = Parameters::default();
        Parameters {
            random_seed: self.seed.unwrap_or(defaults.random_seed),
            population_size: self.population_size,
            runtime: self.generations,
            initial_weights: self.initial_weights.clone(),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            dpi: self.output.dpi,
            shorten_edges: self.shorten_edges,
            annotate: self.annotate,
            ..RenderOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(config: &ChainsConfig) {
        assert!(
            matches!(config.validate(), Err(ChainsError::InvalidParameter(_))),
            "{config:?} should be rejected"
        );
    }

    #[test]
    fn test_default_is_valid() {
        let config = ChainsConfig::default();
        config.validate().unwrap();
        assert_eq!(config.output.path, PathBuf::from("img/chains.png"));
        assert_eq!(config.output.dpi, 300);
        assert_eq!(config.output.mode, OutputMode::Save);
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert_invalid(&ChainsConfig {
            population_size: 0,
            ..ChainsConfig::default()
        });
        assert_invalid(&ChainsConfig {
            generations: 0,
            ..ChainsConfig::default()
        });
        let mut config = ChainsConfig::default();
        config.output.dpi = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_rejects_bad_alphabet() {
        assert_invalid(&ChainsConfig {
            traits: vec![],
            ..ChainsConfig::default()
        });
        assert_invalid(&ChainsConfig {
            traits: vec!["A".into(), "B".into(), "C".into()],
            ..ChainsConfig::default()
        });
        assert_invalid(&ChainsConfig {
            reference_trait: "C".into(),
            ..ChainsConfig::default()
        });
    }

    #[test]
    fn test_rejects_bad_colors() {
        let mut config = ChainsConfig::default();
        config.colors.insert("C".into(), "red".into());
        assert_invalid(&config);

        let mut config = ChainsConfig::default();
        config.colors.remove("B");
        assert_invalid(&config);

        let mut config = ChainsConfig::default();
        config.colors.insert("A".into(), "#12345".into());
        assert_invalid(&config);
    }

    #[test]
    fn test_rejects_bad_weights() {
        for weights in [vec![1.0], vec![0.0, 0.0], vec![-0.5, 1.5], vec![f64::INFINITY, 1.0]] {
            assert_invalid(&ChainsConfig {
                initial_weights: weights,
                ..ChainsConfig::default()
            });
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ChainsConfig::from_json_str(
            r##"{
                "population_size": 8,
                "seed": 12123,
                "colors": {"A": "#1f77b4", "B": "orange"},
                "output": {"dpi": 100}
            }"##,
        )
        .unwrap();
        assert_eq!(config.population_size, 8);
        assert_eq!(config.generations, 11);
        assert_eq!(config.seed, Some(12123));
        assert_eq!(config.output.dpi, 100);
        assert_eq!(config.output.path, PathBuf::from("img/chains.png"));
        config.validate().unwrap();
    }

    #[test]
    fn test_output_mode_names() {
        let config =
            ChainsConfig::from_json_str(r#"{"output": {"mode": "display"}}"#).unwrap();
        assert_eq!(config.output.mode, OutputMode::Display);
        assert!(ChainsConfig::from_json_str(r#"{"output": {"mode": "window"}}"#).is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ChainsConfig::from_json_str("{ population_size: 3"),
            Err(ChainsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let err = ChainsConfig::from_json_file(Path::new("/nonexistent/chains.json"));
        assert!(matches!(err, Err(ChainsError::Io { .. })));
    }

    #[test]
    fn test_rejects_oversized_figure() {
        assert_invalid(&ChainsConfig {
            population_size: 100,
            generations: 100,
            ..ChainsConfig::default()
        });
        let mut config = ChainsConfig {
            population_size: 100,
            generations: 100,
            ..ChainsConfig::default()
        };
        config.output.dpi = 20;
        config.validate().unwrap();
    }

    #[test]
    fn test_labels_with_whitespace_resolve_everywhere() {
        let config = ChainsConfig {
            traits: vec!["A ".into(), "B".into()],
            reference_trait: "A ".into(),
            colors: BTreeMap::from([
                ("A ".to_string(), "red".to_string()),
                ("B".to_string(), "blue".to_string()),
            ]),
            ..ChainsConfig::default()
        };
        config.validate().unwrap();
        let palette = config.palette().unwrap();
        assert_eq!(palette.color(0), plotters::style::RGBColor(255, 0, 0));

        let trimmed = ChainsConfig {
            reference_trait: "A".into(),
            ..config
        };
        assert_invalid(&trimmed);
    }

    #[test]
    fn test_absent_seed_is_drawn() {
        let config = ChainsConfig::default();
        let params = config.parameters();
        assert!(params.random_seed >= 1);
        assert_eq!(params.population_size, 5);
        assert_eq!(params.initial_weights, vec![0.5, 0.5]);
    }

    #[test]
    fn test_fixed_seed_is_used() {
        let config = ChainsConfig {
            seed: Some(12123),
            ..ChainsConfig::default()
        };
        assert_eq!(config.parameters().random_seed, 12123);
        assert_eq!(config.parameters().runtime, 11);
    }
}
