pub mod config;
pub mod error;
pub mod palette;
pub mod render;

use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::distr::weighted::WeightedIndex;
use rand::distr::{Distribution, Uniform};
use rand::prelude::*;
use rand::rngs::SmallRng;

pub use config::{ChainsConfig, OutputConfig, OutputMode};
pub use error::{ChainsError, Result};
pub use palette::Palette;
pub use render::{FigureLayout, RenderOptions};

/// Index of a trait label within an [`Alphabet`].
pub type TraitId = usize;

// ── Alphabet ──────────────────────────────────────────────────────────────────

/// The two trait labels a population can carry, in a fixed order. Labels
/// are kept exactly as given, whitespace included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alphabet {
    labels: [String; 2],
}

impl Alphabet {
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let [a, b] = labels else {
            return Err(ChainsError::invalid(format!(
                "trait alphabet must have exactly two labels, got {}",
                labels.len()
            )));
        };
        let (a, b) = (a.as_ref(), b.as_ref());
        if a.trim().is_empty() || b.trim().is_empty() {
            return Err(ChainsError::invalid("trait labels must not be empty"));
        }
        if a == b {
            return Err(ChainsError::invalid(format!(
                "trait labels must be distinct, got '{a}' twice"
            )));
        }
        Ok(Self {
            labels: [a.to_string(), b.to_string()],
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, id: TraitId) -> &str {
        &self.labels[id]
    }

    /// Looks a trait up by its label, never by position.
    pub fn id_of(&self, label: &str) -> Result<TraitId> {
        self.labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| {
                ChainsError::invalid(format!(
                    "unknown trait '{label}' (alphabet is {:?})",
                    self.labels
                ))
            })
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self {
            labels: ["A".to_string(), "B".to_string()],
        }
    }
}

// ── Population ────────────────────────────────────────────────────────────────

/// Trait ids of every individual, indexed by slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Population {
    pub traits: Vec<TraitId>,
}

impl Population {
    pub fn new(traits: Vec<TraitId>) -> Self {
        Self { traits }
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    pub fn count(&self, id: TraitId) -> usize {
        self.traits.iter().filter(|&&t| t == id).count()
    }
}

/// Parent slot at `t - 1` copied into `target` at `t`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransmissionEdge {
    pub source: usize,
    pub target: usize,
}

#[derive(Clone, Debug)]
pub struct GenerationRecord {
    pub generation: usize,
    pub population: Population,
    /// Proportion of the reference trait in `population`.
    pub proportion: f64,
    /// Edges that produced `population`; empty for generation 0.
    pub edges: Vec<TransmissionEdge>,
}

/// Everything a finished run produced, ready for rendering.
pub struct History {
    pub alphabet: Alphabet,
    pub reference: TraitId,
    pub random_seed: u64,
    pub records: Vec<GenerationRecord>,
}

impl History {
    pub fn population_size(&self) -> usize {
        self.records.first().map_or(0, |r| r.population.len())
    }

    pub fn generations(&self) -> usize {
        self.records.len()
    }

    pub fn proportions(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.proportion).collect()
    }
}

// ── Sampling ──────────────────────────────────────────────────────────────────

/// Draws `n` individuals independently, trait `i` with probability
/// `weights[i] / sum(weights)`.
pub fn initial_population<R: Rng + ?Sized>(
    alphabet: &Alphabet,
    n: usize,
    weights: &[f64],
    rng: &mut R,
) -> Result<Population> {
    if n == 0 {
        return Err(ChainsError::invalid("population size must be positive"));
    }
    if weights.len() != alphabet.len() {
        return Err(ChainsError::invalid(format!(
            "expected {} initial weights, got {}",
            alphabet.len(),
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(ChainsError::invalid("initial weights must be finite"));
    }
    let dist = WeightedIndex::new(weights)
        .map_err(|e| ChainsError::invalid(format!("initial weights {weights:?}: {e}")))?;
    Ok(Population::new((0..n).map(|_| dist.sample(rng)).collect()))
}

/// One Wright-Fisher transition: every slot picks a uniform parent slot with
/// replacement and inherits its trait.
pub fn resample<R: Rng + ?Sized>(
    population: &Population,
    rng: &mut R,
) -> (Population, Vec<TransmissionEdge>) {
    let n = population.len();
    let Ok(uniform_parent) = Uniform::new(0usize, n) else {
        return (Population::default(), Vec::new());
    };
    let edges: Vec<TransmissionEdge> = (0..n)
        .map(|target| TransmissionEdge {
            source: uniform_parent.sample(rng),
            target,
        })
        .collect();
    let traits = edges.iter().map(|e| population.traits[e.source]).collect();
    (Population::new(traits), edges)
}

/// Fraction of `population` carrying `id`. An empty population is an error.
pub fn proportion(population: &Population, id: TraitId) -> Result<f64> {
    if population.is_empty() {
        return Err(ChainsError::invalid(
            "cannot compute a trait proportion of an empty population",
        ));
    }
    Ok(population.count(id) as f64 / population.len() as f64)
}

// ── Parameters ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct Parameters {
    pub random_seed: u64,
    pub population_size: usize,
    /// Number of generations including the initial one.
    pub runtime: usize,
    pub initial_weights: Vec<f64>,
}

impl Default for Parameters {
    fn default() -> Self {
        let mut rng = rand::rng();
        let random_seed = rng.random_range(1..u64::MAX);
        Self {
            random_seed,
            population_size: 5,
            runtime: 11,
            initial_weights: vec![0.5, 0.5],
        }
    }
}

// ── Tracker trait ─────────────────────────────────────────────────────────────

/// Trait for recording per-generation results.
pub trait TrackerTrait {
    /// Called once for generation 0 and after every transition.
    fn record_generation(&mut self, sim: &DriftSimulator, record: GenerationRecord) -> Result<()>;
    /// Called once at the end of the simulation.
    fn finalize(&mut self, sim: &DriftSimulator) -> Result<()>;
}

/// Default implementation that just collects all records.
pub struct SimpleTracker {
    pub records: Vec<GenerationRecord>,
}

impl Default for SimpleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleTracker {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl TrackerTrait for SimpleTracker {
    fn record_generation(
        &mut self,
        _sim: &DriftSimulator,
        record: GenerationRecord,
    ) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn finalize(&mut self, _sim: &DriftSimulator) -> Result<()> {
        Ok(())
    }
}

// ── Simulator ─────────────────────────────────────────────────────────────────
pub struct DriftSimulator {
    pub params: Parameters,
    pub alphabet: Alphabet,
    /// Trait whose proportion is tracked.
    pub reference: TraitId,
    pub rng: SmallRng,
    pub population: Population,
    /// Generation index of `population`.
    pub generation: usize,
}

impl DriftSimulator {
    // ── Construction ──────────────────────────────────────────────────────────

    pub fn initialize(params: Parameters, alphabet: Alphabet, reference: &str) -> Result<Self> {
        if params.runtime == 0 {
            return Err(ChainsError::invalid("number of generations must be positive"));
        }
        let reference = alphabet.id_of(reference)?;
        let mut rng = SmallRng::seed_from_u64(params.random_seed);
        let population = initial_population(
            &alphabet,
            params.population_size,
            &params.initial_weights,
            &mut rng,
        )?;
        log::debug!("initial population: {:?}", population.traits);

        Ok(Self {
            params,
            alphabet,
            reference,
            rng,
            population,
            generation: 0,
        })
    }

    pub fn reference_proportion(&self) -> Result<f64> {
        proportion(&self.population, self.reference)
    }

    // ── Generation loop ───────────────────────────────────────────────────────

    pub fn step(&mut self, tracker: &mut dyn TrackerTrait) -> Result<()> {
        let before = self.reference_proportion()?;
        let (population, edges) = resample(&self.population, &mut self.rng);
        self.population = population;
        self.generation += 1;

        let p = self.reference_proportion()?;
        log::debug!("generation {}: p = {p:.3}", self.generation);
        if (p == 0.0 || p == 1.0) && p != before {
            log::debug!(
                "trait '{}' {} at generation {}",
                self.alphabet.label(self.reference),
                if p == 1.0 { "fixed" } else { "lost" },
                self.generation
            );
        }

        tracker.record_generation(
            self,
            GenerationRecord {
                generation: self.generation,
                population: self.population.clone(),
                proportion: p,
                edges,
            },
        )
    }

    pub fn run(&mut self, tracker: &mut dyn TrackerTrait) -> Result<()> {
        tracker.record_generation(
            self,
            GenerationRecord {
                generation: self.generation,
                population: self.population.clone(),
                proportion: self.reference_proportion()?,
                edges: Vec::new(),
            },
        )?;
        let transitions = self.params.runtime - 1;
        let bar = ProgressBar::new(transitions as u64);
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7}")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        for _ in 0..transitions {
            bar.inc(1);
            self.step(tracker)?;
        }
        bar.finish_and_clear();
        tracker.finalize(self)
    }

    /// Runs all generations and packages the records for rendering.
    pub fn finalize(mut self) -> Result<History> {
        let mut tracker = SimpleTracker::new();
        self.run(&mut tracker)?;
        Ok(History {
            alphabet: self.alphabet,
            reference: self.reference,
            random_seed: self.params.random_seed,
            records: tracker.records,
        })
    }
}

/// Validates `config`, then simulates it.
pub fn simulate(config: &ChainsConfig) -> Result<History> {
    config.validate()?;
    let params = config.parameters();
    log::info!(
        "simulating N = {} for {} generations (seed {})",
        params.population_size,
        params.runtime,
        params.random_seed
    );
    let alphabet = Alphabet::new(&config.traits)?;
    DriftSimulator::initialize(params, alphabet, &config.reference_trait)?.finalize()
}
