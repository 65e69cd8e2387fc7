//! Discrete-time Markov chain trajectory generator.
//!
//! Each trajectory starts at a caller-supplied state and advances one
//! transition per step by searching the current state's cumulative
//! distribution with a uniform draw. All draws for a trajectory are taken
//! before it is walked.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::vec;

use ndarray::{Array2, Array3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::backmapper::{Backmapper, BackmapperRegistry, StoredBackmapper};
use super::base::{BackmapperSelection, DynamicsModel, PersistentModel};
use super::sampling::SamplingTable;
use crate::config::{GeneratorConfig, LoadOptions, Reseed};
use crate::error::{SynthError, SynthResult};
use crate::logging::ModelLogger;
use crate::matrix::{CsrMatrix, TransitionMatrix};

/// Per-request options for [`MarkovGenerator`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Absorbing states. A trajectory stops right after entering one, so it
    /// can be shorter than the requested length.
    pub target: Option<HashSet<usize>>,
}

impl GenerationOptions {
    pub fn until(target: impl IntoIterator<Item = usize>) -> Self {
        Self {
            target: Some(target.into_iter().collect()),
        }
    }
}

/// Markov chain model over states `0..n_states`.
#[derive(Clone, Debug)]
pub struct MarkovGenerator {
    transition_matrix: TransitionMatrix,
    sampling: SamplingTable,
    rng: ChaCha8Rng,
    seed: u64,
    backmappers: BackmapperRegistry<usize>,
    logger: ModelLogger,
}

impl MarkovGenerator {
    /// Build a generator with default configuration.
    ///
    /// # Arguments
    /// * `transition_matrix` - Row-stochastic N×N matrix, dense or CSR
    /// * `default_backmapper` - Registered as `"default"`
    /// * `seed` - RNG seed; `None` draws one from OS entropy
    pub fn new(
        transition_matrix: impl Into<CsrMatrix>,
        default_backmapper: Arc<dyn Backmapper<usize>>,
        seed: Option<u64>,
    ) -> SynthResult<Self> {
        let config = GeneratorConfig {
            seed,
            ..GeneratorConfig::default()
        };
        Self::with_config(transition_matrix, default_backmapper, &config)
    }

    /// Build a generator from an explicit [`GeneratorConfig`].
    ///
    /// The config and the matrix are validated before anything else is
    /// created.
    pub fn with_config(
        transition_matrix: impl Into<CsrMatrix>,
        default_backmapper: Arc<dyn Backmapper<usize>>,
        config: &GeneratorConfig,
    ) -> SynthResult<Self> {
        config.validate()?;
        let transition_matrix = TransitionMatrix::new(transition_matrix, config.row_sum_tolerance)?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let logger = if config.logging {
            ModelLogger::new(config.log_target.clone())
        } else {
            ModelLogger::disabled()
        };

        let model = Self::assemble(
            transition_matrix,
            ChaCha8Rng::seed_from_u64(seed),
            seed,
            BackmapperRegistry::with_default(default_backmapper),
            logger,
        );
        model.logger.info(format_args!(
            "Created Markov generator with {} states",
            model.n_states()
        ));
        model.logger.debug(format_args!(
            "{} stored transitions, seed {}",
            model.transition_matrix.csr().nnz(),
            seed
        ));
        Ok(model)
    }

    fn assemble(
        transition_matrix: TransitionMatrix,
        rng: ChaCha8Rng,
        seed: u64,
        backmappers: BackmapperRegistry<usize>,
        logger: ModelLogger,
    ) -> Self {
        let sampling = SamplingTable::new(&transition_matrix);
        Self {
            transition_matrix,
            sampling,
            rng,
            seed,
            backmappers,
            logger,
        }
    }

    /// Replace the log handle.
    pub fn with_logger(mut self, logger: ModelLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &ModelLogger {
        &self.logger
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.transition_matrix.n_states()
    }

    pub fn transition_matrix(&self) -> &TransitionMatrix {
        &self.transition_matrix
    }

    pub fn sampling_table(&self) -> &SamplingTable {
        &self.sampling
    }

    /// Seed the current random stream was started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restart the random stream. Returns the seed actually used.
    pub fn reseed(&mut self, seed: Option<u64>) -> u64 {
        let seed = seed.unwrap_or_else(rand::random);
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.seed = seed;
        self.logger.debug(format_args!("Reseeded Markov generator with {seed}"));
        seed
    }

    /// Apply the reseeding policy chosen at load time.
    pub fn apply_load_options(&mut self, options: &LoadOptions) {
        match options.reseed {
            Reseed::Preserve => {}
            Reseed::Seed(seed) => {
                self.reseed(Some(seed));
            }
            Reseed::Entropy => {
                self.reseed(None);
            }
        }
    }

    fn check_state(&self, state: usize, role: &str) -> SynthResult<()> {
        let n = self.n_states();
        if state >= n {
            return Err(SynthError::Bounds(format!(
                "{role} state {state} outside a {n}-state chain"
            )));
        }
        Ok(())
    }

    /// Lazily generate one raw trajectory per initial state.
    ///
    /// Fails with [`SynthError::Bounds`] when `length` is zero or when an
    /// initial or target state is outside `[0, n_states)`. Nothing is drawn
    /// from the random stream in that case.
    pub fn unmapped_trajectories(
        &mut self,
        length: usize,
        initial_states: &[usize],
        options: GenerationOptions,
    ) -> SynthResult<UnmappedTrajectories<'_>> {
        if length == 0 {
            return Err(SynthError::Bounds("trajectory length must be at least 1".into()));
        }
        for &state in initial_states {
            self.check_state(state, "initial")?;
        }
        if let Some(target) = &options.target {
            for &state in target {
                self.check_state(state, "target")?;
            }
        }

        self.logger.debug(format_args!(
            "Generating {} trajectories of length {}",
            initial_states.len(),
            length
        ));

        Ok(UnmappedTrajectories {
            sampling: &self.sampling,
            rng: &mut self.rng,
            initial_states: initial_states.to_vec().into_iter(),
            length,
            target: options.target,
        })
    }

    /// Advance a batch of states `n_steps - 1` transitions.
    ///
    /// Row `i` of the result is the full trajectory of `initial_states[i]`,
    /// starting state included, so the shape is `(batch, n_steps)`.
    pub fn propagate(&mut self, initial_states: &[usize], n_steps: usize) -> SynthResult<Array2<usize>> {
        let flat: Vec<usize> = self
            .unmapped_trajectories(n_steps, initial_states, GenerationOptions::default())?
            .flatten()
            .collect();
        Array2::from_shape_vec((initial_states.len(), n_steps), flat)
            .map_err(|err| SynthError::Bounds(err.to_string()))
    }

    /// [`propagate`](Self::propagate) followed by backmapping every frame.
    ///
    /// Returns a `(batch, n_steps, dim)` array.
    pub fn propagate_coordinates(
        &mut self,
        initial_states: &[usize],
        n_steps: usize,
        selection: BackmapperSelection<'_>,
    ) -> SynthResult<Array3<f64>> {
        let backmapper = self.resolve_backmapper(selection)?;
        let states = self.propagate(initial_states, n_steps)?;

        let mut dim = None;
        let mut flat = Vec::new();
        for (i, row) in states.rows().into_iter().enumerate() {
            let frames = backmapper.backmap_trajectory(&row.to_vec())?;
            match dim {
                None => dim = Some(frames.ncols()),
                Some(d) if d != frames.ncols() => {
                    return Err(SynthError::Backmap(format!(
                        "trajectory {i} maps to {} coordinates, previous ones to {d}",
                        frames.ncols()
                    )));
                }
                Some(_) => {}
            }
            flat.extend(frames.iter().copied());
        }

        Array3::from_shape_vec((initial_states.len(), n_steps, dim.unwrap_or(0)), flat)
            .map_err(|err| SynthError::Backmap(err.to_string()))
    }
}

/// Lazy stream of raw trajectories borrowed from a [`MarkovGenerator`].
///
/// Randomness is consumed only as trajectories are pulled, in input order.
pub struct UnmappedTrajectories<'a> {
    sampling: &'a SamplingTable,
    rng: &'a mut ChaCha8Rng,
    initial_states: vec::IntoIter<usize>,
    length: usize,
    target: Option<HashSet<usize>>,
}

impl Iterator for UnmappedTrajectories<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let initial = self.initial_states.next()?;
        let draws: Vec<f64> = (1..self.length).map(|_| self.rng.gen::<f64>()).collect();

        let mut trajectory = Vec::with_capacity(self.length);
        trajectory.push(initial);
        let mut state = initial;
        for u in draws {
            state = self.sampling.step(state, u);
            trajectory.push(state);
            if self.target.as_ref().map_or(false, |t| t.contains(&state)) {
                break;
            }
        }
        Some(trajectory)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.initial_states.size_hint()
    }
}

impl ExactSizeIterator for UnmappedTrajectories<'_> {}

impl DynamicsModel for MarkovGenerator {
    type State = usize;
    type Options = GenerationOptions;

    fn backmappers(&self) -> &BackmapperRegistry<usize> {
        &self.backmappers
    }

    fn backmappers_mut(&mut self) -> &mut BackmapperRegistry<usize> {
        &mut self.backmappers
    }

    fn generate_unmapped_trajectories<'a>(
        &'a mut self,
        length: usize,
        initial_states: &[usize],
        options: GenerationOptions,
    ) -> SynthResult<Box<dyn Iterator<Item = Vec<usize>> + 'a>> {
        Ok(Box::new(self.unmapped_trajectories(length, initial_states, options)?))
    }
}

/// Persisted form of a [`MarkovGenerator`].
///
/// The sampling table is left out and rebuilt on load. The logger is not
/// stored either.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredMarkov {
    pub transition_matrix: CsrMatrix,
    pub row_sum_tolerance: f64,
    pub seed: u64,
    pub rng: ChaCha8Rng,
    pub backmappers: BTreeMap<String, StoredBackmapper>,
}

impl PersistentModel for MarkovGenerator {
    const KIND: &'static str = "markov";
    type Stored = StoredMarkov;

    fn to_stored(&self) -> SynthResult<StoredMarkov> {
        Ok(StoredMarkov {
            transition_matrix: self.transition_matrix.csr().clone(),
            row_sum_tolerance: self.transition_matrix.tolerance(),
            seed: self.seed,
            rng: self.rng.clone(),
            backmappers: self.backmappers.to_stored()?,
        })
    }

    fn from_stored(stored: StoredMarkov) -> SynthResult<Self> {
        let transition_matrix = TransitionMatrix::new(stored.transition_matrix, stored.row_sum_tolerance)?;
        let model = Self::assemble(
            transition_matrix,
            stored.rng,
            stored.seed,
            BackmapperRegistry::from_stored(stored.backmappers),
            ModelLogger::default(),
        );
        model.logger.info(format_args!(
            "Loaded Markov generator with {} states",
            model.n_states()
        ));
        Ok(model)
    }
}
