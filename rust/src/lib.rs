//! Synthetic trajectory generation from discrete Markov chains.
//!
//! A [`MarkovGenerator`] owns a row-stochastic transition matrix, samples
//! state trajectories from it and maps them to domain coordinates through
//! named backmappers. Models round-trip through a versioned binary format
//! so an ensemble driver can load them with [`load_model`].
//!
//! Python bindings are compiled with the `python` feature.

pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod matrix;
pub mod models;
pub mod persistence;

pub use config::{GeneratorConfig, LoadOptions, Reseed};
pub use error::{SynthError, SynthResult};
pub use loader::{load_model, load_model_with, model_kind};
pub use logging::ModelLogger;
pub use matrix::{CsrMatrix, TransitionMatrix};
pub use models::{
    AbstractState, Backmapper, BackmapperRegistry, BackmapperSelection, DynamicsModel,
    FnBackmapper, GenerationOptions, Identity, MarkovGenerator, PersistentModel, StateTable,
    DEFAULT_BACKMAPPER,
};

#[cfg(feature = "python")]
mod python {
    use std::sync::Arc;

    use numpy::{IntoPyArray, PyArray1, PyArray2, PyArray3, PyReadonlyArray2};
    use pyo3::exceptions::{PyIOError, PyIndexError, PyKeyError, PyTypeError, PyValueError};
    use pyo3::prelude::*;
    use pyo3::types::PyBytes;
    use pyo3::wrap_pyfunction;

    use crate::config::{GeneratorConfig, LoadOptions};
    use crate::error::SynthError;
    use crate::models::{
        Backmapper, BackmapperSelection, DynamicsModel, Identity, MarkovGenerator,
        PersistentModel, StateTable,
    };

    impl From<SynthError> for PyErr {
        fn from(err: SynthError) -> PyErr {
            let msg = err.to_string();
            match err {
                SynthError::DuplicateBackmapper(_) | SynthError::MissingBackmapper(_) => {
                    PyKeyError::new_err(msg)
                }
                SynthError::TypeMismatch { .. } => PyTypeError::new_err(msg),
                SynthError::Bounds(_) => PyIndexError::new_err(msg),
                SynthError::Io(_) => PyIOError::new_err(msg),
                _ => PyValueError::new_err(msg),
            }
        }
    }

    fn state_table(definitions: PyReadonlyArray2<f64>) -> Arc<dyn Backmapper<usize>> {
        Arc::new(StateTable::new(definitions.as_array().to_owned()))
    }

    /// Markov chain generator exposed to Python.
    #[pyclass(name = "MarkovGenerator")]
    struct PyMarkovGenerator {
        inner: MarkovGenerator,
    }

    #[pymethods]
    impl PyMarkovGenerator {
        /// Build from a dense transition matrix.
        ///
        /// # Arguments
        /// * `transition_matrix` - (n_states, n_states) row-stochastic matrix
        /// * `state_definitions` - Optional (n_states, dim) coordinates used as
        ///   the default backmapper; state indices are returned when omitted
        /// * `seed` - Optional RNG seed
        /// * `row_sum_tolerance` - Absolute tolerance on each row sum
        ///   (default 1e-8); loosen for single-precision input
        #[new]
        #[pyo3(signature = (transition_matrix, state_definitions=None, seed=None, row_sum_tolerance=None))]
        fn new(
            transition_matrix: PyReadonlyArray2<f64>,
            state_definitions: Option<PyReadonlyArray2<f64>>,
            seed: Option<u64>,
            row_sum_tolerance: Option<f64>,
        ) -> PyResult<Self> {
            let backmapper: Arc<dyn Backmapper<usize>> = match state_definitions {
                Some(definitions) => state_table(definitions),
                None => Arc::new(Identity),
            };
            let config = GeneratorConfig {
                seed,
                ..GeneratorConfig::default()
            }
            .with_row_sum_tolerance(row_sum_tolerance);
            let inner = MarkovGenerator::with_config(transition_matrix.as_array(), backmapper, &config)?;
            Ok(Self { inner })
        }

        #[getter]
        fn n_states(&self) -> usize {
            self.inner.n_states()
        }

        #[getter]
        fn seed(&self) -> u64 {
            self.inner.seed()
        }

        fn backmapper_names(&self) -> Vec<String> {
            self.inner.backmappers().names().map(str::to_string).collect()
        }

        fn add_state_table(&mut self, name: &str, state_definitions: PyReadonlyArray2<f64>) -> PyResult<()> {
            self.inner.add_backmapper(state_table(state_definitions), name)?;
            Ok(())
        }

        fn remove_backmapper(&mut self, name: &str) -> PyResult<()> {
            self.inner.remove_backmapper(name)?;
            Ok(())
        }

        #[pyo3(signature = (state_index, mapper_name=None))]
        fn backmap<'py>(
            &self,
            py: Python<'py>,
            state_index: usize,
            mapper_name: Option<&str>,
        ) -> PyResult<&'py PyArray1<f64>> {
            let coordinates = self.inner.backmap(&state_index, mapper_name.into())?;
            Ok(coordinates.into_pyarray(py))
        }

        /// Advance a batch of states; returns (batch, n_steps) state indices.
        fn generate_trajectory<'py>(
            &mut self,
            py: Python<'py>,
            initial_states: Vec<usize>,
            n_steps: usize,
        ) -> PyResult<&'py PyArray2<i64>> {
            let states = self.inner.propagate(&initial_states, n_steps)?;
            Ok(states.mapv(|s| s as i64).into_pyarray(py))
        }

        /// Advance a batch of states and backmap every frame.
        #[pyo3(signature = (initial_states, n_steps, mapper_name=None))]
        fn generate_coordinates<'py>(
            &mut self,
            py: Python<'py>,
            initial_states: Vec<usize>,
            n_steps: usize,
            mapper_name: Option<&str>,
        ) -> PyResult<&'py PyArray3<f64>> {
            let selection = BackmapperSelection::from(mapper_name);
            let coordinates = self
                .inner
                .propagate_coordinates(&initial_states, n_steps, selection)?;
            Ok(coordinates.into_pyarray(py))
        }

        #[pyo3(signature = (seed=None))]
        fn reseed(&mut self, seed: Option<u64>) -> u64 {
            self.inner.reseed(seed)
        }

        fn save(&self, path: &str) -> PyResult<()> {
            self.inner.save(path)?;
            Ok(())
        }

        fn serialize<'py>(&self, py: Python<'py>) -> PyResult<&'py PyBytes> {
            let bytes = self.inner.serialize()?;
            Ok(PyBytes::new(py, &bytes))
        }

        #[staticmethod]
        fn deserialize(data: &[u8]) -> PyResult<Self> {
            let inner = MarkovGenerator::deserialize(data)?;
            Ok(Self { inner })
        }
    }

    /// Load a saved generator.
    ///
    /// # Arguments
    /// * `path` - File written by `MarkovGenerator.save`
    /// * `reseed` - Restart the random stream from this seed instead of
    ///   continuing the stored one
    #[pyfunction]
    #[pyo3(signature = (path, reseed=None))]
    fn load_model(path: &str, reseed: Option<u64>) -> PyResult<PyMarkovGenerator> {
        let options = reseed.map_or_else(LoadOptions::default, LoadOptions::reseeded);
        let inner = crate::loader::load_model_with(path, &options)?;
        Ok(PyMarkovGenerator { inner })
    }

    /// Python module definition
    #[pymodule]
    fn synd_rust(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<PyMarkovGenerator>()?;
        m.add_function(wrap_pyfunction!(load_model, m)?)?;
        Ok(())
    }
}
