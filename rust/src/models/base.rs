//! Contract shared by every dynamics model.
//!
//! A model only has to produce raw state trajectories
//! ([`DynamicsModel::generate_unmapped_trajectories`]); backmapper
//! bookkeeping and lazy mapping of those trajectories into coordinates are
//! provided on top of it. [`PersistentModel`] adds the binary round-trip.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::backmapper::{Backmapper, BackmapperRegistry, Identity, DEFAULT_BACKMAPPER};
use crate::error::{SynthError, SynthResult};
use crate::persistence;

/// A state a dynamics model evolves.
///
/// Discrete models use `usize` indices; continuous ones can use coordinate
/// vectors directly. [`to_coordinates`](AbstractState::to_coordinates) is what
/// the identity backmapper returns.
pub trait AbstractState: Clone + fmt::Debug + Send + Sync + 'static {
    fn to_coordinates(&self) -> Array1<f64>;
}

impl AbstractState for usize {
    fn to_coordinates(&self) -> Array1<f64> {
        Array1::from_elem(1, *self as f64)
    }
}

impl AbstractState for Array1<f64> {
    fn to_coordinates(&self) -> Array1<f64> {
        self.clone()
    }
}

/// Which backmapper to apply to generated states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackmapperSelection<'a> {
    /// The entry registered as `"default"`.
    #[default]
    Default,
    Named(&'a str),
    /// Skip the registry and return raw states as coordinates.
    Identity,
}

impl<'a> From<&'a str> for BackmapperSelection<'a> {
    fn from(name: &'a str) -> Self {
        BackmapperSelection::Named(name)
    }
}

impl<'a> From<Option<&'a str>> for BackmapperSelection<'a> {
    fn from(name: Option<&'a str>) -> Self {
        name.map_or(BackmapperSelection::Default, BackmapperSelection::Named)
    }
}

/// Raw trajectories streamed through one backmapper.
///
/// Each trajectory is generated and mapped only when `next` is called.
/// Output order follows the order of the initial states.
pub struct MappedTrajectories<'a, S> {
    raw: Box<dyn Iterator<Item = Vec<S>> + 'a>,
    backmapper: Arc<dyn Backmapper<S>>,
}

impl<'a, S> MappedTrajectories<'a, S> {
    pub fn new(raw: Box<dyn Iterator<Item = Vec<S>> + 'a>, backmapper: Arc<dyn Backmapper<S>>) -> Self {
        Self { raw, backmapper }
    }
}

impl<S> Iterator for MappedTrajectories<'_, S> {
    type Item = SynthResult<Array2<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        let trajectory = self.raw.next()?;
        Some(self.backmapper.backmap_trajectory(&trajectory))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

/// A stochastic or deterministic generator of state trajectories.
pub trait DynamicsModel {
    type State: AbstractState;
    /// Model-specific generation options (e.g. termination criteria).
    type Options: Default;

    fn backmappers(&self) -> &BackmapperRegistry<Self::State>;

    fn backmappers_mut(&mut self) -> &mut BackmapperRegistry<Self::State>;

    /// Produce one raw trajectory per initial state, in input order.
    ///
    /// Argument errors are reported here, before the first trajectory is
    /// generated. The returned iterator is finite and computes each
    /// trajectory on demand.
    fn generate_unmapped_trajectories<'a>(
        &'a mut self,
        length: usize,
        initial_states: &[Self::State],
        options: Self::Options,
    ) -> SynthResult<Box<dyn Iterator<Item = Vec<Self::State>> + 'a>>;

    /// Register `backmapper` under `name`. Fails if the name is taken.
    fn add_backmapper(
        &mut self,
        backmapper: Arc<dyn Backmapper<Self::State>>,
        name: &str,
    ) -> SynthResult<()> {
        self.backmappers_mut().add(name, backmapper)
    }

    fn remove_backmapper(&mut self, name: &str) -> SynthResult<Arc<dyn Backmapper<Self::State>>> {
        self.backmappers_mut().remove(name)
    }

    fn get_backmapper(&self, name: &str) -> SynthResult<Arc<dyn Backmapper<Self::State>>> {
        self.backmappers().get(name)
    }

    fn resolve_backmapper(
        &self,
        selection: BackmapperSelection<'_>,
    ) -> SynthResult<Arc<dyn Backmapper<Self::State>>> {
        match selection {
            BackmapperSelection::Default => self.get_backmapper(DEFAULT_BACKMAPPER),
            BackmapperSelection::Named(name) => self.get_backmapper(name),
            BackmapperSelection::Identity => Ok(Arc::new(Identity)),
        }
    }

    /// Map a single state to coordinates.
    fn backmap(
        &self,
        state: &Self::State,
        selection: BackmapperSelection<'_>,
    ) -> SynthResult<Array1<f64>> {
        self.resolve_backmapper(selection)?.backmap(state)
    }

    /// Lazily generate trajectories and map each one with `selection`.
    ///
    /// The backmapper is resolved before anything is generated, so an
    /// unknown name fails without consuming randomness.
    fn generate_trajectories<'a>(
        &'a mut self,
        length: usize,
        initial_states: &[Self::State],
        selection: BackmapperSelection<'_>,
        options: Self::Options,
    ) -> SynthResult<MappedTrajectories<'a, Self::State>> {
        let backmapper = self.resolve_backmapper(selection)?;
        let raw = self.generate_unmapped_trajectories(length, initial_states, options)?;
        Ok(MappedTrajectories::new(raw, backmapper))
    }

    /// Generate and map exactly one trajectory.
    fn generate_trajectory(
        &mut self,
        length: usize,
        initial_state: &Self::State,
        selection: BackmapperSelection<'_>,
        options: Self::Options,
    ) -> SynthResult<Array2<f64>> {
        let mut trajectories = self.generate_trajectories(
            length,
            std::slice::from_ref(initial_state),
            selection,
            options,
        )?;
        let first = trajectories.next();
        first.ok_or_else(|| SynthError::Bounds("model produced no trajectory".into()))?
    }
}

/// Binary round-trip for a model type.
///
/// `Stored` is the persisted form: everything needed to rebuild the model,
/// and nothing that can be derived again on load.
pub trait PersistentModel: Sized {
    /// Tag written into every blob and checked on decode.
    const KIND: &'static str;

    type Stored: Serialize + DeserializeOwned;

    fn to_stored(&self) -> SynthResult<Self::Stored>;

    fn from_stored(stored: Self::Stored) -> SynthResult<Self>;

    fn serialize(&self) -> SynthResult<Vec<u8>> {
        persistence::encode(Self::KIND, &self.to_stored()?)
    }

    /// Decode a blob. Fails with [`SynthError::TypeMismatch`] if it holds
    /// another kind of model.
    fn deserialize(bytes: &[u8]) -> SynthResult<Self> {
        Self::from_stored(persistence::decode(Self::KIND, bytes)?)
    }

    fn save(&self, path: impl AsRef<Path>) -> SynthResult<()> {
        persistence::write_file(path.as_ref(), &self.serialize()?)
    }

    fn load(path: impl AsRef<Path>) -> SynthResult<Self> {
        Self::deserialize(&persistence::read_file(path.as_ref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backmapper::FnBackmapper;
    use crate::models::MarkovGenerator;

    /// Continuous toy model: constant-velocity drift.
    struct Drift {
        velocity: f64,
        backmappers: BackmapperRegistry<Array1<f64>>,
    }

    impl Drift {
        fn new(velocity: f64) -> Self {
            Self {
                velocity,
                backmappers: BackmapperRegistry::<Array1<f64>>::with_default(Arc::new(Identity)),
            }
        }
    }

    impl DynamicsModel for Drift {
        type State = Array1<f64>;
        type Options = ();

        fn backmappers(&self) -> &BackmapperRegistry<Array1<f64>> {
            &self.backmappers
        }

        fn backmappers_mut(&mut self) -> &mut BackmapperRegistry<Array1<f64>> {
            &mut self.backmappers
        }

        fn generate_unmapped_trajectories<'a>(
            &'a mut self,
            length: usize,
            initial_states: &[Array1<f64>],
            _options: (),
        ) -> SynthResult<Box<dyn Iterator<Item = Vec<Array1<f64>>> + 'a>> {
            if length == 0 {
                return Err(SynthError::Bounds("length must be at least 1".into()));
            }
            let velocity = self.velocity;
            let starts = initial_states.to_vec();
            Ok(Box::new(starts.into_iter().map(move |x0| {
                (0..length)
                    .map(|k| &x0 + velocity * k as f64)
                    .collect::<Vec<_>>()
            })))
        }
    }

    impl PersistentModel for Drift {
        const KIND: &'static str = "drift";
        type Stored = f64;

        fn to_stored(&self) -> SynthResult<f64> {
            Ok(self.velocity)
        }

        fn from_stored(velocity: f64) -> SynthResult<Self> {
            Ok(Drift::new(velocity))
        }
    }

    #[test]
    fn test_continuous_model_uses_default_methods() {
        let mut model = Drift::new(0.5);
        let start = Array1::from(vec![1.0, -1.0]);
        let traj = model
            .generate_trajectory(3, &start, BackmapperSelection::Default, ())
            .unwrap();
        assert_eq!(traj.dim(), (3, 2));
        assert_eq!(traj.row(2).to_vec(), vec![2.0, 0.0]);
    }

    #[test]
    fn test_named_backmapper_applied_lazily() {
        let mut model = Drift::new(1.0);
        let norm = FnBackmapper::new(|x: &Array1<f64>| Array1::from_elem(1, x.dot(x).sqrt()));
        model.add_backmapper(Arc::new(norm), "norm").unwrap();

        let starts = vec![Array1::from(vec![3.0, 4.0]), Array1::from(vec![0.0, 0.0])];
        let mut trajs = model
            .generate_trajectories(2, &starts, "norm".into(), ())
            .unwrap();
        assert_eq!(trajs.size_hint(), (2, Some(2)));
        let first = trajs.next().unwrap().unwrap();
        assert!((first[[0, 0]] - 5.0).abs() < 1e-12);
        let second = trajs.next().unwrap().unwrap();
        assert!((second[[1, 0]] - 2.0f64.sqrt()).abs() < 1e-12);
        assert!(trajs.next().is_none());
    }

    #[test]
    fn test_unknown_selection_fails_before_generation() {
        let mut model = Drift::new(1.0);
        let err = model
            .generate_trajectories(2, &[Array1::zeros(1)], "missing".into(), ())
            .err()
            .unwrap();
        assert!(matches!(err, SynthError::MissingBackmapper(_)));
    }

    #[test]
    fn test_selection_from_option() {
        assert_eq!(BackmapperSelection::from(None), BackmapperSelection::Default);
        assert_eq!(
            BackmapperSelection::from(Some("full_coordinates")),
            BackmapperSelection::Named("full_coordinates")
        );
    }

    #[test]
    fn test_deserialize_rejects_other_model_kind() {
        let bytes = Drift::new(2.0).serialize().unwrap();
        match MarkovGenerator::deserialize(&bytes) {
            Err(SynthError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, MarkovGenerator::KIND);
                assert_eq!(found, "drift");
            }
            other => panic!("expected type mismatch, got {:?}", other.map(|_| ())),
        }
        let back = Drift::deserialize(&bytes).unwrap();
        assert_eq!(back.velocity, 2.0);
    }
}
