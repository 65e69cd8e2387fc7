//! Backmappers and the per-model registry that names them.
//!
//! A backmapper turns an abstract state into a coordinate vector
//! (progress coordinates, atomic positions, ...). Models keep any number of
//! them under unique names; `"default"` is used when no name is given.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::base::AbstractState;
use crate::error::{SynthError, SynthResult};

/// Registry name used when no backmapper is specified.
pub const DEFAULT_BACKMAPPER: &str = "default";

/// Maps abstract states to domain coordinates.
pub trait Backmapper<S>: Send + Sync + fmt::Debug {
    fn backmap(&self, state: &S) -> SynthResult<Array1<f64>>;

    /// Map a whole trajectory into a `(frames, dim)` array.
    ///
    /// Every state must map to the same number of coordinates.
    fn backmap_trajectory(&self, trajectory: &[S]) -> SynthResult<Array2<f64>> {
        stack_frames(trajectory.iter().map(|state| self.backmap(state)))
    }

    /// Persistable description of this backmapper, if it has one.
    fn stored(&self) -> Option<StoredBackmapper> {
        None
    }
}

/// Stack per-frame coordinate vectors into rows of a matrix.
pub(crate) fn stack_frames(
    frames: impl Iterator<Item = SynthResult<Array1<f64>>>,
) -> SynthResult<Array2<f64>> {
    let mut width: Option<usize> = None;
    let mut n_frames = 0;
    let mut flat = Vec::new();
    for frame in frames {
        let frame = frame?;
        match width {
            None => width = Some(frame.len()),
            Some(w) if w != frame.len() => {
                return Err(SynthError::Backmap(format!(
                    "frame {n_frames} has {} coordinates, previous frames have {w}",
                    frame.len()
                )));
            }
            Some(_) => {}
        }
        flat.extend(frame.iter().copied());
        n_frames += 1;
    }
    Array2::from_shape_vec((n_frames, width.unwrap_or(0)), flat)
        .map_err(|err| SynthError::Backmap(err.to_string()))
}

/// Returns each state's own coordinates (the state index for discrete models).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Identity;

impl<S: AbstractState> Backmapper<S> for Identity {
    fn backmap(&self, state: &S) -> SynthResult<Array1<f64>> {
        Ok(state.to_coordinates())
    }

    fn stored(&self) -> Option<StoredBackmapper> {
        Some(StoredBackmapper::Identity)
    }
}

/// Lookup table: row `i` holds the coordinates of discrete state `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct StateTable {
    coordinates: Array2<f64>,
}

impl StateTable {
    pub fn new(coordinates: Array2<f64>) -> Self {
        Self { coordinates }
    }

    /// Build from one coordinate row per state. Rows must share a length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> SynthResult<Self> {
        let coordinates = stack_frames(rows.into_iter().map(|row| Ok::<_, SynthError>(Array1::from(row))))?;
        Ok(Self { coordinates })
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.coordinates.nrows()
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.coordinates.ncols()
    }

    pub fn coordinates(&self) -> &Array2<f64> {
        &self.coordinates
    }

    fn check(&self, state: usize) -> SynthResult<()> {
        if state >= self.n_states() {
            return Err(SynthError::Backmap(format!(
                "state {state} has no row in a {}-state table",
                self.n_states()
            )));
        }
        Ok(())
    }
}

impl Backmapper<usize> for StateTable {
    fn backmap(&self, state: &usize) -> SynthResult<Array1<f64>> {
        self.check(*state)?;
        Ok(self.coordinates.row(*state).to_owned())
    }

    fn backmap_trajectory(&self, trajectory: &[usize]) -> SynthResult<Array2<f64>> {
        for &state in trajectory {
            self.check(state)?;
        }
        Ok(self.coordinates.select(Axis(0), trajectory))
    }

    fn stored(&self) -> Option<StoredBackmapper> {
        Some(StoredBackmapper::Table(self.coordinates.clone()))
    }
}

/// Backmapper backed by a closure.
///
/// Closures have no stored form, so a model holding one cannot be
/// serialized until it is removed.
pub struct FnBackmapper<S, F> {
    map: F,
    _state: PhantomData<fn(&S)>,
}

impl<S, F> FnBackmapper<S, F>
where
    F: Fn(&S) -> Array1<f64>,
{
    pub fn new(map: F) -> Self {
        Self {
            map,
            _state: PhantomData,
        }
    }
}

impl<S, F> fmt::Debug for FnBackmapper<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnBackmapper")
    }
}

impl<S, F> Backmapper<S> for FnBackmapper<S, F>
where
    F: Fn(&S) -> Array1<f64> + Send + Sync,
{
    fn backmap(&self, state: &S) -> SynthResult<Array1<f64>> {
        Ok((self.map)(state))
    }
}

/// Persisted form of a backmapper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoredBackmapper {
    Identity,
    Table(Array2<f64>),
}

impl StoredBackmapper {
    /// Rebuild a backmapper for discrete (index) states.
    pub fn into_backmapper(self) -> Arc<dyn Backmapper<usize>> {
        match self {
            StoredBackmapper::Identity => Arc::new(Identity),
            StoredBackmapper::Table(coordinates) => Arc::new(StateTable::new(coordinates)),
        }
    }
}

/// Named backmappers owned by one model.
pub struct BackmapperRegistry<S> {
    entries: BTreeMap<String, Arc<dyn Backmapper<S>>>,
}

impl<S> Default for BackmapperRegistry<S> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<S> Clone for BackmapperRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<S> fmt::Debug for BackmapperRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<S> BackmapperRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `backmapper` as `"default"`.
    pub fn with_default(backmapper: Arc<dyn Backmapper<S>>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(DEFAULT_BACKMAPPER.to_string(), backmapper);
        Self { entries }
    }

    pub fn add(&mut self, name: &str, backmapper: Arc<dyn Backmapper<S>>) -> SynthResult<()> {
        if self.entries.contains_key(name) {
            return Err(SynthError::DuplicateBackmapper(name.to_string()));
        }
        self.entries.insert(name.to_string(), backmapper);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> SynthResult<Arc<dyn Backmapper<S>>> {
        self.entries
            .remove(name)
            .ok_or_else(|| SynthError::MissingBackmapper(name.to_string()))
    }

    pub fn get(&self, name: &str) -> SynthResult<Arc<dyn Backmapper<S>>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| SynthError::MissingBackmapper(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored form of every entry; fails on the first one without one.
    pub fn to_stored(&self) -> SynthResult<BTreeMap<String, StoredBackmapper>> {
        self.entries
            .iter()
            .map(|(name, backmapper)| {
                backmapper
                    .stored()
                    .map(|stored| (name.clone(), stored))
                    .ok_or_else(|| SynthError::NotPersistable(name.clone()))
            })
            .collect()
    }
}

impl BackmapperRegistry<usize> {
    pub fn from_stored(stored: BTreeMap<String, StoredBackmapper>) -> Self {
        Self {
            entries: stored
                .into_iter()
                .map(|(name, entry)| (name, entry.into_backmapper()))
                .collect(),
        }
    }
}
