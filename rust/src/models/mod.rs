//! Dynamics models and the pieces they share.
//!
//! This module provides:
//! - DynamicsModel / PersistentModel: the contract every model satisfies
//! - Backmapper and BackmapperRegistry: named state-to-coordinate maps
//! - SamplingTable: per-state cumulative distributions for fast sampling
//! - MarkovGenerator: discrete-time Markov chain trajectories

pub mod backmapper;
pub mod base;
pub mod sampling;
pub mod markov;

pub use backmapper::{
    Backmapper,
    BackmapperRegistry,
    FnBackmapper,
    Identity,
    StateTable,
    StoredBackmapper,
    DEFAULT_BACKMAPPER,
};
pub use base::{AbstractState, BackmapperSelection, DynamicsModel, MappedTrajectories, PersistentModel};
pub use sampling::{RowSampler, SamplingTable};
pub use markov::{GenerationOptions, MarkovGenerator, StoredMarkov, UnmappedTrajectories};
