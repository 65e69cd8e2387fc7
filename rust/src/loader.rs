//! Entry points used by the ensemble integration layer to obtain a model.

use std::path::Path;

use crate::config::LoadOptions;
use crate::error::SynthResult;
use crate::models::{MarkovGenerator, PersistentModel};
use crate::persistence;

/// Load a saved Markov generator, continuing its stored random stream.
pub fn load_model(path: impl AsRef<Path>) -> SynthResult<MarkovGenerator> {
    load_model_with(path, &LoadOptions::default())
}

/// Load a saved Markov generator and apply `options` (e.g. reseeding).
pub fn load_model_with(path: impl AsRef<Path>, options: &LoadOptions) -> SynthResult<MarkovGenerator> {
    let mut model = MarkovGenerator::load(path)?;
    model.apply_load_options(options);
    Ok(model)
}

/// Kind tag of the model stored at `path`.
pub fn model_kind(path: impl AsRef<Path>) -> SynthResult<String> {
    persistence::peek_kind(&persistence::read_file(path.as_ref())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthError;
    use crate::models::{GenerationOptions, Identity};
    use ndarray::array;
    use std::sync::Arc;

    fn saved_model(dir: &Path) -> std::path::PathBuf {
        let chain = array![[0.5, 0.5], [0.1, 0.9]];
        let model = MarkovGenerator::new(chain, Arc::new(Identity), Some(12)).unwrap();
        let path = dir.join("chain.synd");
        model.save(&path).unwrap();
        path
    }

    #[test]
    fn test_load_model_preserves_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = saved_model(dir.path());
        assert_eq!(model_kind(&path).unwrap(), MarkovGenerator::KIND);

        let mut a = load_model(&path).unwrap();
        let mut b = load_model(&path).unwrap();
        assert_eq!(a.seed(), 12);
        assert_eq!(a.propagate(&[0, 1], 30).unwrap(), b.propagate(&[0, 1], 30).unwrap());
    }

    #[test]
    fn test_load_model_with_reseed() {
        let dir = tempfile::tempdir().unwrap();
        let path = saved_model(dir.path());
        let mut model = load_model_with(&path, &LoadOptions::reseeded(4)).unwrap();
        assert_eq!(model.seed(), 4);
        let traj = model
            .unmapped_trajectories(3, &[1], GenerationOptions::default())
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(traj.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model(dir.path().join("nope.synd")).unwrap_err();
        assert!(matches!(err, SynthError::Io(_)));
    }
}
