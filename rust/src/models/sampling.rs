//! Per-state sampling tables derived from a transition matrix.
//!
//! For every state we keep the states it can reach with non-zero
//! probability and the running sum of those probabilities. Picking the next
//! state is then a binary search over the running sums instead of a scan of
//! all N states.

use crate::matrix::TransitionMatrix;

/// Reachable states of one row and their cumulative probabilities.
#[derive(Clone, Debug, PartialEq)]
pub struct RowSampler {
    states: Vec<usize>,
    cumulative: Vec<f64>,
}

impl RowSampler {
    fn from_row(states: &[usize], probabilities: &[f64]) -> Self {
        let mut running = 0.0;
        let cumulative = probabilities
            .iter()
            .map(|&p| {
                running += p;
                running
            })
            .collect();
        Self {
            states: states.to_vec(),
            cumulative,
        }
    }

    /// Next state for a uniform draw `u` in `[0, 1)`.
    ///
    /// Picks the first position whose cumulative probability is `>= u`.
    /// A draw above the final cumulative value (row sum a hair under 1)
    /// lands on the last reachable state.
    #[inline]
    pub fn sample(&self, u: f64) -> usize {
        let position = self.cumulative.partition_point(|&c| c < u);
        self.states[position.min(self.states.len() - 1)]
    }

    pub fn states(&self) -> &[usize] {
        &self.states
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }
}

/// Sampling structure for a whole chain. Rebuilt, never stored.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingTable {
    rows: Vec<RowSampler>,
}

impl SamplingTable {
    pub fn new(matrix: &TransitionMatrix) -> Self {
        let rows = (0..matrix.n_states())
            .map(|state| {
                let (states, probabilities) = matrix.row(state);
                RowSampler::from_row(states, probabilities)
            })
            .collect();
        Self { rows }
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn row(&self, state: usize) -> &RowSampler {
        &self.rows[state]
    }

    /// One transition out of `state` driven by the draw `u`.
    #[inline]
    pub fn step(&self, state: usize, u: f64) -> usize {
        self.rows[state].sample(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn table() -> SamplingTable {
        let t = TransitionMatrix::from_matrix(array![
            [0.75, 0.2, 0.05],
            [0.0, 0.0, 1.0],
            [0.5, 0.0, 0.5]
        ])
        .unwrap();
        SamplingTable::new(&t)
    }

    #[test]
    fn test_rows_skip_unreachable_states() {
        let table = table();
        assert_eq!(table.n_states(), 3);
        assert_eq!(table.row(1).states(), &[2]);
        assert_eq!(table.row(2).states(), &[0, 2]);
        assert_eq!(table.row(2).cumulative(), &[0.5, 1.0]);
    }

    #[test]
    fn test_cumulative_is_running_sum() {
        let row = table().row(0).clone();
        assert_eq!(row.states(), &[0, 1, 2]);
        assert!((row.cumulative()[0] - 0.75).abs() < 1e-12);
        assert!((row.cumulative()[1] - 0.95).abs() < 1e-12);
        assert!((row.cumulative()[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_boundaries() {
        let table = table();
        assert_eq!(table.step(0, 0.0), 0);
        assert_eq!(table.step(0, 0.75), 0);
        assert_eq!(table.step(0, 0.7500001), 1);
        assert_eq!(table.step(0, 0.9), 1);
        assert_eq!(table.step(0, 0.99), 2);
        assert_eq!(table.step(1, 0.3), 2);
    }

    #[test]
    fn test_draw_past_last_cumulative_is_clamped() {
        let row = RowSampler::from_row(&[4, 7], &[0.5, 0.5 - 1e-10]);
        assert_eq!(row.sample(0.9999999999999), 7);
    }
}
