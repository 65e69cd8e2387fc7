//! Sparse row-oriented storage for transition matrices.
//!
//! [`CsrMatrix`] is a structurally checked compressed-sparse-row matrix with
//! no further meaning attached. [`TransitionMatrix`] wraps one and adds the
//! Markov-chain invariants: square, non-negative, finite, every row summing
//! to one within an absolute tolerance.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{SynthError, SynthResult};

/// Compressed sparse row matrix of `f64`.
///
/// Column indices within a row are kept sorted and unique, and explicit
/// zeros are dropped, so a row only lists states it can actually reach.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CsrParts", into = "CsrParts")]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

/// Raw CSR arrays as they appear on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct CsrParts {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl TryFrom<CsrParts> for CsrMatrix {
    type Error = SynthError;

    fn try_from(parts: CsrParts) -> SynthResult<Self> {
        CsrMatrix::try_new(
            parts.n_rows,
            parts.n_cols,
            parts.indptr,
            parts.indices,
            parts.data,
        )
    }
}

impl From<CsrMatrix> for CsrParts {
    fn from(m: CsrMatrix) -> Self {
        CsrParts {
            n_rows: m.n_rows,
            n_cols: m.n_cols,
            indptr: m.indptr,
            indices: m.indices,
            data: m.data,
        }
    }
}

impl CsrMatrix {
    /// Build from raw CSR arrays (the scipy `(data, indices, indptr)` layout).
    ///
    /// # Arguments
    /// * `n_rows`, `n_cols` - Matrix shape
    /// * `indptr` - Row pointers, length `n_rows + 1`, starting at 0, non-decreasing
    /// * `indices` - Column index of each stored entry
    /// * `data` - Value of each stored entry
    ///
    /// Rows are re-sorted by column and explicit zeros removed. Duplicate
    /// column entries within a row are rejected.
    pub fn try_new(
        n_rows: usize,
        n_cols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
    ) -> SynthResult<Self> {
        if indptr.len().checked_sub(1) != Some(n_rows) {
            return Err(SynthError::Validation(format!(
                "indptr has length {} for {n_rows} rows",
                indptr.len()
            )));
        }
        if indices.len() != data.len() {
            return Err(SynthError::Validation(format!(
                "indices ({}) and data ({}) lengths differ",
                indices.len(),
                data.len()
            )));
        }
        if indptr[0] != 0 || indptr[n_rows] != data.len() {
            return Err(SynthError::Validation(
                "indptr must start at 0 and end at the number of stored entries".into(),
            ));
        }
        if indptr.windows(2).any(|w| w[1] < w[0]) {
            return Err(SynthError::Validation("indptr must be non-decreasing".into()));
        }

        let mut out_indptr = Vec::with_capacity(n_rows + 1);
        let mut out_indices = Vec::with_capacity(indices.len());
        let mut out_data = Vec::with_capacity(data.len());
        out_indptr.push(0);

        for row in 0..n_rows {
            let span = indptr[row]..indptr[row + 1];
            let mut entries: Vec<(usize, f64)> = indices[span.clone()]
                .iter()
                .copied()
                .zip(data[span].iter().copied())
                .collect();
            entries.sort_by_key(|&(col, _)| col);

            for (k, &(col, value)) in entries.iter().enumerate() {
                if col >= n_cols {
                    return Err(SynthError::Validation(format!(
                        "row {row} references column {col} but the matrix has {n_cols} columns"
                    )));
                }
                if k > 0 && entries[k - 1].0 == col {
                    return Err(SynthError::Validation(format!(
                        "row {row} stores column {col} more than once"
                    )));
                }
                if value != 0.0 {
                    out_indices.push(col);
                    out_data.push(value);
                }
            }
            out_indptr.push(out_indices.len());
        }

        Ok(Self {
            n_rows,
            n_cols,
            indptr: out_indptr,
            indices: out_indices,
            data: out_data,
        })
    }

    /// Convert a dense matrix, keeping only non-zero entries.
    pub fn from_dense(dense: ArrayView2<'_, f64>) -> Self {
        let (n_rows, n_cols) = dense.dim();
        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in dense.rows() {
            for (col, &value) in row.iter().enumerate() {
                if value != 0.0 {
                    indices.push(col);
                    data.push(value);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            n_rows,
            n_cols,
            indptr,
            indices,
            data,
        }
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Number of stored (non-zero) entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Column indices and values of one row.
    #[inline]
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let span = self.indptr[row]..self.indptr[row + 1];
        (&self.indices[span.clone()], &self.data[span])
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.n_rows, self.n_cols));
        for row in 0..self.n_rows {
            let (cols, values) = self.row(row);
            for (&col, &value) in cols.iter().zip(values) {
                dense[[row, col]] = value;
            }
        }
        dense
    }
}

impl From<ArrayView2<'_, f64>> for CsrMatrix {
    fn from(dense: ArrayView2<'_, f64>) -> Self {
        Self::from_dense(dense)
    }
}

impl From<&Array2<f64>> for CsrMatrix {
    fn from(dense: &Array2<f64>) -> Self {
        Self::from_dense(dense.view())
    }
}

impl From<Array2<f64>> for CsrMatrix {
    fn from(dense: Array2<f64>) -> Self {
        Self::from_dense(dense.view())
    }
}

/// Row-stochastic transition matrix in CSR form.
///
/// Immutable once built; a different matrix means a different model.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionMatrix {
    csr: CsrMatrix,
    tolerance: f64,
}

impl TransitionMatrix {
    pub const DEFAULT_TOLERANCE: f64 = 1e-8;

    /// Validate `matrix` as a transition matrix.
    ///
    /// Fails with [`SynthError::Validation`] when the matrix is empty, not
    /// square, has a negative or non-finite entry, or has a row whose sum
    /// differs from 1 by more than `tolerance`.
    pub fn new(matrix: impl Into<CsrMatrix>, tolerance: f64) -> SynthResult<Self> {
        let csr = matrix.into();
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(SynthError::Validation(format!(
                "row-sum tolerance must be finite and positive, got {tolerance}"
            )));
        }

        let (n_rows, n_cols) = csr.shape();
        if n_rows != n_cols {
            return Err(SynthError::Validation(format!(
                "transition matrix must be square, got {n_rows}x{n_cols}"
            )));
        }
        if n_rows == 0 {
            return Err(SynthError::Validation(
                "transition matrix must have at least one state".into(),
            ));
        }

        for row in 0..n_rows {
            let (cols, values) = csr.row(row);
            if let Some((&col, &value)) = cols
                .iter()
                .zip(values)
                .find(|(_, v)| !v.is_finite() || **v < 0.0)
            {
                return Err(SynthError::Validation(format!(
                    "entry ({row}, {col}) = {value} is not a probability"
                )));
            }
            let sum: f64 = values.iter().sum();
            if (sum - 1.0).abs() > tolerance {
                return Err(SynthError::Validation(format!(
                    "row {row} sums to {sum}, transition matrix must be row-normalized"
                )));
            }
        }

        Ok(Self { csr, tolerance })
    }

    /// Validate with [`Self::DEFAULT_TOLERANCE`].
    pub fn from_matrix(matrix: impl Into<CsrMatrix>) -> SynthResult<Self> {
        Self::new(matrix, Self::DEFAULT_TOLERANCE)
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.csr.n_rows
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    #[inline]
    pub fn csr(&self) -> &CsrMatrix {
        &self.csr
    }

    /// Reachable states and their probabilities from `state`.
    #[inline]
    pub fn row(&self, state: usize) -> (&[usize], &[f64]) {
        self.csr.row(state)
    }

    /// Probability of a single `from -> to` transition.
    pub fn probability(&self, from: usize, to: usize) -> SynthResult<f64> {
        let n = self.n_states();
        if from >= n || to >= n {
            return Err(SynthError::Bounds(format!(
                "transition ({from}, {to}) outside a {n}-state chain"
            )));
        }
        let (cols, values) = self.row(from);
        Ok(cols
            .binary_search(&to)
            .map(|k| values[k])
            .unwrap_or(0.0))
    }

    /// One step of the chain applied to a distribution: returns `p · T`.
    pub fn propagate_distribution(&self, distribution: ArrayView1<'_, f64>) -> SynthResult<Array1<f64>> {
        let n = self.n_states();
        if distribution.len() != n {
            return Err(SynthError::Bounds(format!(
                "distribution has {} entries, chain has {n} states",
                distribution.len()
            )));
        }
        let mut out = Array1::zeros(n);
        for (from, &weight) in distribution.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            let (cols, values) = self.row(from);
            for (&to, &p) in cols.iter().zip(values) {
                out[to] += weight * p;
            }
        }
        Ok(out)
    }

    pub fn to_dense(&self) -> Array2<f64> {
        self.csr.to_dense()
    }

    pub fn into_csr(self) -> CsrMatrix {
        self.csr
    }
}
