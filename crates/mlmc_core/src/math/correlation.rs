//! Correlation matrices with Cholesky decomposition.
//!
//! Given `n` independent standard normals `Z`, correlated normals follow from
//! `W = L Z` where `L` is the lower triangular Cholesky factor of the
//! correlation matrix `C = L Lᵀ` (Gaussian copula).
//!
//! ```
//! use mlmc_core::math::correlation::CorrelationMatrix;
//!
//! let corr = CorrelationMatrix::new(&[1.0, 0.5, 0.5, 1.0], 2).unwrap();
//! let chol = corr.cholesky().unwrap();
//!
//! let mut w = [0.0; 2];
//! chol.transform_into(&[0.5, 0.8], &mut w);
//! assert_eq!(w[0], 0.5);
//! ```

use crate::types::{CorrelationError, StatisticsError};

const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Validated correlation matrix (row-major).
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationMatrix {
    data: Vec<f64>,
    dim: usize,
}

impl CorrelationMatrix {
    /// Create a correlation matrix from `dim * dim` row-major elements.
    ///
    /// # Validation
    ///
    /// - Exactly `dim * dim` elements
    /// - Unit diagonal
    /// - Symmetric
    /// - Off-diagonal elements in [-1, 1]
    pub fn new(data: &[f64], dim: usize) -> Result<Self, CorrelationError> {
        let expected = dim * dim;
        if data.len() != expected {
            return Err(CorrelationError::InvalidDimensions {
                expected,
                got: data.len(),
            });
        }

        for i in 0..dim {
            let diag = data[i * dim + i];
            if (diag - 1.0).abs() > SYMMETRY_TOLERANCE {
                return Err(CorrelationError::InvalidDiagonal {
                    index: i,
                    value: diag,
                });
            }
        }

        for i in 0..dim {
            for j in (i + 1)..dim {
                let val_ij = data[i * dim + j];
                if (val_ij - data[j * dim + i]).abs() > SYMMETRY_TOLERANCE {
                    return Err(CorrelationError::NotSymmetric { i, j });
                }
                if !(-1.0..=1.0).contains(&val_ij) {
                    return Err(CorrelationError::OutOfRange {
                        i,
                        j,
                        value: val_ij,
                    });
                }
            }
        }

        Ok(Self {
            data: data.to_vec(),
            dim,
        })
    }

    /// Identity correlation (independent factors).
    pub fn identity(dim: usize) -> Self {
        let mut data = vec![0.0; dim * dim];
        for i in 0..dim {
            data[i * dim + i] = 1.0;
        }
        Self { data, dim }
    }

    /// Pearson correlation of simple returns estimated from price histories.
    ///
    /// `histories[k]` is the price series of factor `k`; all series must have
    /// the same length and at least three observations.
    pub fn from_price_histories(histories: &[Vec<f64>]) -> Result<Self, StatisticsError> {
        let dim = histories.len();
        let len = histories.first().map_or(0, Vec::len);
        if len < 3 {
            return Err(StatisticsError::InsufficientData {
                required: 3,
                got: len,
            });
        }
        if let Some(bad) = histories.iter().find(|h| h.len() != len) {
            return Err(StatisticsError::LengthMismatch {
                x_len: len,
                y_len: bad.len(),
            });
        }

        let returns: Vec<Vec<f64>> = histories
            .iter()
            .map(|h| h.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect())
            .collect();
        let n = (len - 1) as f64;
        let means: Vec<f64> = returns.iter().map(|r| r.iter().sum::<f64>() / n).collect();

        let covariance = |a: usize, b: usize| -> f64 {
            returns[a]
                .iter()
                .zip(&returns[b])
                .map(|(x, y)| (x - means[a]) * (y - means[b]))
                .sum::<f64>()
        };

        let variances: Vec<f64> = (0..dim).map(|k| covariance(k, k)).collect();
        if variances.iter().any(|&v| v == 0.0) {
            return Err(StatisticsError::DegenerateRegressor);
        }

        let mut data = vec![0.0; dim * dim];
        for i in 0..dim {
            data[i * dim + i] = 1.0;
            for j in (i + 1)..dim {
                let rho = (covariance(i, j) / (variances[i] * variances[j]).sqrt()).clamp(-1.0, 1.0);
                data[i * dim + j] = rho;
                data[j * dim + i] = rho;
            }
        }

        Ok(Self { data, dim })
    }

    /// Matrix dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Element at (i, j).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.dim + j]
    }

    /// Cholesky decomposition `C = L Lᵀ`.
    ///
    /// # Errors
    ///
    /// `CorrelationError::NotPositiveDefinite` if a pivot is not positive.
    pub fn cholesky(&self) -> Result<CholeskyFactor, CorrelationError> {
        let n = self.dim;
        let mut lower = vec![0.0; n * n];

        for i in 0..n {
            for j in 0..=i {
                if j == i {
                    let sum: f64 = (0..j).map(|k| lower[j * n + k] * lower[j * n + k]).sum();
                    let diag = self.get(j, j) - sum;
                    if diag <= 0.0 {
                        return Err(CorrelationError::NotPositiveDefinite);
                    }
                    lower[j * n + j] = diag.sqrt();
                } else {
                    let sum: f64 = (0..j).map(|k| lower[i * n + k] * lower[j * n + k]).sum();
                    lower[i * n + j] = (self.get(i, j) - sum) / lower[j * n + j];
                }
            }
        }

        Ok(CholeskyFactor { data: lower, dim: n })
    }
}

/// Lower triangular Cholesky factor of a correlation matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct CholeskyFactor {
    data: Vec<f64>,
    dim: usize,
}

impl CholeskyFactor {
    /// Identity factor (no correlation).
    pub fn identity(dim: usize) -> Self {
        let mut data = vec![0.0; dim * dim];
        for i in 0..dim {
            data[i * dim + i] = 1.0;
        }
        Self { data, dim }
    }

    /// Matrix dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Element at (i, j); zero above the diagonal.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if j > i {
            0.0
        } else {
            self.data[i * self.dim + j]
        }
    }

    /// Writes `W = L Z` into `out` without allocating.
    ///
    /// # Panics
    ///
    /// Panics if `z` or `out` is shorter than the dimension.
    pub fn transform_into(&self, z: &[f64], out: &mut [f64]) {
        assert!(
            z.len() >= self.dim && out.len() >= self.dim,
            "buffers shorter than matrix dimension {}",
            self.dim
        );
        for i in 0..self.dim {
            let row = &self.data[i * self.dim..i * self.dim + i + 1];
            out[i] = row.iter().zip(z).map(|(l, zj)| l * zj).sum();
        }
    }
}
