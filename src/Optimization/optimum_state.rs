use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("Minimizer did not converge after {iterations} iterations, residual norm {error}")]
    NonConvergence { iterations: usize, error: f64 },
    #[error("Numerical failure in minimizer: {0}")]
    Numeric(String),
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// State of an optimum solution as returned by the external minimizer:
/// primal solution `x`, dual solution `y` for the equality constraints, dual
/// solution `z` for the bound constraints, and the objective/constraint data
/// evaluated at `x`. Produced wholly by the minimizer, consumed read-only.
#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub struct OptimumState {
    /// primal solution
    pub x: DVector<f64>,
    /// dual solution w.r.t. the equality constraints
    pub y: DVector<f64>,
    /// dual solution w.r.t. the bound constraints
    pub z: DVector<f64>,
    /// objective value at x
    pub f: f64,
    /// objective gradient at x
    pub g: DVector<f64>,
    /// objective Hessian at x
    pub H: DMatrix<f64>,
    /// equality-constraint values at x
    pub h: DVector<f64>,
    /// equality-constraint Jacobian at x
    pub A: DMatrix<f64>,
}

impl OptimumState {
    /// zeroed state for `n` unknowns and `m` equality constraints
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            x: DVector::zeros(n),
            y: DVector::zeros(m),
            z: DVector::zeros(n),
            f: 0.0,
            g: DVector::zeros(n),
            H: DMatrix::zeros(n, n),
            h: DVector::zeros(m),
            A: DMatrix::zeros(m, n),
        }
    }

    /// check the cross-field dimension invariants
    pub fn dimensions_consistent(&self) -> bool {
        let n = self.x.len();
        let m = self.y.len();
        self.z.len() == n
            && self.g.len() == n
            && self.H.nrows() == n
            && self.H.ncols() == n
            && self.h.len() == m
            && self.A.nrows() == m
            && self.A.ncols() == n
    }
}

/// objective value, gradient and Hessian at one point
#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub struct ObjectiveEval {
    pub f: f64,
    pub g: DVector<f64>,
    pub H: DMatrix<f64>,
}

/// equality-constraint values and Jacobian at one point
#[derive(Debug, Clone)]
pub struct ConstraintEval {
    pub val: DVector<f64>,
    pub jac: DMatrix<f64>,
}

/// A constrained minimization problem handed to the external minimizer:
/// minimize f(x) subject to h(x) = 0 and x >= lower_bounds.
pub struct OptimumProblem {
    pub num_unknowns: usize,
    pub num_constraints: usize,
    pub objective: Box<dyn Fn(&DVector<f64>) -> ObjectiveEval + Send + Sync>,
    pub constraint: Box<dyn Fn(&DVector<f64>) -> ConstraintEval + Send + Sync>,
    pub lower_bounds: DVector<f64>,
}

impl std::fmt::Debug for OptimumProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimumProblem")
            .field("num_unknowns", &self.num_unknowns)
            .field("num_constraints", &self.num_constraints)
            .finish()
    }
}

/// solver settings passed through to the minimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimumOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for OptimumOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

/// convergence diagnostics of one minimization call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimumResult {
    pub converged: bool,
    pub iterations: usize,
    /// final residual norm
    pub error: f64,
}

/// Capability interface of the external constrained minimizer. Implementations
/// must be safe to share across parallel per-point equilibrium calculations.
pub trait Minimizer: Send + Sync {
    fn minimize(
        &self,
        problem: &OptimumProblem,
        state: &mut OptimumState,
        options: &OptimumOptions,
    ) -> Result<OptimumResult, OptimizationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimum_state_dimensions() {
        let state = OptimumState::new(4, 2);
        assert!(state.dimensions_consistent());
        let mut bad = OptimumState::new(4, 2);
        bad.g = DVector::zeros(3);
        assert!(!bad.dimensions_consistent());
    }
}
