use crate::Core::chemical_system::{ChemicalSystem, SystemError};
use crate::Core::partition::{Partition, PartitionError};
use crate::Core::reaction::R;
use crate::Core::state::ChemicalState;
use crate::Optimization::optimum_state::{
    ConstraintEval, Minimizer, ObjectiveEval, OptimizationError, OptimumOptions, OptimumProblem,
    OptimumResult, OptimumState,
};
use log::warn;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EquilibriumError {
    #[error("Equilibrium calculation did not converge after {iterations} iterations, residual norm {error}")]
    NonConvergence { iterations: usize, error: f64 },
    #[error(transparent)]
    Minimizer(#[from] OptimizationError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("Numerical failure: {0}")]
    Numeric(String),
}

/// settings of one equilibrium calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumOptions {
    pub optimum: OptimumOptions,
    /// lower bound on species amounts handed to the minimizer, mol
    pub epsilon: f64,
}

impl Default for EquilibriumOptions {
    fn default() -> Self {
        Self {
            optimum: OptimumOptions::default(),
            epsilon: 1e-14,
        }
    }
}

/// Sensitivities of the converged equilibrium amounts with respect to the
/// inputs of the calculation: temperature, pressure and the elemental amounts
/// of the equilibrium partition. Rows follow the equilibrium species order of
/// the partition, columns of `dndb` follow its equilibrium element order.
#[derive(Debug, Clone)]
pub struct EquilibriumSensitivity {
    pub dndt: DVector<f64>,
    pub dndp: DVector<f64>,
    pub dndb: DMatrix<f64>,
}

/// Builds the Gibbs energy minimization problem for the equilibrium partition
/// of one sample point and drives the external minimizer over it.
///
/// minimize G(n_e) = sum_i n_i (mu_i(T,P) + R T ln a_i)  subject to
/// A_e n_e = b_e and n_e >= epsilon.
pub struct EquilibriumSolver {
    system: Arc<ChemicalSystem>,
    partition: Partition,
    options: EquilibriumOptions,
}

impl EquilibriumSolver {
    pub fn new(system: Arc<ChemicalSystem>, partition: Partition) -> Self {
        Self {
            system,
            partition,
            options: EquilibriumOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EquilibriumOptions) -> Self {
        self.options = options;
        self
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// assemble the minimization problem at (T, P, be), warm-started from the
    /// amounts currently held in `state`
    fn assemble(
        &self,
        state: &ChemicalState,
        t: f64,
        p: f64,
        be: &DVector<f64>,
    ) -> Result<(OptimumProblem, OptimumState), EquilibriumError> {
        let ne = self.partition.num_equilibrium_species();
        let me = self.partition.num_equilibrium_elements();
        if be.len() != me {
            return Err(EquilibriumError::DimensionMismatch(format!(
                "element amount vector has length {}, equilibrium partition has {} elements",
                be.len(),
                me
            )));
        }
        let ae = self
            .partition
            .equilibrium_formula_matrix(self.system.formula_matrix())?;

        let system = self.system.clone();
        let eq_indices: Vec<usize> = self.partition.indices_equilibrium_species().to_vec();
        let mu_full = system.chemical_potentials(t, p);
        let mu_e = self.partition.equilibrium_rows(&mu_full)?;
        let base_n = state.n.clone();
        let epsilon = self.options.epsilon;

        let objective = Box::new(move |xe: &DVector<f64>| -> ObjectiveEval {
            let mut n_full = base_n.clone();
            for (k, &i) in eq_indices.iter().enumerate() {
                n_full[i] = xe[k];
            }
            // the amount vector is sized at assembly time, so the activity
            // call cannot fail on dimensions; an infinite objective would
            // surface a broken invariant to the minimizer instead of a panic
            let a = match system.activities(t, p, &n_full) {
                Ok(a) => a,
                Err(_) => {
                    return ObjectiveEval {
                        f: f64::INFINITY,
                        g: DVector::zeros(xe.len()),
                        H: DMatrix::zeros(xe.len(), xe.len()),
                    };
                }
            };
            let ne = xe.len();
            let mut g = DVector::zeros(ne);
            let mut hess = DMatrix::zeros(ne, ne);
            for (k, &i) in eq_indices.iter().enumerate() {
                let ai = a.val[i].max(epsilon);
                g[k] = mu_e[k] + R * t * ai.ln();
                for (l, &j) in eq_indices.iter().enumerate() {
                    hess[(k, l)] = R * t / ai * a.grad[(i, j)];
                }
            }
            let f = xe.dot(&g);
            ObjectiveEval { f, g, H: hess }
        });

        let ae_c = ae.clone();
        let be_c = be.clone();
        let constraint = Box::new(move |xe: &DVector<f64>| -> ConstraintEval {
            ConstraintEval {
                val: &ae_c * xe - &be_c,
                jac: ae_c.clone(),
            }
        });

        let problem = OptimumProblem {
            num_unknowns: ne,
            num_constraints: me,
            objective,
            constraint,
            lower_bounds: DVector::from_element(ne, epsilon),
        };

        let mut opt_state = OptimumState::new(ne, me);
        let warm = self.partition.equilibrium_rows(&state.n)?;
        opt_state.x = warm.map(|v| v.max(epsilon));
        Ok((problem, opt_state))
    }

    /// Solve the equilibrium problem at (T, P, be). On convergence the
    /// equilibrium rows of `state.n` are overwritten with the solution and
    /// (T, P) are recorded in the state; on failure the state is untouched.
    pub fn solve(
        &self,
        minimizer: &dyn Minimizer,
        state: &mut ChemicalState,
        t: f64,
        p: f64,
        be: &DVector<f64>,
    ) -> Result<OptimumResult, EquilibriumError> {
        let (problem, mut opt_state) = self.assemble(state, t, p, be)?;
        let result = minimizer.minimize(&problem, &mut opt_state, &self.options.optimum)?;
        if !result.converged {
            warn!(
                "equilibrium minimization stopped without convergence: {} iterations, residual {}",
                result.iterations, result.error
            );
            return Err(EquilibriumError::NonConvergence {
                iterations: result.iterations,
                error: result.error,
            });
        }
        state.T = t;
        state.P = p;
        self.partition
            .set_equilibrium_rows(&mut state.n, &opt_state.x)?;
        Ok(result)
    }

    /// Sensitivities of the equilibrium amounts at the converged state, from
    /// the KKT linearization
    ///
    ///   [ H  A^T ] [ dn ]   [ rhs ]
    ///   [ A   0  ] [ dy ] = [  r  ]
    ///
    /// with rhs = 0, r = I for dndb; rhs = -dg/dT, r = 0 for dndt; and
    /// rhs = -dg/dP, r = 0 for dndp. The T/P derivatives of the chemical
    /// potential closures are taken by central finite difference.
    pub fn sensitivity(
        &self,
        state: &ChemicalState,
    ) -> Result<EquilibriumSensitivity, EquilibriumError> {
        let t = state.T;
        let p = state.P;
        let ne = self.partition.num_equilibrium_species();
        let me = self.partition.num_equilibrium_elements();
        let ae = self
            .partition
            .equilibrium_formula_matrix(self.system.formula_matrix())?;
        let a = self.system.activities(t, p, &state.n)?;
        let eq_indices = self.partition.indices_equilibrium_species();
        let epsilon = self.options.epsilon;

        // KKT matrix at the current amounts
        let mut kkt = DMatrix::zeros(ne + me, ne + me);
        for (k, &i) in eq_indices.iter().enumerate() {
            let ai = a.val[i].max(epsilon);
            for (l, &j) in eq_indices.iter().enumerate() {
                kkt[(k, l)] = R * t / ai * a.grad[(i, j)];
            }
        }
        for r in 0..me {
            for c in 0..ne {
                kkt[(ne + r, c)] = ae[(r, c)];
                kkt[(c, ne + r)] = ae[(r, c)];
            }
        }
        let lu = kkt.lu();

        // dn/db: unit perturbations of the element amounts
        let mut rhs_b = DMatrix::zeros(ne + me, me);
        for r in 0..me {
            rhs_b[(ne + r, r)] = 1.0;
        }
        let sol_b = lu
            .solve(&rhs_b)
            .ok_or_else(|| EquilibriumError::Numeric("singular KKT matrix".to_string()))?;
        let dndb = sol_b.rows(0, ne).into_owned();

        // dg/dT and dg/dP of the gradient entries, finite differences on mu
        let ht = 1e-6 * t.abs().max(1.0);
        let hp = 1e-6 * p.abs().max(1.0);
        let mut rhs_t = DVector::zeros(ne + me);
        let mut rhs_p = DVector::zeros(ne + me);
        for (k, &i) in eq_indices.iter().enumerate() {
            let mu = &self.system.species()[i].chemical_potential;
            let dmudt = (mu(t + ht, p) - mu(t - ht, p)) / (2.0 * ht);
            let dmudp = (mu(t, p + hp) - mu(t, p - hp)) / (2.0 * hp);
            let ai = a.val[i].max(epsilon);
            rhs_t[k] = -(dmudt + R * ai.ln());
            rhs_p[k] = -dmudp;
        }
        let dndt_full = lu
            .solve(&rhs_t)
            .ok_or_else(|| EquilibriumError::Numeric("singular KKT matrix".to_string()))?;
        let dndp_full = lu
            .solve(&rhs_p)
            .ok_or_else(|| EquilibriumError::Numeric("singular KKT matrix".to_string()))?;

        Ok(EquilibriumSensitivity {
            dndt: dndt_full.rows(0, ne).into_owned(),
            dndp: dndp_full.rows(0, ne).into_owned(),
            dndb,
        })
    }
}
