#[cfg(test)]
mod tests {
    use crate::Core::chemical_system::{
        ActivityModelEnum, ChemicalSystem, ChemicalSystemBuilder, IdealActivityModel, PhaseKind,
        Species,
    };
    use crate::Core::partition::Partition;
    use crate::Core::state::ChemicalState;
    use crate::Equilibrium::equilibrium_solver::EquilibriumSolver;
    use crate::Optimization::optimum_state::{
        Minimizer, OptimizationError, OptimumOptions, OptimumProblem, OptimumResult, OptimumState,
    };
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};
    use std::sync::Arc;

    /// Deterministic stand-in for the external minimizer: projects the warm
    /// start onto the mass-balance constraint, x = x0 - A^T (A A^T)^-1 (A x0 - b).
    /// Satisfies the constraint exactly and leaves an already-feasible warm
    /// start untouched, which is what the plumbing tests need.
    struct ProjectionMinimizer;

    impl Minimizer for ProjectionMinimizer {
        fn minimize(
            &self,
            problem: &OptimumProblem,
            state: &mut OptimumState,
            _options: &OptimumOptions,
        ) -> Result<OptimumResult, OptimizationError> {
            let x0 = state.x.clone();
            let c0 = (problem.constraint)(&x0);
            let aat = &c0.jac * c0.jac.transpose();
            let lambda = aat
                .lu()
                .solve(&c0.val)
                .ok_or_else(|| OptimizationError::Numeric("singular A A^T".to_string()))?;
            let x = &x0 - c0.jac.transpose() * lambda;

            let obj = (problem.objective)(&x);
            let c = (problem.constraint)(&x);
            let error = c.val.norm();
            state.x = x;
            state.f = obj.f;
            state.g = obj.g;
            state.H = obj.H;
            state.h = c.val;
            state.A = c.jac;
            Ok(OptimumResult {
                converged: true,
                iterations: 1,
                error,
            })
        }
    }

    /// always fails, for per-point failure handling tests
    struct FailingMinimizer;

    impl Minimizer for FailingMinimizer {
        fn minimize(
            &self,
            _problem: &OptimumProblem,
            _state: &mut OptimumState,
            options: &OptimumOptions,
        ) -> Result<OptimumResult, OptimizationError> {
            Err(OptimizationError::NonConvergence {
                iterations: options.max_iterations,
                error: 1.0,
            })
        }
    }

    fn system() -> Arc<ChemicalSystem> {
        let mut builder = ChemicalSystemBuilder::new();
        builder.add_phase(
            "aqueous",
            PhaseKind::Fluid,
            vec![
                Species::new("A", "Na").unwrap().with_standard_potential(-1e3),
                Species::new("B", "Cl").unwrap().with_standard_potential(-2e3),
                Species::new("AB", "NaCl")
                    .unwrap()
                    .with_standard_potential(-4e3),
            ],
        );
        Arc::new(
            builder
                .build(ActivityModelEnum::Ideal(IdealActivityModel))
                .unwrap(),
        )
    }

    #[test]
    fn test_solve_satisfies_mass_balance() {
        let system = system();
        let partition = Partition::all_equilibrium(&system);
        let solver = EquilibriumSolver::new(system.clone(), partition);

        let mut state = ChemicalState::new(&system);
        state.n = DVector::from_vec(vec![0.4, 0.6, 0.2]);
        // elements sorted: Cl, Na; be = A_e * n_target
        let be = DVector::from_vec(vec![1.1, 0.9]);

        let result = solver
            .solve(&ProjectionMinimizer, &mut state, 300.0, 1e5, &be)
            .unwrap();
        assert!(result.converged);
        assert_relative_eq!(state.T, 300.0);
        let ae = solver
            .partition()
            .equilibrium_formula_matrix(system.formula_matrix())
            .unwrap();
        let balance = &ae * solver.partition().equilibrium_rows(&state.n).unwrap();
        assert_relative_eq!(balance[0], be[0], max_relative = 1e-10);
        assert_relative_eq!(balance[1], be[1], max_relative = 1e-10);
    }

    #[test]
    fn test_solve_is_idempotent_from_converged_warm_start() {
        let system = system();
        let partition = Partition::all_equilibrium(&system);
        let solver = EquilibriumSolver::new(system.clone(), partition);

        let mut state = ChemicalState::new(&system);
        state.n = DVector::from_vec(vec![0.5, 0.5, 0.5]);
        let be = DVector::from_vec(vec![1.0, 1.0]);

        solver
            .solve(&ProjectionMinimizer, &mut state, 300.0, 1e5, &be)
            .unwrap();
        let first = state.n.clone();
        solver
            .solve(&ProjectionMinimizer, &mut state, 300.0, 1e5, &be)
            .unwrap();
        for i in 0..first.len() {
            assert_relative_eq!(state.n[i], first[i], max_relative = 1e-12);
        }
    }

    #[test]
    fn test_failed_solve_leaves_state_untouched() {
        let system = system();
        let partition = Partition::all_equilibrium(&system);
        let solver = EquilibriumSolver::new(system.clone(), partition);

        let mut state = ChemicalState::new(&system);
        state.n = DVector::from_vec(vec![0.4, 0.6, 0.2]);
        let before = state.n.clone();
        let be = DVector::from_vec(vec![1.1, 0.9]);

        assert!(
            solver
                .solve(&FailingMinimizer, &mut state, 300.0, 1e5, &be)
                .is_err()
        );
        assert_eq!(state.n, before);
        assert_relative_eq!(state.T, 298.15);
    }

    #[test]
    fn test_be_dimension_checked() {
        let system = system();
        let partition = Partition::all_equilibrium(&system);
        let solver = EquilibriumSolver::new(system.clone(), partition);
        let mut state = ChemicalState::new(&system);
        let be = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        assert!(
            solver
                .solve(&ProjectionMinimizer, &mut state, 300.0, 1e5, &be)
                .is_err()
        );
    }

    #[test]
    fn test_sensitivity_respects_mass_balance() {
        let system = system();
        let partition = Partition::all_equilibrium(&system);
        let solver = EquilibriumSolver::new(system.clone(), partition);

        let mut state = ChemicalState::new(&system);
        state.n = DVector::from_vec(vec![0.4, 0.6, 0.2]);
        let be = DVector::from_vec(vec![1.1, 0.9]);
        solver
            .solve(&ProjectionMinimizer, &mut state, 300.0, 1e5, &be)
            .unwrap();

        let sens = solver.sensitivity(&state).unwrap();
        let ae = solver
            .partition()
            .equilibrium_formula_matrix(system.formula_matrix())
            .unwrap();

        // differentiating A_e n_e = b_e: A_e dn/db = I, A_e dn/dT = 0, A_e dn/dP = 0
        let adb = &ae * &sens.dndb;
        let identity = DMatrix::<f64>::identity(2, 2);
        for r in 0..2 {
            for c in 0..2 {
                assert_relative_eq!(adb[(r, c)], identity[(r, c)], epsilon = 1e-9);
            }
        }
        let adt = &ae * &sens.dndt;
        let adp = &ae * &sens.dndp;
        for r in 0..2 {
            assert_relative_eq!(adt[r], 0.0, epsilon = 1e-9);
            assert_relative_eq!(adp[r], 0.0, epsilon = 1e-9);
        }
    }
}
