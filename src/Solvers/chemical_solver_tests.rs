#[cfg(test)]
mod tests {
    use crate::Core::chemical_system::{
        ActivityModelEnum, ChemicalSystem, ChemicalSystemBuilder, IdealActivityModel, PhaseKind,
        Species,
    };
    use crate::Core::partition::Partition;
    use crate::Core::reaction::{Reaction, ReactionSystem};
    use crate::Core::sensitivity::ScalarSens;
    use crate::Core::state::ChemicalState;
    use crate::Optimization::optimum_state::{
        Minimizer, OptimizationError, OptimumOptions, OptimumProblem, OptimumResult, OptimumState,
    };
    use crate::Solvers::chemical_solver::ChemicalSolver;
    use crate::Solvers::kinetics_integrator::ForwardEuler;
    use approx::assert_relative_eq;
    use nalgebra::DVector;
    use std::sync::Arc;

    /// projects the warm start onto the mass-balance constraint; fails when the
    /// warm start is implausibly large, which the failure-isolation test uses
    /// to make exactly one field point fail
    struct ProjectionMinimizer {
        max_warm_start_norm: f64,
    }

    impl Default for ProjectionMinimizer {
        fn default() -> Self {
            Self {
                max_warm_start_norm: f64::INFINITY,
            }
        }
    }

    impl Minimizer for ProjectionMinimizer {
        fn minimize(
            &self,
            problem: &OptimumProblem,
            state: &mut OptimumState,
            options: &OptimumOptions,
        ) -> Result<OptimumResult, OptimizationError> {
            let x0 = state.x.clone();
            if x0.norm() > self.max_warm_start_norm {
                return Err(OptimizationError::NonConvergence {
                    iterations: options.max_iterations,
                    error: x0.norm(),
                });
            }
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

    // aqueous A, B, AB + solid Halite; elements (Cl, Na)
    fn system() -> Arc<ChemicalSystem> {
        let mut builder = ChemicalSystemBuilder::new();
        builder.add_phase(
            "aqueous",
            PhaseKind::Fluid,
            vec![
                Species::new("A", "Na").unwrap().with_molar_volume(1e-5),
                Species::new("B", "Cl").unwrap().with_molar_volume(1e-5),
                Species::new("AB", "NaCl").unwrap().with_molar_volume(2.5e-5),
            ],
        );
        builder.add_phase(
            "halite",
            PhaseKind::Solid,
            vec![
                Species::new("Halite", "NaCl")
                    .unwrap()
                    .with_molar_volume(2.7e-5),
            ],
        );
        Arc::new(
            builder
                .build(ActivityModelEnum::Ideal(IdealActivityModel))
                .unwrap(),
        )
    }

    fn initial_state(system: &ChemicalSystem) -> ChemicalState {
        let mut state = ChemicalState::new(system);
        state.n = DVector::from_vec(vec![0.4, 0.6, 0.2, 0.1]);
        state
    }

    fn be_flat() -> Vec<f64> {
        // per-point (Cl, Na) amounts, deliberately asymmetric
        vec![1.1, 0.7, 0.9, 0.5, 1.3, 0.8]
    }

    #[test]
    fn test_set_state_uniform_and_selective() {
        let system = system();
        let mut solver = ChemicalSolver::new(system.clone(), 3);
        let state = initial_state(&system);
        solver.set_state(&state).unwrap();
        for i in 0..3 {
            assert_eq!(solver.state(i).unwrap().n, state.n);
        }

        let mut other = state.clone();
        other.n[0] = 9.0;
        solver.set_state_at(&other, &[1]).unwrap();
        assert_relative_eq!(solver.state(0).unwrap().n[0], 0.4);
        assert_relative_eq!(solver.state(1).unwrap().n[0], 9.0);
        assert_relative_eq!(solver.state(2).unwrap().n[0], 0.4);

        // bounds and dimensions are checked
        assert!(solver.set_state_at(&state, &[7]).is_err());
        let mut bad = state.clone();
        bad.n = DVector::zeros(2);
        assert!(solver.set_state(&bad).is_err());
        assert!(solver.state(5).is_err());
    }

    #[test]
    fn test_equilibrate_every_point_and_idempotence() {
        let system = system();
        let mut solver = ChemicalSolver::new(system.clone(), 3);
        solver.set_state(&initial_state(&system)).unwrap();

        let t = [300.0; 3];
        let p = [1e5; 3];
        let be = be_flat();
        let minimizer = ProjectionMinimizer::default();
        let results = solver.equilibrate(&minimizer, &t, &p, &be).unwrap();
        assert_eq!(results.len(), 3);
        for r in &results {
            assert!(r.is_ok());
        }

        // every point satisfies its own mass balance
        let ae = solver
            .partition()
            .equilibrium_formula_matrix(system.formula_matrix())
            .unwrap();
        for i in 0..3 {
            let n = &solver.state(i).unwrap().n;
            let balance = &ae * solver.partition().equilibrium_rows(n).unwrap();
            assert_relative_eq!(balance[0], be[2 * i], max_relative = 1e-10);
            assert_relative_eq!(balance[1], be[2 * i + 1], max_relative = 1e-10);
        }

        // equilibrating again from the converged states reproduces them
        let before: Vec<DVector<f64>> =
            (0..3).map(|i| solver.state(i).unwrap().n.clone()).collect();
        solver.equilibrate(&minimizer, &t, &p, &be).unwrap();
        for i in 0..3 {
            let after = &solver.state(i).unwrap().n;
            for j in 0..after.len() {
                assert_relative_eq!(after[j], before[i][j], max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_equilibrate_reports_failures_per_point() {
        let system = system();
        let mut solver = ChemicalSolver::new(system.clone(), 3);
        solver.set_state(&initial_state(&system)).unwrap();
        // make the warm start of point 1 absurd so only that point fails
        let mut huge = initial_state(&system);
        huge.n = DVector::from_vec(vec![1e6, 1e6, 1e6, 1e6]);
        solver.set_state_at(&huge, &[1]).unwrap();

        let minimizer = ProjectionMinimizer {
            max_warm_start_norm: 1e3,
        };
        let t = [300.0; 3];
        let p = [1e5; 3];
        let be = be_flat();
        let results = solver.equilibrate(&minimizer, &t, &p, &be).unwrap();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());

        // the failed point keeps its previous state, the others converged
        assert_relative_eq!(solver.state(1).unwrap().n[0], 1e6);
        let ae = solver
            .partition()
            .equilibrium_formula_matrix(system.formula_matrix())
            .unwrap();
        let n0 = &solver.state(0).unwrap().n;
        let balance = &ae * solver.partition().equilibrium_rows(n0).unwrap();
        assert_relative_eq!(balance[0], be[0], max_relative = 1e-10);
    }

    #[test]
    fn test_equilibrate_checks_array_lengths_first() {
        let system = system();
        let mut solver = ChemicalSolver::new(system.clone(), 3);
        solver.set_state(&initial_state(&system)).unwrap();
        let minimizer = ProjectionMinimizer::default();
        let before = solver.state(0).unwrap().n.clone();

        assert!(
            solver
                .equilibrate(&minimizer, &[300.0; 2], &[1e5; 3], &be_flat())
                .is_err()
        );
        assert!(
            solver
                .equilibrate(&minimizer, &[300.0; 3], &[1e5; 3], &[1.0; 4])
                .is_err()
        );
        // nothing was mutated
        assert_eq!(solver.state(0).unwrap().n, before);
    }

    #[test]
    fn test_with_diff_values_match_plain_values() {
        let system = system();
        let mut solver = ChemicalSolver::new(system.clone(), 3);
        solver.set_state(&initial_state(&system)).unwrap();

        // derivative fields need stored sensitivities
        assert!(solver.porosity_with_diff().is_err());

        let minimizer = ProjectionMinimizer::default();
        solver
            .equilibrate(&minimizer, &[300.0; 3], &[1e5; 3], &be_flat())
            .unwrap();

        let plain = solver.density(0).unwrap();
        let with_diff = solver.density_with_diff(0).unwrap();
        assert_eq!(plain.val, with_diff.val);

        let plain = solver.porosity().unwrap();
        let with_diff = solver.porosity_with_diff().unwrap();
        assert_eq!(plain.val, with_diff.val);

        let plain = solver.saturation(0).unwrap();
        let with_diff = solver.saturation_with_diff(0).unwrap();
        assert_eq!(plain.val, with_diff.val);

        // derivative blocks have the field dimensions and finite entries
        assert_eq!(with_diff.ddbe.nrows(), 3);
        assert_eq!(with_diff.ddbe.ncols(), 2);
        assert!(with_diff.ddbe.iter().all(|v| v.is_finite()));
        assert!(with_diff.ddt.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_porosity_value() {
        let system = system();
        let mut solver = ChemicalSolver::new(system.clone(), 1);
        let state = initial_state(&system);
        solver.set_state(&state).unwrap();
        let porosity = solver.porosity().unwrap();
        let vt = 0.4 * 1e-5 + 0.6 * 1e-5 + 0.2 * 2.5e-5 + 0.1 * 2.7e-5;
        let vs = 0.1 * 2.7e-5;
        assert_relative_eq!(porosity.val[0], 1.0 - vs / vt, max_relative = 1e-12);

        // saturation of the aqueous phase among fluids is 1 here
        let saturation = solver.saturation(0).unwrap();
        assert_relative_eq!(saturation.val[0], 1.0, max_relative = 1e-12);

        // density of the aqueous phase: mass over volume
        let density = solver.density(0).unwrap();
        let mass = 0.4 * 22.99 + 0.6 * 35.45 + 0.2 * (22.99 + 35.45);
        let vol = 0.4 * 1e-5 + 0.6 * 1e-5 + 0.2 * 2.5e-5;
        assert_relative_eq!(density.val[0], mass / vol, max_relative = 1e-3);
    }

    #[test]
    fn test_phase_field_validation() {
        let system = system();
        let solver = ChemicalSolver::new(system.clone(), 1);
        // halite is a solid phase, saturation is undefined for it
        assert!(solver.saturation(1).is_err());
        assert!(solver.saturation(9).is_err());
        assert!(solver.density(9).is_err());
    }

    #[test]
    fn test_react_advances_kinetic_species_only() {
        let system = system();
        // A -> B at a constant rate of 0.1 mol/s
        let reaction = Reaction::new(&system, "A = B", &[("A", -1.0), ("B", 1.0)])
            .unwrap()
            .with_rate_fn(Arc::new(|_t, _p, _n, a| {
                Ok(ScalarSens::constant(0.1, a.dim()))
            }));
        let reactions = ReactionSystem::new(system.clone(), vec![reaction]).unwrap();
        let mut solver = ChemicalSolver::from_reactions(reactions, 2);
        let partition = Partition::from_names(&system, &["AB", "Halite"], &["A", "B"], &[]).unwrap();
        solver.set_partition(partition).unwrap();
        solver.set_state(&initial_state(&system)).unwrap();

        let results = solver.react(&ForwardEuler::default(), 0.0, 1.0).unwrap();
        assert!(results.iter().all(|r| r.is_ok()));
        for i in 0..2 {
            let n = &solver.state(i).unwrap().n;
            assert_relative_eq!(n[0], 0.4 - 0.1, max_relative = 1e-12);
            assert_relative_eq!(n[1], 0.6 + 0.1, max_relative = 1e-12);
            // equilibrium species untouched by the kinetic step
            assert_relative_eq!(n[2], 0.2);
            assert_relative_eq!(n[3], 0.1);
        }
    }

    #[test]
    fn test_react_without_reactions_is_an_error() {
        let system = system();
        let mut solver = ChemicalSolver::new(system, 1);
        assert!(solver.react(&ForwardEuler::default(), 0.0, 1.0).is_err());
    }
}
