/// Kinetics integration over the kinetic partition: the capability trait the
/// field engine consumes plus an explicit forward-Euler reference integrator.
pub mod kinetics_integrator;
/// Field engine batching equilibrium and kinetics calculations over many
/// sample points, with derived scalar fields and their sensitivities.
pub mod chemical_solver;
/// tests
pub mod chemical_solver_tests;
