/// Orchestration of one equilibrium calculation: assembles the Gibbs energy
/// objective and the elemental mass-balance constraint over the equilibrium
/// partition, hands them to the external minimizer and extracts the
/// sensitivities of the converged amounts.
pub mod equilibrium_solver;
/// tests
pub mod equilibrium_tests;
/// Inverse equilibrium problems: equilibrium constraints with unknown titrant
/// amounts, residuals and Jacobian blocks for an external root finder.
pub mod inverse_problem;
