/// Data contracts around the external constrained minimizer: the optimum
/// state (primal/dual solution with objective and constraint data evaluated at
/// it), the problem description with objective/constraint evaluators, and the
/// `Minimizer` capability trait the solver consumes.
pub mod optimum_state;
