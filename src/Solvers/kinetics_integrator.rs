use crate::Core::chemical_system::SystemError;
use crate::Core::partition::{Partition, PartitionError};
use crate::Core::reaction::{ReactionError, ReactionSystem};
use crate::Core::state::ChemicalState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KineticsError {
    #[error(transparent)]
    Reaction(#[from] ReactionError),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error("Non-finite amount of species {ispecies} after kinetic step")]
    NonFinite { ispecies: usize },
}

/// Capability interface of the kinetics integrator: advance the amounts of the
/// kinetic-partition species of one state from time t over a step dt, using
/// the reaction rate functions. Implementations must be safe to share across
/// parallel per-point calculations.
pub trait KineticsIntegrator: Send + Sync {
    fn integrate(
        &self,
        reactions: &ReactionSystem,
        partition: &Partition,
        state: &mut ChemicalState,
        t: f64,
        dt: f64,
    ) -> Result<(), KineticsError>;
}

/// Explicit forward-Euler reference integrator:
/// n_i <- n_i + h * sum_r nu_ri * rate_r for every kinetic species i, with dt
/// split into `substeps` equal sub-intervals. Amounts are clamped at zero.
#[derive(Debug, Clone)]
pub struct ForwardEuler {
    pub substeps: usize,
}

impl Default for ForwardEuler {
    fn default() -> Self {
        Self { substeps: 1 }
    }
}

impl KineticsIntegrator for ForwardEuler {
    fn integrate(
        &self,
        reactions: &ReactionSystem,
        partition: &Partition,
        state: &mut ChemicalState,
        _t: f64,
        dt: f64,
    ) -> Result<(), KineticsError> {
        let substeps = self.substeps.max(1);
        let h = dt / substeps as f64;
        let system = reactions.system();

        // kinetic membership lookup over global species indices
        let mut kinetic = vec![false; system.num_species()];
        for &i in partition.indices_kinetic_species() {
            kinetic[i] = true;
        }

        for _ in 0..substeps {
            let a = system.activities(state.T, state.P, &state.n)?;
            let rates = reactions.rates(state.T, state.P, &state.n, &a)?;
            for (reaction, rate) in reactions.reactions().iter().zip(rates.iter()) {
                for (k, &i) in reaction.indices().iter().enumerate() {
                    if !kinetic[i] {
                        continue;
                    }
                    state.n[i] += h * reaction.stoichiometries()[k] * rate.val;
                }
            }
            for &i in partition.indices_kinetic_species() {
                if !state.n[i].is_finite() {
                    return Err(KineticsError::NonFinite { ispecies: i });
                }
                if state.n[i] < 0.0 {
                    state.n[i] = 0.0;
                }
            }
        }
        Ok(())
    }
}
