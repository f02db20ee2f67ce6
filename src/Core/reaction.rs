use crate::Core::chemical_system::ChemicalSystem;
use crate::Core::sensitivity::{ScalarSens, VectorSens};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// universal gas constant, J/(mol*K)
pub const R: f64 = 8.314;

/// reference temperature for Arrhenius corrections, K
const T_REF: f64 = 298.15;

/// equilibrium constant of a reaction as a function of (T, P); built once,
/// cheap to re-evaluate
pub type EquilibriumConstantFn = Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>;

/// kinetic rate of a reaction: (T, P, molar amounts, activities) -> rate with
/// its molar-amount derivatives; supplied externally or built from a
/// `MineralMechanism`
pub type RateFn = Arc<
    dyn Fn(f64, f64, &DVector<f64>, &VectorSens) -> Result<ScalarSens, ReactionError>
        + Send
        + Sync,
>;

#[derive(Debug, Error)]
pub enum ReactionError {
    #[error("Reaction '{reaction}': unknown species '{species}'")]
    UnknownSpecies { reaction: String, species: String },
    #[error(
        "Reaction '{reaction}': species list has {num_species} entries, stoichiometries {num_stoichiometries}"
    )]
    MismatchedLengths {
        reaction: String,
        num_species: usize,
        num_stoichiometries: usize,
    },
    #[error(
        "Reaction '{reaction}': activity {activity} of species '{species}' raised to negative stoichiometry {stoichiometry}"
    )]
    NonpositiveActivity {
        reaction: String,
        species: String,
        activity: f64,
        stoichiometry: f64,
    },
    #[error("Reaction '{reaction}': negative activity {activity} of species '{species}'")]
    NegativeActivity {
        reaction: String,
        species: String,
        activity: f64,
    },
    #[error("Reaction '{0}' has no rate function")]
    MissingRateFunction(String),
    #[error("Activity vector has length {found}, system has {expected} species")]
    DimensionMismatch { found: usize, expected: usize },
}

/// One reaction written as `0 <=> sum_i nu_i * species_i`: participating
/// species indices with matching signed stoichiometric coefficients (negative
/// for reactants, positive for products), the equilibrium-constant function
/// and an optional kinetic rate function. A reaction is bound to the chemical
/// system it was built against; rebuilding the system requires rebuilding the
/// reaction.
#[derive(Clone)]
pub struct Reaction {
    name: String,
    species_names: Vec<String>,
    indices: Vec<usize>,
    stoichiometries: Vec<f64>,
    kappa: EquilibriumConstantFn,
    rate_fn: Option<RateFn>,
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .field("species", &self.species_names)
            .field("stoichiometries", &self.stoichiometries)
            .finish()
    }
}

impl Reaction {
    /// build a reaction from (species name, stoichiometric coefficient) pairs;
    /// the equilibrium-constant function is assembled from the species'
    /// chemical potential closures as exp(-sum_i nu_i mu_i(T,P) / (R T))
    pub fn new(
        system: &ChemicalSystem,
        name: &str,
        stoichiometry: &[(&str, f64)],
    ) -> Result<Self, ReactionError> {
        let mut species_names = Vec::with_capacity(stoichiometry.len());
        let mut indices = Vec::with_capacity(stoichiometry.len());
        let mut stoichiometries = Vec::with_capacity(stoichiometry.len());
        for &(species, nu) in stoichiometry {
            let i = system
                .index_of_species(species)
                .map_err(|_| ReactionError::UnknownSpecies {
                    reaction: name.to_string(),
                    species: species.to_string(),
                })?;
            species_names.push(species.to_string());
            indices.push(i);
            stoichiometries.push(nu);
        }
        let kappa = equilibrium_constant_fn(system, &indices, &stoichiometries);
        Ok(Self {
            name: name.to_string(),
            species_names,
            indices,
            stoichiometries,
            kappa,
            rate_fn: None,
        })
    }

    /// attach an externally supplied kinetic rate function
    pub fn with_rate_fn(mut self, rate: RateFn) -> Self {
        self.rate_fn = Some(rate);
        self
    }

    /// attach a transition-state-theory rate law built from a mineral mechanism
    pub fn with_mineral_mechanism(self, mechanism: MineralMechanism) -> Self {
        let kappa = self.kappa.clone();
        let indices = self.indices.clone();
        let stoichiometries = self.stoichiometries.clone();
        let name = self.name.clone();
        let names = self.species_names.clone();
        let rate: RateFn = Arc::new(move |t, p, _n, a| {
            let q = reaction_quotient_impl(&name, &names, &indices, &stoichiometries, a)?;
            let k = kappa(t, p);
            let omega = q.scale(1.0 / k);
            Ok(mechanism.rate(t, &omega))
        });
        self.with_rate_fn(rate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_species(&self) -> usize {
        self.indices.len()
    }

    pub fn species(&self) -> &[String] {
        &self.species_names
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn stoichiometries(&self) -> &[f64] {
        &self.stoichiometries
    }

    pub fn contains_species(&self, species: &str) -> bool {
        self.species_names.iter().any(|s| s == species)
    }

    /// stoichiometric coefficient of a species by name; zero when the species
    /// does not participate in this reaction
    pub fn stoichiometry(&self, species: &str) -> f64 {
        match self.species_names.iter().position(|s| s == species) {
            Some(k) => self.stoichiometries[k],
            None => 0.0,
        }
    }

    pub fn equilibrium_constant(&self, t: f64, p: f64) -> f64 {
        (self.kappa)(t, p)
    }

    pub fn ln_equilibrium_constant(&self, t: f64, p: f64) -> f64 {
        (self.kappa)(t, p).ln()
    }

    /// Reaction quotient Q = prod_i a_i^nu_i over the participating species,
    /// with its gradient w.r.t. molar amounts propagated as
    /// dQ/dn = Q * sum_i (nu_i / a_i) * da_i/dn.
    ///
    /// The value is accumulated first and the gradient second, because every
    /// gradient term needs the final Q, not a partial product. A zero activity
    /// under a positive stoichiometry contributes zero to both passes; under a
    /// negative stoichiometry it is a domain error.
    pub fn reaction_quotient(&self, a: &VectorSens) -> Result<ScalarSens, ReactionError> {
        reaction_quotient_impl(
            &self.name,
            &self.species_names,
            &self.indices,
            &self.stoichiometries,
            a,
        )
    }

    /// ln Q = sum_i nu_i ln a_i with gradient sum_i (nu_i / a_i) da_i/dn;
    /// requires strictly positive activities of all participating species
    pub fn ln_reaction_quotient(&self, a: &VectorSens) -> Result<ScalarSens, ReactionError> {
        let dim = a.dim();
        let mut val = 0.0;
        let mut grad = DVector::zeros(dim);
        for (k, &i) in self.indices.iter().enumerate() {
            if i >= a.len() {
                return Err(ReactionError::DimensionMismatch {
                    found: a.len(),
                    expected: i + 1,
                });
            }
            let nu = self.stoichiometries[k];
            let ai = a.val[i];
            if ai <= 0.0 {
                return Err(ReactionError::NonpositiveActivity {
                    reaction: self.name.clone(),
                    species: self.species_names[k].clone(),
                    activity: ai,
                    stoichiometry: nu,
                });
            }
            val += nu * ai.ln();
            grad += a.grad.row(i).transpose() * (nu / ai);
        }
        Ok(ScalarSens::new(val, grad))
    }

    /// kinetic rate of the reaction; delegates to the stored rate function
    pub fn rate(
        &self,
        t: f64,
        p: f64,
        n: &DVector<f64>,
        a: &VectorSens,
    ) -> Result<ScalarSens, ReactionError> {
        match &self.rate_fn {
            Some(rate) => rate(t, p, n, a),
            None => Err(ReactionError::MissingRateFunction(self.name.clone())),
        }
    }

    pub fn has_rate_fn(&self) -> bool {
        self.rate_fn.is_some()
    }
}

/// assemble the equilibrium-constant function of a reaction, capturing the
/// chemical-potential closures of the participating species
pub fn equilibrium_constant_fn(
    system: &ChemicalSystem,
    indices: &[usize],
    stoichiometries: &[f64],
) -> EquilibriumConstantFn {
    let mu: Vec<_> = indices
        .iter()
        .map(|&i| system.species()[i].chemical_potential.clone())
        .collect();
    let nu: Vec<f64> = stoichiometries.to_vec();
    Arc::new(move |t, p| {
        let mut sum = 0.0;
        for (k, mu_k) in mu.iter().enumerate() {
            sum += nu[k] * mu_k(t, p);
        }
        (-sum / (R * t)).exp()
    })
}

// shared by Reaction::reaction_quotient and the mineral rate closure
fn reaction_quotient_impl(
    reaction: &str,
    species_names: &[String],
    indices: &[usize],
    stoichiometries: &[f64],
    a: &VectorSens,
) -> Result<ScalarSens, ReactionError> {
    let dim = a.dim();

    // value pass
    let mut qval = 1.0;
    for (k, &i) in indices.iter().enumerate() {
        if i >= a.len() {
            return Err(ReactionError::DimensionMismatch {
                found: a.len(),
                expected: i + 1,
            });
        }
        let nu = stoichiometries[k];
        let ai = a.val[i];
        if ai < 0.0 {
            return Err(ReactionError::NegativeActivity {
                reaction: reaction.to_string(),
                species: species_names[k].clone(),
                activity: ai,
            });
        }
        if ai == 0.0 && nu < 0.0 {
            return Err(ReactionError::NonpositiveActivity {
                reaction: reaction.to_string(),
                species: species_names[k].clone(),
                activity: ai,
                stoichiometry: nu,
            });
        }
        qval *= ai.powf(nu);
    }

    // gradient pass, reusing the finished value
    let mut grad = DVector::zeros(dim);
    for (k, &i) in indices.iter().enumerate() {
        let nu = stoichiometries[k];
        let ai = a.val[i];
        if ai == 0.0 {
            // the value factor is zero, so is this term's contribution
            continue;
        }
        grad += a.grad.row(i).transpose() * (qval * nu / ai);
    }
    Ok(ScalarSens::new(qval, grad))
}

/// Transition-state-theory mineral rate mechanism:
/// rate = kappa(T) * (1 - Omega^p)^q for Omega <= 1 (dissolution) and
/// rate = -kappa(T) * (Omega^p - 1)^q for Omega > 1 (precipitation), with the
/// Arrhenius correction kappa(T) = kappa0 * exp(-Ea/R * (1/T - 1/T0)),
/// T0 = 298.15 K. kappa0 in mol/s, Ea in J/mol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineralMechanism {
    pub kappa0: f64,
    pub activation_energy: f64,
    pub p: f64,
    pub q: f64,
}

impl MineralMechanism {
    pub fn new(kappa0: f64, activation_energy: f64) -> Self {
        Self {
            kappa0,
            activation_energy,
            p: 1.0,
            q: 1.0,
        }
    }

    pub fn with_powers(mut self, p: f64, q: f64) -> Self {
        self.p = p;
        self.q = q;
        self
    }

    /// Arrhenius-corrected rate constant at temperature T
    pub fn rate_constant(&self, t: f64) -> f64 {
        self.kappa0 * (-self.activation_energy / R * (1.0 / t - 1.0 / T_REF)).exp()
    }

    /// signed rate from the saturation index Omega = Q/K, gradient included
    pub fn rate(&self, t: f64, omega: &ScalarSens) -> ScalarSens {
        let k = self.rate_constant(t);
        let op = omega.powf(self.p);
        let dim = op.dim();
        let one = ScalarSens::constant(1.0, dim);
        if op.val <= 1.0 {
            (&one - &op).powf(self.q).scale(k)
        } else {
            (&op - &one).powf(self.q).scale(-k)
        }
    }
}

/// a chemical system together with the reactions defined against it
#[derive(Debug, Clone)]
pub struct ReactionSystem {
    system: Arc<ChemicalSystem>,
    reactions: Vec<Reaction>,
}

impl ReactionSystem {
    pub fn new(
        system: Arc<ChemicalSystem>,
        reactions: Vec<Reaction>,
    ) -> Result<Self, ReactionError> {
        for r in &reactions {
            if r.indices.len() != r.stoichiometries.len() {
                return Err(ReactionError::MismatchedLengths {
                    reaction: r.name.clone(),
                    num_species: r.indices.len(),
                    num_stoichiometries: r.stoichiometries.len(),
                });
            }
            for &i in &r.indices {
                if i >= system.num_species() {
                    return Err(ReactionError::DimensionMismatch {
                        found: system.num_species(),
                        expected: i + 1,
                    });
                }
            }
        }
        Ok(Self { system, reactions })
    }

    pub fn system(&self) -> &Arc<ChemicalSystem> {
        &self.system
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    /// reactions x species matrix of stoichiometric coefficients
    pub fn stoichiometric_matrix(&self) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(self.reactions.len(), self.system.num_species());
        for (r, reaction) in self.reactions.iter().enumerate() {
            for (k, &j) in reaction.indices.iter().enumerate() {
                m[(r, j)] = reaction.stoichiometries[k];
            }
        }
        m
    }

    /// rates of all reactions at the given conditions
    pub fn rates(
        &self,
        t: f64,
        p: f64,
        n: &DVector<f64>,
        a: &VectorSens,
    ) -> Result<Vec<ScalarSens>, ReactionError> {
        self.reactions.iter().map(|r| r.rate(t, p, n, a)).collect()
    }
}
