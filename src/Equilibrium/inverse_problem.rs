use crate::Core::chemical_system::{ChemicalSystem, SystemError};
use crate::Core::formulas;
use crate::Core::partition::{Partition, PartitionError};
use crate::Core::state::ChemicalState;
use crate::Equilibrium::equilibrium_solver::EquilibriumSensitivity;
use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InverseProblemError {
    #[error("Cannot add to an inverse problem that is already sealed")]
    AlreadySealed,
    #[error("Residuals requested before the inverse problem was sealed")]
    NotSealed,
    #[error("Cannot resolve titrant '{0}' to an elemental formula")]
    UnresolvedTitrant(String),
    #[error("Titrant '{0}' is already registered")]
    DuplicateTitrant(String),
    #[error("Mutual exclusion refers to unregistered titrant '{0}'")]
    UnregisteredTitrant(String),
    #[error("Initial element amounts must be set before sealing the problem")]
    MissingInitialAmounts,
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
}

/// the four kinds of equilibrium constraints; each shares the residual
/// contract `residual = measured - target`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConstraintKind {
    SpeciesActivity { ispecies: usize },
    SpeciesAmount { ispecies: usize },
    PhaseAmount { iphase: usize },
    PhaseVolume { iphase: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EquilibriumConstraint {
    kind: ConstraintKind,
    target: f64,
}

/// residuals of the equilibrium constraints and their partial derivatives
/// with respect to the titrant amounts x and the species amounts n
#[derive(Debug, Clone)]
pub struct ResidualEquilibriumConstraints {
    pub val: DVector<f64>,
    pub ddx: DMatrix<f64>,
    pub ddn: DMatrix<f64>,
}

/// An inverse equilibrium problem: equilibrium constraints whose targets must
/// be met by adjusting unknown amounts of registered titrants. Constraints and
/// titrants accumulate during the building phase; `seal` switches the problem
/// into the solving phase, after which `residual_equilibrium_constraints` may
/// be evaluated repeatedly by an external root finder and no further additions
/// are accepted.
pub struct EquilibriumInverseProblem {
    system: Arc<ChemicalSystem>,
    partition: Partition,
    constraints: Vec<EquilibriumConstraint>,
    /// registration order defines the column order of the titrant formula matrix
    titrants: Vec<(String, HashMap<String, f64>)>,
    mutually_exclusive: Vec<(String, String)>,
    b0: Option<DVector<f64>>,
    sealed: bool,
}

impl EquilibriumInverseProblem {
    pub fn new(system: Arc<ChemicalSystem>, partition: Partition) -> Self {
        Self {
            system,
            partition,
            constraints: Vec::new(),
            titrants: Vec::new(),
            mutually_exclusive: Vec::new(),
            b0: None,
            sealed: false,
        }
    }

    fn check_building(&self) -> Result<(), InverseProblemError> {
        if self.sealed {
            return Err(InverseProblemError::AlreadySealed);
        }
        Ok(())
    }

    /// constrain the activity of a species to a target value
    pub fn add_species_activity_constraint(
        &mut self,
        species: &str,
        value: f64,
    ) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        let ispecies = self.system.index_of_species(species)?;
        self.constraints.push(EquilibriumConstraint {
            kind: ConstraintKind::SpeciesActivity { ispecies },
            target: value,
        });
        Ok(self)
    }

    /// constrain the molar amount of a species, mol
    pub fn add_species_amount_constraint(
        &mut self,
        species: &str,
        value: f64,
    ) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        let ispecies = self.system.index_of_species(species)?;
        self.constraints.push(EquilibriumConstraint {
            kind: ConstraintKind::SpeciesAmount { ispecies },
            target: value,
        });
        Ok(self)
    }

    /// constrain the total molar amount of a phase, mol
    pub fn add_phase_amount_constraint(
        &mut self,
        phase: &str,
        value: f64,
    ) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        let iphase = self.system.index_of_phase(phase)?;
        self.constraints.push(EquilibriumConstraint {
            kind: ConstraintKind::PhaseAmount { iphase },
            target: value,
        });
        Ok(self)
    }

    /// constrain the volume of a phase, m3
    pub fn add_phase_volume_constraint(
        &mut self,
        phase: &str,
        value: f64,
    ) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        let iphase = self.system.index_of_phase(phase)?;
        self.constraints.push(EquilibriumConstraint {
            kind: ConstraintKind::PhaseVolume { iphase },
            target: value,
        });
        Ok(self)
    }

    /// register a titrant with an explicit elemental formula, e.g.
    /// `add_titrant("HCl", [("H", 1.0), ("Cl", 1.0)])`
    pub fn add_titrant(
        &mut self,
        name: &str,
        formula: HashMap<String, f64>,
    ) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        if self.titrants.iter().any(|(t, _)| t == name) {
            return Err(InverseProblemError::DuplicateTitrant(name.to_string()));
        }
        self.titrants.push((name.to_string(), formula));
        Ok(self)
    }

    /// register a titrant by name only: the formula is looked up among the
    /// system species first and parsed as a compound formula otherwise
    pub fn add_titrant_by_name(&mut self, name: &str) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        let formula = match self.system.index_of_species(name) {
            Ok(i) => self.system.species()[i].formula.clone(),
            Err(_) => formulas::parse_formula(name)
                .map_err(|_| InverseProblemError::UnresolvedTitrant(name.to_string()))?,
        };
        self.add_titrant(name, formula)
    }

    /// register every species of a phase as an individual titrant
    pub fn add_titrants_of_phase(&mut self, phase: &str) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        let iphase = self.system.index_of_phase(phase)?;
        let ispecies = self.system.phases()[iphase].ispecies.clone();
        for i in ispecies {
            let species = &self.system.species()[i];
            let name = species.name.clone();
            let formula = species.formula.clone();
            self.add_titrant(&name, formula)?;
        }
        Ok(self)
    }

    /// Mark two titrants as mutually exclusive: in a feasible solution at most
    /// one of their amounts is strictly positive. This is a constraint-shape
    /// hint recorded for the outer solver, not enforced here.
    pub fn set_as_mutually_exclusive(
        &mut self,
        titrant1: &str,
        titrant2: &str,
    ) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        for t in [titrant1, titrant2] {
            if !self.titrants.iter().any(|(name, _)| name == t) {
                return Err(InverseProblemError::UnregisteredTitrant(t.to_string()));
            }
        }
        self.mutually_exclusive
            .push((titrant1.to_string(), titrant2.to_string()));
        Ok(self)
    }

    /// set the molar amounts of the equilibrium elements before any titrant is
    /// added; required before the problem can be sealed
    pub fn set_initial_element_amounts(
        &mut self,
        b0: DVector<f64>,
    ) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        let me = self.partition.num_equilibrium_elements();
        if b0.len() != me {
            return Err(InverseProblemError::DimensionMismatch(format!(
                "initial element amounts have length {}, equilibrium partition has {} elements",
                b0.len(),
                me
            )));
        }
        self.b0 = Some(b0);
        Ok(self)
    }

    /// end the building phase; residual evaluations are only accepted after
    /// this call and additions are rejected from now on
    pub fn seal(&mut self) -> Result<&mut Self, InverseProblemError> {
        self.check_building()?;
        if self.b0.is_none() {
            return Err(InverseProblemError::MissingInitialAmounts);
        }
        self.sealed = true;
        info!(
            "inverse problem sealed: {} constraints, {} titrants",
            self.constraints.len(),
            self.titrants.len()
        );
        Ok(self)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// true when the problem has no equilibrium constraints
    pub fn empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn num_titrants(&self) -> usize {
        self.titrants.len()
    }

    pub fn titrant_names(&self) -> Vec<&str> {
        self.titrants.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn mutually_exclusive_pairs(&self) -> &[(String, String)] {
        &self.mutually_exclusive
    }

    /// The formula matrix of the titrants: entry (j, i) is the stoichiometric
    /// coefficient of the j-th equilibrium element in the i-th titrant, zero
    /// where an element is absent. Rows follow the equilibrium element order
    /// of the partition (the basis of b0), columns the registration order.
    pub fn formula_matrix_titrants(&self) -> DMatrix<f64> {
        let ielements = self.partition.indices_equilibrium_elements();
        let mut w = DMatrix::zeros(ielements.len(), self.titrants.len());
        for (col, (_, formula)) in self.titrants.iter().enumerate() {
            for (row, &ielement) in ielements.iter().enumerate() {
                let symbol = &self.system.elements()[ielement];
                if let Some(&coeff) = formula.get(symbol) {
                    w[(row, col)] = coeff;
                }
            }
        }
        w
    }

    /// the elemental amounts of the equilibrium partition before titrant
    /// injection; an error when not yet set
    pub fn initial_element_amounts(&self) -> Result<DVector<f64>, InverseProblemError> {
        self.b0
            .clone()
            .ok_or(InverseProblemError::MissingInitialAmounts)
    }

    /// Residuals of the equilibrium constraints at titrant amounts `x` and the
    /// equilibrated `state`, with both Jacobian blocks: `ddx` chains
    /// d(measured)/dn through the equilibrium sensitivity dn/db and the
    /// titrant formula matrix (titrant amounts perturb the elemental input
    /// amounts, which perturb the equilibrium amounts); `ddn` is the direct
    /// derivative with respect to the species amounts.
    pub fn residual_equilibrium_constraints(
        &self,
        x: &DVector<f64>,
        state: &ChemicalState,
        sensitivity: &EquilibriumSensitivity,
    ) -> Result<ResidualEquilibriumConstraints, InverseProblemError> {
        if !self.sealed {
            return Err(InverseProblemError::NotSealed);
        }
        if x.len() != self.titrants.len() {
            return Err(InverseProblemError::DimensionMismatch(format!(
                "titrant amount vector has length {}, problem has {} titrants",
                x.len(),
                self.titrants.len()
            )));
        }
        let num_species = self.system.num_species();
        if state.n.len() != num_species {
            return Err(InverseProblemError::DimensionMismatch(format!(
                "state has {} species amounts, system has {} species",
                state.n.len(),
                num_species
            )));
        }
        let ne = self.partition.num_equilibrium_species();
        let me = self.partition.num_equilibrium_elements();
        if sensitivity.dndb.nrows() != ne || sensitivity.dndb.ncols() != me {
            return Err(InverseProblemError::DimensionMismatch(format!(
                "equilibrium sensitivity dndb is {}x{}, expected {}x{}",
                sensitivity.dndb.nrows(),
                sensitivity.dndb.ncols(),
                ne,
                me
            )));
        }

        let num = self.constraints.len();
        let mut val = DVector::zeros(num);
        let mut ddn = DMatrix::zeros(num, num_species);

        // activities are needed only when an activity constraint is present
        let activities = if self
            .constraints
            .iter()
            .any(|c| matches!(c.kind, ConstraintKind::SpeciesActivity { .. }))
        {
            Some(self.system.activities(state.T, state.P, &state.n)?)
        } else {
            None
        };

        for (k, constraint) in self.constraints.iter().enumerate() {
            match constraint.kind {
                ConstraintKind::SpeciesActivity { ispecies } => {
                    // the option is filled whenever this arm is reachable
                    if let Some(a) = &activities {
                        val[k] = a.val[ispecies] - constraint.target;
                        ddn.row_mut(k).copy_from(&a.grad.row(ispecies));
                    }
                }
                ConstraintKind::SpeciesAmount { ispecies } => {
                    val[k] = state.n[ispecies] - constraint.target;
                    ddn[(k, ispecies)] = 1.0;
                }
                ConstraintKind::PhaseAmount { iphase } => {
                    let phase = &self.system.phases()[iphase];
                    val[k] = phase.ispecies.iter().map(|&i| state.n[i]).sum::<f64>()
                        - constraint.target;
                    for &i in &phase.ispecies {
                        ddn[(k, i)] = 1.0;
                    }
                }
                ConstraintKind::PhaseVolume { iphase } => {
                    let phase = &self.system.phases()[iphase];
                    val[k] = phase
                        .ispecies
                        .iter()
                        .map(|&i| state.n[i] * self.system.species()[i].molar_volume)
                        .sum::<f64>()
                        - constraint.target;
                    for &i in &phase.ispecies {
                        ddn[(k, i)] = self.system.species()[i].molar_volume;
                    }
                }
            }
        }

        // chain rule: d(residual)/dx = d(measured)/dn_e * dn_e/db_e * db_e/dx
        let ddn_e = self.partition.equilibrium_cols(&ddn)?;
        let w = self.formula_matrix_titrants();
        let ddx = &ddn_e * &sensitivity.dndb * &w;

        Ok(ResidualEquilibriumConstraints { val, ddx, ddn })
    }
}
