use crate::Core::chemical_system::{ChemicalSystem, SystemError};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// chemical state of one sample point: temperature (K), pressure (Pa) and the
/// molar amounts of all species of the parent system (mol)
#[allow(non_snake_case)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChemicalState {
    pub T: f64,
    pub P: f64,
    pub n: DVector<f64>,
}

impl ChemicalState {
    /// a zeroed state sized for the given system, at standard conditions
    pub fn new(system: &ChemicalSystem) -> Self {
        Self {
            T: 298.15,
            P: 1.0e5,
            n: DVector::zeros(system.num_species()),
        }
    }

    pub fn set_temperature(&mut self, t: f64) -> &mut Self {
        self.T = t;
        self
    }

    pub fn set_pressure(&mut self, p: f64) -> &mut Self {
        self.P = p;
        self
    }

    pub fn set_species_amount(&mut self, i: usize, amount: f64) -> Result<&mut Self, SystemError> {
        if i >= self.n.len() {
            return Err(SystemError::DimensionMismatch(format!(
                "species index {} out of range {}",
                i,
                self.n.len()
            )));
        }
        self.n[i] = amount;
        Ok(self)
    }

    pub fn set_species_amount_by_name(
        &mut self,
        system: &ChemicalSystem,
        name: &str,
        amount: f64,
    ) -> Result<&mut Self, SystemError> {
        let i = system.index_of_species(name)?;
        self.set_species_amount(i, amount)
    }

    pub fn species_amount(&self, i: usize) -> f64 {
        self.n[i]
    }

    /// total molar amount of a phase
    pub fn phase_amount(&self, system: &ChemicalSystem, iphase: usize) -> Result<f64, SystemError> {
        let phases = system.phases();
        let phase = phases.get(iphase).ok_or_else(|| {
            SystemError::PhaseNotFound(format!("phase index {} out of range", iphase))
        })?;
        Ok(phase.ispecies.iter().map(|&i| self.n[i]).sum())
    }

    /// volume of a phase from the standard molar volumes, m3
    pub fn phase_volume(&self, system: &ChemicalSystem, iphase: usize) -> Result<f64, SystemError> {
        let phases = system.phases();
        let phase = phases.get(iphase).ok_or_else(|| {
            SystemError::PhaseNotFound(format!("phase index {} out of range", iphase))
        })?;
        Ok(phase
            .ispecies
            .iter()
            .map(|&i| self.n[i] * system.species()[i].molar_volume)
            .sum())
    }

    /// elemental amounts b = A * n of this state
    pub fn element_amounts(&self, system: &ChemicalSystem) -> Result<DVector<f64>, SystemError> {
        system.element_amounts(&self.n)
    }
}
