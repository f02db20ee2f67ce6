use crate::Core::formulas::{self, FormulaError};
use crate::Core::sensitivity::VectorSens;
use enum_dispatch::enum_dispatch;
use nalgebra::{DMatrix, DVector};
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// chemical potential of one species as a function of (T, P); supplied by an
/// external thermodynamic property provider and consumed as an opaque closure
pub type ChemicalPotentialFn = Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>;

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Species not found: {0}")]
    SpeciesNotFound(String),
    #[error("Element not found: {0}")]
    ElementNotFound(String),
    #[error("Phase not found: {0}")]
    PhaseNotFound(String),
    #[error("Duplicate species name: {0}")]
    DuplicateSpecies(String),
    #[error("Phase '{0}' has no species")]
    EmptyPhase(String),
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error(transparent)]
    FormulaError(#[from] FormulaError),
}

/// one chemical species: name, elemental formula, molar mass and volume, and
/// the chemical potential closure captured from the property provider
#[derive(Clone)]
pub struct Species {
    pub name: String,
    pub formula: HashMap<String, f64>,
    /// molar mass in g/mol
    pub molar_mass: f64,
    /// standard molar volume in m3/mol
    pub molar_volume: f64,
    pub chemical_potential: ChemicalPotentialFn,
}

impl fmt::Debug for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Species")
            .field("name", &self.name)
            .field("formula", &self.formula)
            .field("molar_mass", &self.molar_mass)
            .field("molar_volume", &self.molar_volume)
            .finish()
    }
}

impl Species {
    /// create a species, parsing its elemental composition and molar mass from
    /// the formula string ("H2O", "Ca+2", "Na(NO3)2")
    pub fn new(name: &str, formula: &str) -> Result<Self, SystemError> {
        let (molar_mass, composition) = formulas::calculate_molar_mass(formula)?;
        Ok(Self {
            name: name.to_string(),
            formula: composition,
            molar_mass,
            molar_volume: 1.0e-5,
            chemical_potential: Arc::new(|_, _| 0.0),
        })
    }

    /// create a species from an explicit elemental composition map
    pub fn from_composition(name: &str, formula: HashMap<String, f64>) -> Result<Self, SystemError> {
        let molar_mass = formulas::molar_mass_of(&formula)?;
        Ok(Self {
            name: name.to_string(),
            formula,
            molar_mass,
            molar_volume: 1.0e-5,
            chemical_potential: Arc::new(|_, _| 0.0),
        })
    }

    pub fn with_molar_volume(mut self, v: f64) -> Self {
        self.molar_volume = v;
        self
    }

    pub fn with_molar_mass(mut self, m: f64) -> Self {
        self.molar_mass = m;
        self
    }

    /// attach the chemical potential function from the property provider
    pub fn with_chemical_potential(
        mut self,
        mu: impl Fn(f64, f64) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.chemical_potential = Arc::new(mu);
        self
    }

    /// constant standard chemical potential, J/mol
    pub fn with_standard_potential(self, mu0: f64) -> Self {
        self.with_chemical_potential(move |_, _| mu0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseKind {
    Fluid,
    Solid,
}

/// a phase groups species indices of the parent system
#[derive(Debug, Clone)]
pub struct Phase {
    pub name: String,
    pub kind: PhaseKind,
    pub ispecies: Vec<usize>,
}

/// capability interface of the activity model: given (T, P, n) return the
/// species activities together with their derivatives w.r.t. molar amounts
#[enum_dispatch]
pub trait ActivityModel {
    fn activities(&self, t: f64, p: f64, n: &DVector<f64>, phases: &[Phase]) -> VectorSens;
}

/// ideal mixture: the activity of a species is its mole fraction in its phase,
/// a_i = n_i / N_p, with the analytic gradient
/// da_i/dn_j = (delta_ij * N_p - n_i) / N_p^2 for j in the same phase.
/// An empty phase (N_p = 0) yields zero activities and zero gradient rows.
#[derive(Debug, Clone, Default)]
pub struct IdealActivityModel;

impl ActivityModel for IdealActivityModel {
    fn activities(&self, _t: f64, _p: f64, n: &DVector<f64>, phases: &[Phase]) -> VectorSens {
        let size = n.len();
        let mut a = VectorSens::zeros(size, size);
        for phase in phases {
            let np: f64 = phase.ispecies.iter().map(|&i| n[i]).sum();
            if np <= 0.0 {
                continue;
            }
            for &i in &phase.ispecies {
                a.val[i] = n[i] / np;
                for &j in &phase.ispecies {
                    let delta = if i == j { 1.0 } else { 0.0 };
                    a.grad[(i, j)] = (delta * np - n[i]) / (np * np);
                }
            }
        }
        a
    }
}

/// unit activities for pure condensed phases: a_i = 1 with zero gradient
#[derive(Debug, Clone, Default)]
pub struct UnitActivityModel;

impl ActivityModel for UnitActivityModel {
    fn activities(&self, _t: f64, _p: f64, n: &DVector<f64>, _phases: &[Phase]) -> VectorSens {
        let size = n.len();
        let mut a = VectorSens::zeros(size, size);
        for i in 0..size {
            a.val[i] = 1.0;
        }
        a
    }
}

/// dispatch enum over the available activity models; external models are added
/// here as new variants
#[derive(Debug, Clone)]
#[enum_dispatch(ActivityModel)]
pub enum ActivityModelEnum {
    Ideal(IdealActivityModel),
    Unit(UnitActivityModel),
}

/// builder collecting phases with their species before the system is assembled
pub struct ChemicalSystemBuilder {
    phases: Vec<(String, PhaseKind, Vec<Species>)>,
}

impl ChemicalSystemBuilder {
    pub fn new() -> Self {
        Self { phases: Vec::new() }
    }

    pub fn add_phase(&mut self, name: &str, kind: PhaseKind, species: Vec<Species>) -> &mut Self {
        self.phases.push((name.to_string(), kind, species));
        self
    }

    /// assemble the system: assign global species indices, collect the sorted
    /// element list and build the elements x species formula matrix
    pub fn build(self, activity_model: ActivityModelEnum) -> Result<ChemicalSystem, SystemError> {
        let mut species: Vec<Species> = Vec::new();
        let mut phases: Vec<Phase> = Vec::new();
        let mut species_phase: Vec<usize> = Vec::new();
        for (iphase, (name, kind, phase_species)) in self.phases.into_iter().enumerate() {
            if phase_species.is_empty() {
                return Err(SystemError::EmptyPhase(name));
            }
            let mut ispecies = Vec::new();
            for s in phase_species {
                if species.iter().any(|t| t.name == s.name) {
                    return Err(SystemError::DuplicateSpecies(s.name));
                }
                ispecies.push(species.len());
                species.push(s);
                species_phase.push(iphase);
            }
            phases.push(Phase {
                name,
                kind,
                ispecies,
            });
        }
        let mut elements: Vec<String> = species
            .iter()
            .flat_map(|s| s.formula.keys().cloned())
            .collect();
        elements.sort();
        elements.dedup();

        let mut formula_matrix = DMatrix::zeros(elements.len(), species.len());
        for (j, s) in species.iter().enumerate() {
            for (el, cnt) in &s.formula {
                if let Some(i) = elements.iter().position(|e| e == el) {
                    formula_matrix[(i, j)] = *cnt;
                }
            }
        }
        Ok(ChemicalSystem {
            species,
            elements,
            phases,
            species_phase,
            formula_matrix,
            activity_model,
        })
    }
}

/// the chemical system: species, elements, phases, the elemental formula
/// matrix and the activity model; read-only once constructed, safe to share
/// across parallel field-point calculations
#[derive(Debug, Clone)]
pub struct ChemicalSystem {
    species: Vec<Species>,
    elements: Vec<String>,
    phases: Vec<Phase>,
    species_phase: Vec<usize>,
    formula_matrix: DMatrix<f64>,
    activity_model: ActivityModelEnum,
}

impl ChemicalSystem {
    pub fn num_species(&self) -> usize {
        self.species.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_phases(&self) -> usize {
        self.phases.len()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// index of the phase the species with global index `i` belongs to
    pub fn phase_of_species(&self, i: usize) -> usize {
        self.species_phase[i]
    }

    /// the elements x species formula matrix A, A[(i, j)] = count of element i
    /// in the formula of species j
    pub fn formula_matrix(&self) -> &DMatrix<f64> {
        &self.formula_matrix
    }

    pub fn index_of_species(&self, name: &str) -> Result<usize, SystemError> {
        self.species
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| SystemError::SpeciesNotFound(name.to_string()))
    }

    pub fn index_of_element(&self, symbol: &str) -> Result<usize, SystemError> {
        self.elements
            .iter()
            .position(|e| e == symbol)
            .ok_or_else(|| SystemError::ElementNotFound(symbol.to_string()))
    }

    pub fn index_of_phase(&self, name: &str) -> Result<usize, SystemError> {
        self.phases
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| SystemError::PhaseNotFound(name.to_string()))
    }

    /// elemental amounts b = A * n
    pub fn element_amounts(&self, n: &DVector<f64>) -> Result<DVector<f64>, SystemError> {
        if n.len() != self.num_species() {
            return Err(SystemError::DimensionMismatch(format!(
                "species amount vector has length {}, system has {} species",
                n.len(),
                self.num_species()
            )));
        }
        Ok(&self.formula_matrix * n)
    }

    /// species activities with their molar-amount derivatives, from the
    /// configured activity model
    pub fn activities(&self, t: f64, p: f64, n: &DVector<f64>) -> Result<VectorSens, SystemError> {
        if n.len() != self.num_species() {
            return Err(SystemError::DimensionMismatch(format!(
                "species amount vector has length {}, system has {} species",
                n.len(),
                self.num_species()
            )));
        }
        Ok(self.activity_model.activities(t, p, n, &self.phases))
    }

    /// chemical potentials of all species at (T, P)
    pub fn chemical_potentials(&self, t: f64, p: f64) -> DVector<f64> {
        DVector::from_iterator(
            self.num_species(),
            self.species.iter().map(|s| (s.chemical_potential)(t, p)),
        )
    }

    /// print a human-readable table of phases, species and elemental composition
    pub fn print_summary(&self) {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("Phase"),
            Cell::new("Species"),
            Cell::new("Formula"),
            Cell::new("M, g/mol"),
        ]));
        for phase in &self.phases {
            for &i in &phase.ispecies {
                let s = &self.species[i];
                let mut formula: Vec<String> = s
                    .formula
                    .iter()
                    .map(|(el, cnt)| format!("{}:{}", el, cnt))
                    .collect();
                formula.sort();
                table.add_row(Row::new(vec![
                    Cell::new(&phase.name),
                    Cell::new(&s.name),
                    Cell::new(&formula.join(" ")),
                    Cell::new(&format!("{:.3}", s.molar_mass)),
                ]));
            }
        }
        table.printstd();
        println!("elements: {:?}", self.elements);
    }
}
