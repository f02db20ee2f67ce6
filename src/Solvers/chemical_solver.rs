use crate::Core::chemical_system::{ChemicalSystem, PhaseKind, SystemError};
use crate::Core::partition::{Partition, PartitionError};
use crate::Core::reaction::ReactionSystem;
use crate::Core::state::ChemicalState;
use crate::Equilibrium::equilibrium_solver::{
    EquilibriumError, EquilibriumOptions, EquilibriumSensitivity, EquilibriumSolver,
};
use crate::Optimization::optimum_state::{Minimizer, OptimumResult};
use crate::Solvers::kinetics_integrator::{KineticsError, KineticsIntegrator};
use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChemicalSolverError {
    #[error("Solver was built without a reaction system, kinetics are unavailable")]
    MissingReactions,
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("Field point index {index} out of range: field has {size} points")]
    InvalidPointIndex { index: usize, size: usize },
    #[error("Phase index {0} out of range")]
    InvalidPhase(usize),
    #[error("Phase {0} is not a fluid phase")]
    NotAFluidPhase(usize),
    #[error("No equilibrium sensitivities stored for field point {0}; run equilibrate first")]
    MissingSensitivity(usize),
    #[error("Zero volume at field point {0}")]
    ZeroVolume(usize),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    System(#[from] SystemError),
}

/// Values of a scalar chemical field over all points together with its
/// sensitivities: `ddt`/`ddp` per point, `ddbe` w.r.t. the molar amounts of
/// the equilibrium elements and `ddnk` w.r.t. the molar amounts of the kinetic
/// species. Row i of every block refers to field point i.
#[derive(Debug, Clone)]
pub struct ChemicalField {
    pub val: DVector<f64>,
    pub ddt: DVector<f64>,
    pub ddp: DVector<f64>,
    pub ddbe: DMatrix<f64>,
    pub ddnk: DMatrix<f64>,
}

impl ChemicalField {
    fn new(size: usize, num_be: usize, num_nk: usize) -> Self {
        Self {
            val: DVector::zeros(size),
            ddt: DVector::zeros(size),
            ddp: DVector::zeros(size),
            ddbe: DMatrix::zeros(size, num_be),
            ddnk: DMatrix::zeros(size, num_nk),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldProperty {
    Porosity,
    Saturation(usize),
    Density(usize),
}

/// Field engine: one chemical system, a field of N sample points with one
/// chemical state each, and batched equilibrium/kinetics calculations over
/// them. Per-point calculations are independent and run on the rayon thread
/// pool; the system and partition are shared read-only.
pub struct ChemicalSolver {
    system: Arc<ChemicalSystem>,
    reactions: Option<ReactionSystem>,
    partition: Partition,
    size: usize,
    states: Vec<ChemicalState>,
    sensitivities: Vec<Option<EquilibriumSensitivity>>,
    options: EquilibriumOptions,
}

impl ChemicalSolver {
    /// solver over a chemical system, every species in the equilibrium partition
    pub fn new(system: Arc<ChemicalSystem>, size: usize) -> Self {
        let partition = Partition::all_equilibrium(&system);
        let states = vec![ChemicalState::new(&system); size];
        Self {
            system,
            reactions: None,
            partition,
            size,
            states,
            sensitivities: vec![None; size],
            options: EquilibriumOptions::default(),
        }
    }

    /// solver over a reaction system; kinetics become available
    pub fn from_reactions(reactions: ReactionSystem, size: usize) -> Self {
        let system = reactions.system().clone();
        let mut solver = Self::new(system, size);
        solver.reactions = Some(reactions);
        solver
    }

    pub fn with_options(mut self, options: EquilibriumOptions) -> Self {
        self.options = options;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn system(&self) -> &Arc<ChemicalSystem> {
        &self.system
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// replace the partition wholesale; stored sensitivities refer to the old
    /// grouping and are discarded
    pub fn set_partition(&mut self, partition: Partition) -> Result<(), ChemicalSolverError> {
        if partition.num_species() != self.system.num_species() {
            return Err(ChemicalSolverError::DimensionMismatch(format!(
                "partition covers {} species, system has {}",
                partition.num_species(),
                self.system.num_species()
            )));
        }
        self.partition = partition;
        self.sensitivities = vec![None; self.size];
        Ok(())
    }

    /// set the chemical state of every field point
    pub fn set_state(&mut self, state: &ChemicalState) -> Result<(), ChemicalSolverError> {
        self.check_state(state)?;
        for s in &mut self.states {
            *s = state.clone();
        }
        self.sensitivities = vec![None; self.size];
        Ok(())
    }

    /// set the chemical state of the listed field points only
    pub fn set_state_at(
        &mut self,
        state: &ChemicalState,
        indices: &[usize],
    ) -> Result<(), ChemicalSolverError> {
        self.check_state(state)?;
        for &i in indices {
            if i >= self.size {
                return Err(ChemicalSolverError::InvalidPointIndex {
                    index: i,
                    size: self.size,
                });
            }
        }
        for &i in indices {
            self.states[i] = state.clone();
            self.sensitivities[i] = None;
        }
        Ok(())
    }

    fn check_state(&self, state: &ChemicalState) -> Result<(), ChemicalSolverError> {
        if state.n.len() != self.system.num_species() {
            return Err(ChemicalSolverError::DimensionMismatch(format!(
                "state has {} species amounts, system has {} species",
                state.n.len(),
                self.system.num_species()
            )));
        }
        Ok(())
    }

    pub fn state(&self, i: usize) -> Result<&ChemicalState, ChemicalSolverError> {
        self.states.get(i).ok_or(ChemicalSolverError::InvalidPointIndex {
            index: i,
            size: self.size,
        })
    }

    pub fn states(&self) -> &[ChemicalState] {
        &self.states
    }

    /// Equilibrate every field point independently at temperature `t[i]`,
    /// pressure `p[i]` and equilibrium element amounts `be[i*E..(i+1)*E]`
    /// (row-major, E = number of equilibrium elements), warm-starting each
    /// point from its current state. Points are processed in parallel; a
    /// failure at one point is reported in its slot of the returned vector and
    /// leaves that point's previous state intact, without affecting the others.
    pub fn equilibrate(
        &mut self,
        minimizer: &dyn Minimizer,
        t: &[f64],
        p: &[f64],
        be: &[f64],
    ) -> Result<Vec<Result<OptimumResult, EquilibriumError>>, ChemicalSolverError> {
        let me = self.partition.num_equilibrium_elements();
        if t.len() != self.size || p.len() != self.size {
            return Err(ChemicalSolverError::DimensionMismatch(format!(
                "temperature/pressure arrays have lengths {}/{}, field has {} points",
                t.len(),
                p.len(),
                self.size
            )));
        }
        if be.len() != self.size * me {
            return Err(ChemicalSolverError::DimensionMismatch(format!(
                "element amount array has length {}, expected {} points x {} elements",
                be.len(),
                self.size,
                me
            )));
        }
        info!("equilibrating field of {} points", self.size);
        let solver = EquilibriumSolver::new(self.system.clone(), self.partition.clone())
            .with_options(self.options.clone());

        let results: Vec<Result<OptimumResult, EquilibriumError>> = self
            .states
            .par_iter_mut()
            .zip(self.sensitivities.par_iter_mut())
            .enumerate()
            .map(|(i, (state, sens))| {
                let bei = DVector::from_row_slice(&be[i * me..(i + 1) * me]);
                let result = solver.solve(minimizer, state, t[i], p[i], &bei)?;
                match solver.sensitivity(state) {
                    Ok(s) => {
                        *sens = Some(s);
                        Ok(result)
                    }
                    Err(e) => {
                        *sens = None;
                        Err(e)
                    }
                }
            })
            .collect();

        for (i, r) in results.iter().enumerate() {
            if let Err(e) = r {
                warn!("equilibrium failed at field point {}: {}", i, e);
            }
        }
        Ok(results)
    }

    /// Advance the kinetic reactions at every field point from time `t` over
    /// the step `dt`, using each point's current state as the background
    /// composition. Parallel per point with per-point failure reporting.
    pub fn react(
        &mut self,
        integrator: &dyn KineticsIntegrator,
        t: f64,
        dt: f64,
    ) -> Result<Vec<Result<(), KineticsError>>, ChemicalSolverError> {
        let reactions = self
            .reactions
            .as_ref()
            .ok_or(ChemicalSolverError::MissingReactions)?;
        let partition = &self.partition;
        let results: Vec<Result<(), KineticsError>> = self
            .states
            .par_iter_mut()
            .map(|state| integrator.integrate(reactions, partition, state, t, dt))
            .collect();
        for (i, r) in results.iter().enumerate() {
            if let Err(e) = r {
                warn!("kinetic step failed at field point {}: {}", i, e);
            }
        }
        Ok(results)
    }

    /// porosity field: 1 - (solid volume)/(total volume)
    pub fn porosity(&self) -> Result<ChemicalField, ChemicalSolverError> {
        self.field(FieldProperty::Porosity, false)
    }

    /// porosity field with sensitivity rows
    pub fn porosity_with_diff(&self) -> Result<ChemicalField, ChemicalSolverError> {
        self.field(FieldProperty::Porosity, true)
    }

    /// saturation field of a fluid phase: phase volume / total fluid volume
    pub fn saturation(&self, iphase: usize) -> Result<ChemicalField, ChemicalSolverError> {
        self.check_fluid_phase(iphase)?;
        self.field(FieldProperty::Saturation(iphase), false)
    }

    pub fn saturation_with_diff(
        &self,
        iphase: usize,
    ) -> Result<ChemicalField, ChemicalSolverError> {
        self.check_fluid_phase(iphase)?;
        self.field(FieldProperty::Saturation(iphase), true)
    }

    /// density field of a phase: phase mass / phase volume, g/m3
    pub fn density(&self, iphase: usize) -> Result<ChemicalField, ChemicalSolverError> {
        self.check_phase(iphase)?;
        self.field(FieldProperty::Density(iphase), false)
    }

    pub fn density_with_diff(&self, iphase: usize) -> Result<ChemicalField, ChemicalSolverError> {
        self.check_phase(iphase)?;
        self.field(FieldProperty::Density(iphase), true)
    }

    fn check_phase(&self, iphase: usize) -> Result<(), ChemicalSolverError> {
        if iphase >= self.system.num_phases() {
            return Err(ChemicalSolverError::InvalidPhase(iphase));
        }
        Ok(())
    }

    fn check_fluid_phase(&self, iphase: usize) -> Result<(), ChemicalSolverError> {
        self.check_phase(iphase)?;
        if self.system.phases()[iphase].kind != PhaseKind::Fluid {
            return Err(ChemicalSolverError::NotAFluidPhase(iphase));
        }
        Ok(())
    }

    /// value and full-species derivative of one property at one state; the
    /// value path is shared by the plain and `_with_diff` accessors so both
    /// report bit-identical values
    fn property_with_ddn(
        &self,
        ipoint: usize,
        state: &ChemicalState,
        property: FieldProperty,
    ) -> Result<(f64, DVector<f64>), ChemicalSolverError> {
        let species = self.system.species();
        let phases = self.system.phases();
        let num_species = self.system.num_species();
        let mut ddn = DVector::zeros(num_species);
        match property {
            FieldProperty::Porosity => {
                let mut vs = 0.0;
                let mut vt = 0.0;
                for phase in phases {
                    for &i in &phase.ispecies {
                        let v = state.n[i] * species[i].molar_volume;
                        vt += v;
                        if phase.kind == PhaseKind::Solid {
                            vs += v;
                        }
                    }
                }
                if vt <= 0.0 {
                    return Err(ChemicalSolverError::ZeroVolume(ipoint));
                }
                let val = 1.0 - vs / vt;
                for phase in phases {
                    let solid = phase.kind == PhaseKind::Solid;
                    for &i in &phase.ispecies {
                        let vi = species[i].molar_volume;
                        let si = if solid { 1.0 } else { 0.0 };
                        ddn[i] = -(si * vi * vt - vs * vi) / (vt * vt);
                    }
                }
                Ok((val, ddn))
            }
            FieldProperty::Saturation(iphase) => {
                let mut vf = 0.0;
                for phase in phases {
                    if phase.kind != PhaseKind::Fluid {
                        continue;
                    }
                    for &i in &phase.ispecies {
                        vf += state.n[i] * species[i].molar_volume;
                    }
                }
                if vf <= 0.0 {
                    return Err(ChemicalSolverError::ZeroVolume(ipoint));
                }
                let vp: f64 = phases[iphase]
                    .ispecies
                    .iter()
                    .map(|&i| state.n[i] * species[i].molar_volume)
                    .sum();
                let val = vp / vf;
                let in_phase = |i: usize| phases[iphase].ispecies.contains(&i);
                for phase in phases {
                    if phase.kind != PhaseKind::Fluid {
                        continue;
                    }
                    for &i in &phase.ispecies {
                        let vi = species[i].molar_volume;
                        let pi = if in_phase(i) { 1.0 } else { 0.0 };
                        ddn[i] = (pi * vi * vf - vp * vi) / (vf * vf);
                    }
                }
                Ok((val, ddn))
            }
            FieldProperty::Density(iphase) => {
                let mut mass = 0.0;
                let mut vol = 0.0;
                for &i in &phases[iphase].ispecies {
                    mass += state.n[i] * species[i].molar_mass;
                    vol += state.n[i] * species[i].molar_volume;
                }
                if vol <= 0.0 {
                    return Err(ChemicalSolverError::ZeroVolume(ipoint));
                }
                let val = mass / vol;
                for &i in &phases[iphase].ispecies {
                    let mi = species[i].molar_mass;
                    let vi = species[i].molar_volume;
                    ddn[i] = (mi * vol - mass * vi) / (vol * vol);
                }
                Ok((val, ddn))
            }
        }
    }

    fn field(
        &self,
        property: FieldProperty,
        with_diff: bool,
    ) -> Result<ChemicalField, ChemicalSolverError> {
        let me = self.partition.num_equilibrium_elements();
        let nk = self.partition.num_kinetic_species();
        let mut field = ChemicalField::new(self.size, me, nk);
        for (i, state) in self.states.iter().enumerate() {
            let (val, ddn) = self.property_with_ddn(i, state, property)?;
            field.val[i] = val;
            if !with_diff {
                continue;
            }
            let sens = self.sensitivities[i]
                .as_ref()
                .ok_or(ChemicalSolverError::MissingSensitivity(i))?;
            let ddn_e = self.partition.equilibrium_rows(&ddn)?;
            let ddn_k = self.partition.kinetic_rows(&ddn)?;
            field.ddt[i] = ddn_e.dot(&sens.dndt);
            field.ddp[i] = ddn_e.dot(&sens.dndp);
            let ddbe_row = sens.dndb.transpose() * &ddn_e;
            field.ddbe.row_mut(i).copy_from(&ddbe_row.transpose());
            field.ddnk.row_mut(i).copy_from(&ddn_k.transpose());
        }
        Ok(field)
    }
}
