use crate::Core::chemical_system::ChemicalSystem;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Species index {index} out of range: system has {num_species} species")]
    InvalidIndex { index: usize, num_species: usize },
    #[error("Species index {0} appears in more than one subset")]
    OverlappingSubsets(usize),
    #[error("Subsets cover {covered} species, system has {num_species}")]
    IncompleteCover { covered: usize, num_species: usize },
    #[error("Unknown species: {0}")]
    UnknownSpecies(String),
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// classification of one species index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesGroup {
    Equilibrium,
    Kinetic,
    Inert,
}

/// Partitioning of the species of a chemical system into three disjoint
/// subsets: equilibrium (amounts found by Gibbs energy minimization), kinetic
/// (amounts advanced by rate laws) and inert (amounts fixed). The element
/// subsets are derived from the species subsets; an element present in species
/// of several subsets is resolved by the precedence
/// equilibrium > kinetic > inert.
///
/// A partition is immutable once constructed; to change the grouping, build a
/// new one and replace it wholesale.
#[derive(Debug, Clone)]
pub struct Partition {
    num_species: usize,
    num_elements: usize,
    ispecies_equilibrium: Vec<usize>,
    ispecies_kinetic: Vec<usize>,
    ispecies_inert: Vec<usize>,
    ielements_equilibrium: Vec<usize>,
    ielements_kinetic: Vec<usize>,
    ielements_inert: Vec<usize>,
}

impl Partition {
    /// partition with every species in the equilibrium subset
    pub fn all_equilibrium(system: &ChemicalSystem) -> Self {
        // every element appears in some species formula, so both derived sets
        // are the full index ranges
        Self {
            num_species: system.num_species(),
            num_elements: system.num_elements(),
            ispecies_equilibrium: (0..system.num_species()).collect(),
            ispecies_kinetic: Vec::new(),
            ispecies_inert: Vec::new(),
            ielements_equilibrium: (0..system.num_elements()).collect(),
            ielements_kinetic: Vec::new(),
            ielements_inert: Vec::new(),
        }
    }

    /// build a partition from explicit index lists; fails fast on out-of-range
    /// indices, overlapping subsets or an incomplete cover
    pub fn new(
        system: &ChemicalSystem,
        ispecies_equilibrium: Vec<usize>,
        ispecies_kinetic: Vec<usize>,
        ispecies_inert: Vec<usize>,
    ) -> Result<Self, PartitionError> {
        let num_species = system.num_species();
        let num_elements = system.num_elements();
        let mut seen = vec![false; num_species];
        for &i in ispecies_equilibrium
            .iter()
            .chain(ispecies_kinetic.iter())
            .chain(ispecies_inert.iter())
        {
            if i >= num_species {
                return Err(PartitionError::InvalidIndex {
                    index: i,
                    num_species,
                });
            }
            if seen[i] {
                return Err(PartitionError::OverlappingSubsets(i));
            }
            seen[i] = true;
        }
        let covered = seen.iter().filter(|&&s| s).count();
        if covered != num_species {
            return Err(PartitionError::IncompleteCover {
                covered,
                num_species,
            });
        }

        // derived element subsets, precedence equilibrium > kinetic > inert
        let elements_of = |ispecies: &[usize]| -> Vec<usize> {
            let a = system.formula_matrix();
            let mut present = vec![false; num_elements];
            for &j in ispecies {
                for i in 0..num_elements {
                    if a[(i, j)] != 0.0 {
                        present[i] = true;
                    }
                }
            }
            (0..num_elements).filter(|&i| present[i]).collect()
        };
        let ielements_equilibrium = elements_of(&ispecies_equilibrium);
        let mut taken = vec![false; num_elements];
        for &i in &ielements_equilibrium {
            taken[i] = true;
        }
        let ielements_kinetic: Vec<usize> = elements_of(&ispecies_kinetic)
            .into_iter()
            .filter(|&i| !taken[i])
            .collect();
        for &i in &ielements_kinetic {
            taken[i] = true;
        }
        let ielements_inert: Vec<usize> = elements_of(&ispecies_inert)
            .into_iter()
            .filter(|&i| !taken[i])
            .collect();

        Ok(Self {
            num_species,
            num_elements,
            ispecies_equilibrium,
            ispecies_kinetic,
            ispecies_inert,
            ielements_equilibrium,
            ielements_kinetic,
            ielements_inert,
        })
    }

    /// build a partition from species names
    pub fn from_names(
        system: &ChemicalSystem,
        equilibrium: &[&str],
        kinetic: &[&str],
        inert: &[&str],
    ) -> Result<Self, PartitionError> {
        let resolve = |names: &[&str]| -> Result<Vec<usize>, PartitionError> {
            names
                .iter()
                .map(|name| {
                    system
                        .index_of_species(name)
                        .map_err(|_| PartitionError::UnknownSpecies(name.to_string()))
                })
                .collect()
        };
        Self::new(
            system,
            resolve(equilibrium)?,
            resolve(kinetic)?,
            resolve(inert)?,
        )
    }

    pub fn num_species(&self) -> usize {
        self.num_species
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn num_equilibrium_species(&self) -> usize {
        self.ispecies_equilibrium.len()
    }

    pub fn num_kinetic_species(&self) -> usize {
        self.ispecies_kinetic.len()
    }

    pub fn num_inert_species(&self) -> usize {
        self.ispecies_inert.len()
    }

    pub fn num_equilibrium_elements(&self) -> usize {
        self.ielements_equilibrium.len()
    }

    pub fn num_kinetic_elements(&self) -> usize {
        self.ielements_kinetic.len()
    }

    pub fn num_inert_elements(&self) -> usize {
        self.ielements_inert.len()
    }

    pub fn indices_equilibrium_species(&self) -> &[usize] {
        &self.ispecies_equilibrium
    }

    pub fn indices_kinetic_species(&self) -> &[usize] {
        &self.ispecies_kinetic
    }

    pub fn indices_inert_species(&self) -> &[usize] {
        &self.ispecies_inert
    }

    pub fn indices_equilibrium_elements(&self) -> &[usize] {
        &self.ielements_equilibrium
    }

    pub fn indices_kinetic_elements(&self) -> &[usize] {
        &self.ielements_kinetic
    }

    pub fn indices_inert_elements(&self) -> &[usize] {
        &self.ielements_inert
    }

    /// which subset the species with global index `i` belongs to
    pub fn classify(&self, i: usize) -> Result<SpeciesGroup, PartitionError> {
        if i >= self.num_species {
            return Err(PartitionError::InvalidIndex {
                index: i,
                num_species: self.num_species,
            });
        }
        if self.ispecies_equilibrium.contains(&i) {
            Ok(SpeciesGroup::Equilibrium)
        } else if self.ispecies_kinetic.contains(&i) {
            Ok(SpeciesGroup::Kinetic)
        } else {
            Ok(SpeciesGroup::Inert)
        }
    }

    // ---- projections; all preserve the recorded index-set order ----

    fn rows(&self, indices: &[usize], v: &DVector<f64>) -> Result<DVector<f64>, PartitionError> {
        if v.len() != self.num_species {
            return Err(PartitionError::DimensionMismatch(format!(
                "vector has length {}, system has {} species",
                v.len(),
                self.num_species
            )));
        }
        Ok(DVector::from_iterator(
            indices.len(),
            indices.iter().map(|&i| v[i]),
        ))
    }

    fn element_rows(
        &self,
        indices: &[usize],
        v: &DVector<f64>,
    ) -> Result<DVector<f64>, PartitionError> {
        if v.len() != self.num_elements {
            return Err(PartitionError::DimensionMismatch(format!(
                "vector has length {}, system has {} elements",
                v.len(),
                self.num_elements
            )));
        }
        Ok(DVector::from_iterator(
            indices.len(),
            indices.iter().map(|&i| v[i]),
        ))
    }

    fn cols(&self, indices: &[usize], m: &DMatrix<f64>) -> Result<DMatrix<f64>, PartitionError> {
        if m.ncols() != self.num_species {
            return Err(PartitionError::DimensionMismatch(format!(
                "matrix has {} columns, system has {} species",
                m.ncols(),
                self.num_species
            )));
        }
        let mut out = DMatrix::zeros(m.nrows(), indices.len());
        for (k, &j) in indices.iter().enumerate() {
            out.column_mut(k).copy_from(&m.column(j));
        }
        Ok(out)
    }

    fn submatrix(
        &self,
        ielements: &[usize],
        ispecies: &[usize],
        m: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>, PartitionError> {
        if m.nrows() != self.num_elements || m.ncols() != self.num_species {
            return Err(PartitionError::DimensionMismatch(format!(
                "matrix is {}x{}, expected {}x{} (elements x species)",
                m.nrows(),
                m.ncols(),
                self.num_elements,
                self.num_species
            )));
        }
        let mut out = DMatrix::zeros(ielements.len(), ispecies.len());
        for (r, &i) in ielements.iter().enumerate() {
            for (c, &j) in ispecies.iter().enumerate() {
                out[(r, c)] = m[(i, j)];
            }
        }
        Ok(out)
    }

    pub fn equilibrium_rows(&self, v: &DVector<f64>) -> Result<DVector<f64>, PartitionError> {
        self.rows(&self.ispecies_equilibrium, v)
    }

    pub fn kinetic_rows(&self, v: &DVector<f64>) -> Result<DVector<f64>, PartitionError> {
        self.rows(&self.ispecies_kinetic, v)
    }

    pub fn inert_rows(&self, v: &DVector<f64>) -> Result<DVector<f64>, PartitionError> {
        self.rows(&self.ispecies_inert, v)
    }

    pub fn equilibrium_element_rows(
        &self,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>, PartitionError> {
        self.element_rows(&self.ielements_equilibrium, v)
    }

    pub fn kinetic_element_rows(&self, v: &DVector<f64>) -> Result<DVector<f64>, PartitionError> {
        self.element_rows(&self.ielements_kinetic, v)
    }

    pub fn equilibrium_cols(&self, m: &DMatrix<f64>) -> Result<DMatrix<f64>, PartitionError> {
        self.cols(&self.ispecies_equilibrium, m)
    }

    pub fn kinetic_cols(&self, m: &DMatrix<f64>) -> Result<DMatrix<f64>, PartitionError> {
        self.cols(&self.ispecies_kinetic, m)
    }

    pub fn inert_cols(&self, m: &DMatrix<f64>) -> Result<DMatrix<f64>, PartitionError> {
        self.cols(&self.ispecies_inert, m)
    }

    /// sub-matrix of the formula matrix over equilibrium elements (rows) and
    /// equilibrium species (columns)
    pub fn equilibrium_formula_matrix(
        &self,
        m: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>, PartitionError> {
        self.submatrix(&self.ielements_equilibrium, &self.ispecies_equilibrium, m)
    }

    pub fn kinetic_formula_matrix(
        &self,
        m: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>, PartitionError> {
        self.submatrix(&self.ielements_kinetic, &self.ispecies_kinetic, m)
    }

    pub fn inert_formula_matrix(&self, m: &DMatrix<f64>) -> Result<DMatrix<f64>, PartitionError> {
        self.submatrix(&self.ielements_inert, &self.ispecies_inert, m)
    }

    /// scatter an equilibrium sub-vector back into the matching rows of a full
    /// species-length vector
    pub fn set_equilibrium_rows(
        &self,
        full: &mut DVector<f64>,
        sub: &DVector<f64>,
    ) -> Result<(), PartitionError> {
        if full.len() != self.num_species {
            return Err(PartitionError::DimensionMismatch(format!(
                "vector has length {}, system has {} species",
                full.len(),
                self.num_species
            )));
        }
        if sub.len() != self.ispecies_equilibrium.len() {
            return Err(PartitionError::DimensionMismatch(format!(
                "sub-vector has length {}, partition has {} equilibrium species",
                sub.len(),
                self.ispecies_equilibrium.len()
            )));
        }
        for (k, &i) in self.ispecies_equilibrium.iter().enumerate() {
            full[i] = sub[k];
        }
        Ok(())
    }

    /// scatter a kinetic sub-vector back into the matching rows
    pub fn set_kinetic_rows(
        &self,
        full: &mut DVector<f64>,
        sub: &DVector<f64>,
    ) -> Result<(), PartitionError> {
        if full.len() != self.num_species {
            return Err(PartitionError::DimensionMismatch(format!(
                "vector has length {}, system has {} species",
                full.len(),
                self.num_species
            )));
        }
        if sub.len() != self.ispecies_kinetic.len() {
            return Err(PartitionError::DimensionMismatch(format!(
                "sub-vector has length {}, partition has {} kinetic species",
                sub.len(),
                self.ispecies_kinetic.len()
            )));
        }
        for (k, &i) in self.ispecies_kinetic.iter().enumerate() {
            full[i] = sub[k];
        }
        Ok(())
    }
}
