#[cfg(test)]
mod tests {
    use crate::Core::chemical_system::{
        ActivityModelEnum, ChemicalSystem, ChemicalSystemBuilder, IdealActivityModel, PhaseKind,
        Species,
    };
    use crate::Core::partition::{Partition, SpeciesGroup};
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    // aqueous H2O, CO2, CaCO3(aq) + solid Calcite + gaseous N2
    fn system() -> ChemicalSystem {
        let mut builder = ChemicalSystemBuilder::new();
        builder.add_phase(
            "aqueous",
            PhaseKind::Fluid,
            vec![
                Species::new("H2O", "H2O").unwrap(),
                Species::new("CO2", "CO2").unwrap(),
                Species::new("CaCO3", "CaCO3").unwrap(),
            ],
        );
        builder.add_phase(
            "calcite",
            PhaseKind::Solid,
            vec![Species::new("Calcite", "CaCO3").unwrap()],
        );
        builder.add_phase(
            "gas",
            PhaseKind::Fluid,
            vec![Species::new("N2", "N2").unwrap()],
        );
        builder
            .build(ActivityModelEnum::Ideal(IdealActivityModel))
            .unwrap()
    }

    #[test]
    fn test_subsets_are_disjoint_and_complete() {
        let system = system();
        let partition = Partition::new(&system, vec![0, 1, 2], vec![3], vec![4]).unwrap();
        let mut all: Vec<usize> = partition
            .indices_equilibrium_species()
            .iter()
            .chain(partition.indices_kinetic_species())
            .chain(partition.indices_inert_species())
            .copied()
            .collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4]);
        assert_eq!(partition.num_equilibrium_species(), 3);
        assert_eq!(partition.num_kinetic_species(), 1);
        assert_eq!(partition.num_inert_species(), 1);
    }

    #[test]
    fn test_invalid_partitions_rejected() {
        let system = system();
        // overlapping
        assert!(Partition::new(&system, vec![0, 1, 2], vec![2, 3], vec![4]).is_err());
        // incomplete
        assert!(Partition::new(&system, vec![0, 1], vec![3], vec![4]).is_err());
        // out of range
        assert!(Partition::new(&system, vec![0, 1, 2, 7], vec![3], vec![4]).is_err());
    }

    #[test]
    fn test_classify() {
        let system = system();
        let partition = Partition::new(&system, vec![0, 1, 2], vec![3], vec![4]).unwrap();
        assert_eq!(partition.classify(1).unwrap(), SpeciesGroup::Equilibrium);
        assert_eq!(partition.classify(3).unwrap(), SpeciesGroup::Kinetic);
        assert_eq!(partition.classify(4).unwrap(), SpeciesGroup::Inert);
        assert!(partition.classify(9).is_err());
    }

    #[test]
    fn test_element_precedence_equilibrium_over_kinetic() {
        let system = system();
        // Calcite (kinetic) shares Ca, C, O with the aqueous equilibrium species;
        // N2 (inert) brings N alone
        let partition = Partition::new(&system, vec![0, 1, 2], vec![3], vec![4]).unwrap();
        let eq_elements: Vec<&str> = partition
            .indices_equilibrium_elements()
            .iter()
            .map(|&i| system.elements()[i].as_str())
            .collect();
        assert_eq!(eq_elements, vec!["C", "Ca", "H", "O"]);
        // all of Calcite's elements were claimed by the equilibrium subset
        assert_eq!(partition.num_kinetic_elements(), 0);
        let inert_elements: Vec<&str> = partition
            .indices_inert_elements()
            .iter()
            .map(|&i| system.elements()[i].as_str())
            .collect();
        assert_eq!(inert_elements, vec!["N"]);
    }

    #[test]
    fn test_projection_preserves_recorded_order() {
        let system = system();
        // deliberately non-sorted equilibrium order
        let partition = Partition::new(&system, vec![2, 0, 1], vec![3], vec![4]).unwrap();
        let v = DVector::from_vec(vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        let sub = partition.equilibrium_rows(&v).unwrap();
        assert_eq!(sub.as_slice(), &[30.0, 10.0, 20.0]);

        // projecting twice gives the same answer
        let again = partition.equilibrium_rows(&v).unwrap();
        assert_eq!(sub, again);
    }

    #[test]
    fn test_matrix_projections() {
        let system = system();
        let partition = Partition::new(&system, vec![0, 1, 2], vec![3], vec![4]).unwrap();
        let a = system.formula_matrix().clone();

        let cols = partition.kinetic_cols(&a).unwrap();
        assert_eq!(cols.ncols(), 1);
        assert_eq!(cols.nrows(), system.num_elements());

        let ae = partition.equilibrium_formula_matrix(&a).unwrap();
        assert_eq!(ae.nrows(), partition.num_equilibrium_elements());
        assert_eq!(ae.ncols(), partition.num_equilibrium_species());
        // row for Ca, column for CaCO3(aq): coefficient 1
        let ica = partition
            .indices_equilibrium_elements()
            .iter()
            .position(|&i| system.elements()[i] == "Ca")
            .unwrap();
        assert_relative_eq!(ae[(ica, 2)], 1.0);
    }

    #[test]
    fn test_projection_dimension_mismatch() {
        let system = system();
        let partition = Partition::all_equilibrium(&system);
        assert!(partition.equilibrium_rows(&DVector::zeros(3)).is_err());
        assert!(partition.equilibrium_cols(&DMatrix::zeros(2, 3)).is_err());
        assert!(
            partition
                .equilibrium_formula_matrix(&DMatrix::zeros(2, 5))
                .is_err()
        );
    }

    #[test]
    fn test_scatter_back() {
        let system = system();
        let partition = Partition::new(&system, vec![2, 0], vec![1, 3], vec![4]).unwrap();
        let mut full = DVector::zeros(5);
        partition
            .set_equilibrium_rows(&mut full, &DVector::from_vec(vec![7.0, 9.0]))
            .unwrap();
        assert_relative_eq!(full[2], 7.0);
        assert_relative_eq!(full[0], 9.0);
        partition
            .set_kinetic_rows(&mut full, &DVector::from_vec(vec![1.0, 2.0]))
            .unwrap();
        assert_relative_eq!(full[1], 1.0);
        assert_relative_eq!(full[3], 2.0);
        assert!(
            partition
                .set_equilibrium_rows(&mut full, &DVector::zeros(3))
                .is_err()
        );
    }
}
