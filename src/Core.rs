/// Module to parse chemical formulae into elemental composition and to calculate molar masses.
/// Also serves as the built-in compound database for resolving titrant names.
///
///  # Examples
/// ```
/// use EquiKin::Core::formulas::calculate_molar_mass;
/// let (molar_mass, composition) = calculate_molar_mass("Na(NO3)2").unwrap();
/// println!("Element counts: {:?}", composition);
/// println!("Molar mass: {:?} g/mol", molar_mass);
/// ```
pub mod formulas;
/// Species, phases and the chemical system: elemental formula matrix, activity models,
/// chemical potential closures. The parent structure every other module is built against.
pub mod chemical_system;
/// Chemical state of a single sample point: temperature, pressure and species molar amounts.
pub mod state;
/// Partitioning of the species of a chemical system into equilibrium, kinetic and inert
/// subsets, with derived element subsets and sub-vector/sub-matrix projections.
pub mod partition;
/// tests
pub mod partition_tests;
/// Forward-mode sensitivity values: scalars and vectors paired with their partial
/// derivatives, propagated through sums, products, powers and compositions.
pub mod sensitivity;
/// Reactions: stoichiometry, equilibrium constants, reaction quotients with analytic
/// gradients, and kinetic rate laws.
pub mod reaction;
