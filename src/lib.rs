#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Equilibrium;
#[allow(non_snake_case)]
pub mod Optimization;
#[allow(non_snake_case)]
pub mod Solvers;
#[allow(non_snake_case)]
pub mod Utils;
