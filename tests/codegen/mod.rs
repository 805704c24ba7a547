// Codegen test module
// Builds bound graphs by hand, generates code for them and runs it in the evaluator.

#[path = "../common/mod.rs"]
pub mod common;

mod _01_operators;
mod _02_control_flow;
mod _03_exceptions;
mod _04_generators;
mod _05_calls;
mod _06_places;
mod _07_listings;
