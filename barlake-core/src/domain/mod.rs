//! Domain types for barlake

pub mod bar;

pub use bar::{Bar, BarField, ValidationError};
