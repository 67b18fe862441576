//! Domain layer for the chaos experiment engine
//!
//! Contains experiments, faults, targets, safety policies and results.
//! This layer performs no I/O and defines the ubiquitous language.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use value_objects::*;
