//! Domain layer
//!
//! Contains the knowledge-graph engine and its domain models.

pub mod knowledge;
