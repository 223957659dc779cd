//! Key-value backend implementations.

pub mod rocks;
