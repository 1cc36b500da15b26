//! # InkDB Configuration Module
//!
//! Centralizes the constants the rest of the crate depends on: bucket
//! naming, catalog entry kinds, and parser limits. Constants that other
//! modules must agree on live here rather than being scattered, so a
//! rename or limit change happens in exactly one place.

pub mod constants;
pub use constants::*;
