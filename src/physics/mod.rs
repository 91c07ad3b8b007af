//! # Derived physical quantities
//!
//! Pure numeric functions on parsed instrument data. Everything here is
//! total over `f64`: out-of-domain input yields NaN or infinity, never an
//! error value, so callers can map these over whole columns without
//! interleaving error handling.

pub mod cell;
pub mod eos;
pub mod sauerbrey;

pub use cell::CrystalCell;
pub use eos::{Eos, EosParams};
pub use sauerbrey::Electrode;
