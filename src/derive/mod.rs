//! Derivation of band-integrated wave power.
//!
//! Responsibilities:
//!
//! - electron cyclotron frequency from the ephemeris field magnitude
//! - pitch-angle reduction and 1-second resampling of the ephemeris
//! - per-epoch band integration (adaptive or fixed policy)
//! - per-(spacecraft, day) persistence, remote transform round-trip, merge

pub mod engine;

pub use engine::*;
