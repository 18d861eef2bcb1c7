//! Plectrum core: the platform-agnostic guitar practice rig.
//!
//! Everything audio-related lives under [`domain`]; platform backends are in
//! the `plectrum-infra` crate.

pub mod domain;
