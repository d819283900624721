//! Core primitives.
//!
//! Seedable randomness shared by the game layer.

pub mod rng;

pub use rng::{RoundRng, derive_round_seed};
