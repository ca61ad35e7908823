//! Trajectory representations
//!
//! Piecewise polynomial trajectories used both as warm-start guesses for the
//! transcription engines and as the reconstructed solution.

pub mod piecewise_polynomial;

pub use piecewise_polynomial::*;
