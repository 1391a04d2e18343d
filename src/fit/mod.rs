//! Posterior sampling for the change-point model.
//!
//! Responsibilities:
//!
//! - run independent MCMC chains (parallel) over the segmentation model
//! - collect retained draws into a [`PosteriorSample`]

pub mod posterior;
pub mod sampler;

pub use posterior::*;
pub use sampler::*;
