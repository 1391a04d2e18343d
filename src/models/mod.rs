//! Change-point segmentation model.
//!
//! The model is implemented as a small, self-contained struct with pure
//! evaluation methods (regime assignment, segment likelihoods, priors) so the
//! sampler code can stay generic over `k`.

pub mod segmentation;

pub use segmentation::*;
