//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input data (`ReturnSeries`, `EventCatalog`)
//! - run configuration (`RunConfig`, `SamplerConfig`, `ChangePointCount`)
//! - derived outputs (`ChangePointEstimate`, `MatchedEvent`, `ConvergenceSummary`)

pub mod types;

pub use types::*;
