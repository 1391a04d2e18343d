//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - raw price preparation (`prices`)
//! - result exports (CSV/text) (`export`)
//! - run manifest JSON (`manifest`)
//! - posterior trace in NetCDF classic (`trace`, `netcdf`)

pub mod export;
pub mod ingest;
pub mod manifest;
pub mod netcdf;
pub mod prices;
pub mod trace;

pub use export::*;
pub use ingest::*;
pub use manifest::*;
pub use prices::*;
pub use trace::*;
