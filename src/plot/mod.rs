//! Figure rendering.

pub mod png;

pub use png::{render_overlay_plot, render_trace_plot};
