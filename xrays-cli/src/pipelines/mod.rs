//! The history-driven metric pipelines.
//!
//! Each pipeline is a pure function over the windowed `FileChange` stream
//! (plus upstream reports where dependencies exist: PAIN feeds effort, the
//! DX overlay consumes five reports). Pipelines never fail on empty input;
//! they return zero-filled reports.

pub mod clustering;
pub mod coupling;
pub mod dx;
pub mod effort;
pub mod hotspots;
pub mod knowledge;
pub mod numeric;
