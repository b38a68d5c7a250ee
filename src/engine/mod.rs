//! Core engine — target selection, holdings reconciliation and the
//! per-segment scheduler loop that drives them.

pub mod rotation;
pub mod runner;
