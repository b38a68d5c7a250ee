//! Strategy layer — the dual-momentum signal.

pub mod momentum;
