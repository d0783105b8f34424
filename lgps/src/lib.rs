//! Exact Generalized Processor Sharing (GPS) simulation core.
//!
//! This crate tracks, in real time, the virtual-time progression of a set of
//! competing flows sharing a work-conserving server under GPS. It is the
//! timing oracle a packet scheduler (e.g. Worst-Case Fair Weighted Fair
//! Queueing) consults to decide packet departure order with the minimum
//! achievable deviation from the fluid GPS ideal.
//!
//! The core is [`VirtualTimeSimulator`], backed by an augmented,
//! self-balancing [`BreakPointTree`] over virtual-time "break points" (see
//! [`tree`] module documentation). Input-trace parsing, a CLI front end, and
//! the per-packet dispatch policy that consumes departure virtual times are
//! all external collaborators, not part of this crate.
//!
//! The simulator is single-threaded and non-reentrant: a single logical
//! driver feeds arrival events in nondecreasing arrival-real-time order, and
//! each call completes to quiescence before the next begins. Multiple
//! [`VirtualTimeSimulator`] instances are independent and require no
//! synchronisation between them.

mod error;
mod simulator;
pub mod tree;

pub use error::{Error, Result};
pub use simulator::VirtualTimeSimulator;
pub use tree::BreakPointTree;

/// Absolute tolerance used for all virtual-time equality comparisons.
///
/// Break points are keyed by `f64` virtual times; arrivals, expected
/// departures, and pre-existing break points can coincide exactly in theory
/// but only "nearly" in floating point, so every comparison that could have
/// an exact hit goes through [`near_eq`] instead of `==`.
pub(crate) const EPS: f64 = 1e-8;

/// Whether `a` and `b` are within [`EPS`] of each other.
pub(crate) fn near_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPS
}
