use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error that can be returned by [`crate::tree::BreakPointTree::check_invariants`]
/// and [`crate::VirtualTimeSimulator::check_invariants`].
///
/// These are never returned by the ordinary operations ([`crate::tree::BreakPointTree::insert`],
/// [`crate::VirtualTimeSimulator::handle_arrival`], ...) — a violated invariant is a
/// programming error in this crate, not a recoverable condition, so it is only
/// surfaced through the opt-in self-check path.
#[derive(Debug, ThisError, PartialEq)]
pub enum Error {
    /// An interior node's left and right subtrees differ in height by more than one.
    #[error(
        "tree is unbalanced at node with v_time_max {v_time_max}: height(left) = {left_height}, height(right) = {right_height}"
    )]
    Unbalanced {
        v_time_max: f64,
        left_height: isize,
        right_height: isize,
    },

    /// Two adjacent leaves, in in-order traversal, are not strictly ascending in `v_time`.
    #[error("leaves are not strictly ascending in v_time: {prev} should precede {next}")]
    NonAscendingLeaves { prev: f64, next: f64 },

    /// An interior node's cached augmented field doesn't match the value recomputed
    /// from its children.
    #[error(
        "augmentation mismatch at node with v_time_max {v_time_max}: field `{field}` is cached as {cached} but recomputes to {recomputed}"
    )]
    AugmentationMismatch {
        v_time_max: f64,
        field: &'static str,
        cached: f64,
        recomputed: f64,
    },

    /// An interior node has only one child (the tree is not full).
    #[error("node with v_time_max {v_time_max} has only one child, tree is not full")]
    NotFull { v_time_max: f64 },

    /// A leaf's `v_time` lies strictly before the simulator's `old_v_time` horizon,
    /// meaning a sweep that should have removed it was skipped.
    #[error("leaf with v_time {v_time} precedes old_v_time horizon {old_v_time}")]
    LeafBeforeHorizon { v_time: f64, old_v_time: f64 },
}
