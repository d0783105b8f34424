//! The augmented break-point tree: a self-balancing, ordered search
//! structure over virtual-time "break points", augmented at every interior
//! node with the running sums needed to convert a real time to a virtual
//! time in a single O(log n) descent.
//!
//! This is a height-balanced (AVL) binary search tree keyed by virtual time.
//! Break points live only at leaves; interior nodes carry no key of their
//! own, only the augmented fields derived from their subtree (see
//! [`node::Node`] documentation). The tree is immutable — every mutating
//! operation ([`BreakPointTree::insert`],
//! [`BreakPointTree::remove_leftmost_leaf_if_necessary`]) takes `&self` and
//! returns a new tree, reusing whatever subtrees the mutation didn't touch.

mod node;

use std::sync::Arc;

use node::Node;

pub use node::Iter;

use crate::Result;

/// A height-balanced tree of virtual-time break points, augmented for O(log n)
/// real-time-to-virtual-time conversion.
///
/// See the module documentation for the data model. [`VirtualTimeSimulator`](crate::VirtualTimeSimulator)
/// is the only intended mutator of this type; it is exposed publicly as a
/// read-only accessor for testing and inspection (§6 of the design spec).
#[derive(Clone, Debug, Default)]
pub struct BreakPointTree {
    root: Option<Arc<Node>>,
}

impl BreakPointTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Height of the tree, or -1 if empty.
    pub fn height(&self) -> isize {
        self.root.as_ref().map(|n| n.height()).unwrap_or(-1)
    }

    /// Insert a break point `(v_time, delta_weight)`.
    ///
    /// If a leaf within [`crate::EPS`] of `v_time` already exists, `delta_weight`
    /// is added into it rather than creating a new leaf.
    pub fn insert(&self, v_time: f64, delta_weight: f64) -> Self {
        let new_root = match &self.root {
            Some(node) => node.insert(v_time, delta_weight),
            None => Node::leaf(v_time, delta_weight),
        };

        Self {
            root: Some(Arc::new(new_root)),
        }
    }

    /// Remove the leftmost leaf if its `v_time` is at or before `threshold_v_time`
    /// (within [`crate::EPS`]).
    ///
    /// Returns the new tree (unchanged if nothing was removed) and the removed
    /// leaf's `(v_time, delta_weight)` payload, if any. Removing from an empty
    /// tree is a no-op that returns `None`, never an error.
    pub fn remove_leftmost_leaf_if_necessary(
        &self,
        threshold_v_time: f64,
    ) -> (Self, Option<(f64, f64)>) {
        let root = match &self.root {
            None => return (self.clone(), None),
            Some(root) => root,
        };

        if root.is_leaf() {
            return if root.v_time_max <= threshold_v_time + crate::EPS {
                (Self::new(), Some((root.v_time_max, root.delta_weight_sum)))
            } else {
                (self.clone(), None)
            };
        }

        let (new_root, removed) = root.remove_leftmost(threshold_v_time);

        (
            Self {
                root: Some(Arc::new(new_root)),
            },
            removed,
        )
    }

    /// Convert `new_r_time` to the corresponding virtual time, given the
    /// simulator anchors `(old_v_time, old_r_time, sum_weight)` that held
    /// immediately before this tree's break points.
    ///
    /// Returns `0.0` if the tree is empty; callers are responsible for the
    /// `sum_weight ≈ 0` short-circuit (see
    /// [`VirtualTimeSimulator::r_time_to_v_time`](crate::VirtualTimeSimulator::r_time_to_v_time)),
    /// since an idle simulator with an empty tree and a nonzero `sum_weight`
    /// should never occur but isn't this type's invariant to enforce.
    pub(crate) fn r_time_to_v_time(
        &self,
        old_v_time: f64,
        old_r_time: f64,
        sum_weight: f64,
        new_r_time: f64,
    ) -> f64 {
        match &self.root {
            None => 0.0,
            Some(root) => root.descend(old_v_time, old_r_time, sum_weight, new_r_time),
        }
    }

    /// In-order iterator over the tree's leaves, yielding `(v_time, delta_weight)`.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self.root.as_ref())
    }

    /// Verify invariants 1-4 of the data-model documentation over the whole
    /// tree: height balance, fullness, strictly ascending leaves, and
    /// augmentation correctness. Invariants 5-6 (the simulator anchors) are
    /// checked by [`VirtualTimeSimulator::check_invariants`](crate::VirtualTimeSimulator::check_invariants),
    /// which also calls this method.
    pub fn check_invariants(&self) -> Result<()> {
        match &self.root {
            None => Ok(()),
            Some(root) => root.check_invariants().map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BreakPointTree;

    #[test]
    fn insert_into_empty_tree_creates_single_leaf() {
        let tree = BreakPointTree::new().insert(5.0, 1.0);

        assert_eq!(tree.iter().collect::<Vec<_>>(), vec![(5.0, 1.0)]);
        assert_eq!(tree.height(), 0);
    }

    #[test]
    fn coalesce_inserting_same_v_time_twice_yields_one_leaf() {
        let tree = BreakPointTree::new().insert(5.0, 1.0).insert(5.0, 2.0);

        assert_eq!(tree.iter().collect::<Vec<_>>(), vec![(5.0, 3.0)]);
    }

    #[test]
    fn coalesce_is_order_independent_with_direct_insert() {
        let coalesced = BreakPointTree::new().insert(5.0, 1.0).insert(5.0, 2.0);
        let direct = BreakPointTree::new().insert(5.0, 3.0);

        assert_eq!(
            coalesced.iter().collect::<Vec<_>>(),
            direct.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn inserts_are_kept_in_ascending_order() {
        let tree = BreakPointTree::new()
            .insert(3.0, 1.0)
            .insert(1.0, 1.0)
            .insert(4.0, 1.0)
            .insert(2.0, 1.0);

        assert_eq!(
            tree.iter().map(|(v, _)| v).collect::<Vec<_>>(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
        tree.check_invariants().unwrap();
    }

    #[test]
    fn bulk_insert_stays_balanced() {
        let mut tree = BreakPointTree::new();

        for v in 0..32 {
            tree = tree.insert(v as f64, 1.0);
            tree.check_invariants().unwrap();
        }

        // 32 leaves (63 nodes total) balanced should stay close to log2(n); a
        // linear chain would instead reach height 62.
        assert!(tree.height() <= 8, "height {} too large", tree.height());
    }

    #[test]
    fn sweep_removes_leaves_at_or_before_threshold() {
        let tree = BreakPointTree::new()
            .insert(1.0, 1.0)
            .insert(2.0, -1.0)
            .insert(3.0, 1.0);

        let (tree, removed) = tree.remove_leftmost_leaf_if_necessary(2.5);
        assert_eq!(removed, Some((1.0, 1.0)));

        let (tree, removed) = tree.remove_leftmost_leaf_if_necessary(2.5);
        assert_eq!(removed, Some((2.0, -1.0)));

        let (tree, removed) = tree.remove_leftmost_leaf_if_necessary(2.5);
        assert_eq!(removed, None);

        assert_eq!(tree.iter().collect::<Vec<_>>(), vec![(3.0, 1.0)]);
    }

    #[test]
    fn sweep_leaves_tree_unchanged_when_leftmost_is_in_the_future() {
        let tree = BreakPointTree::new().insert(10.0, 1.0);

        let (tree, removed) = tree.remove_leftmost_leaf_if_necessary(5.0);
        assert_eq!(removed, None);
        assert_eq!(tree.iter().collect::<Vec<_>>(), vec![(10.0, 1.0)]);
    }

    #[test]
    fn sweep_on_empty_tree_is_a_no_op() {
        let tree = BreakPointTree::new();
        let (tree, removed) = tree.remove_leftmost_leaf_if_necessary(100.0);

        assert_eq!(removed, None);
        assert!(tree.is_empty());
    }

    #[test]
    fn remove_down_to_empty_tree() {
        let tree = BreakPointTree::new().insert(1.0, 1.0);
        let (tree, removed) = tree.remove_leftmost_leaf_if_necessary(1.0);

        assert_eq!(removed, Some((1.0, 1.0)));
        assert!(tree.is_empty());
    }

    #[test]
    fn remove_after_bulk_insert_stays_balanced_and_ascending() {
        let mut tree = BreakPointTree::new();
        for v in 0..16 {
            tree = tree.insert(v as f64, 1.0);
        }

        for threshold in 0..10 {
            let (new_tree, removed) = tree.remove_leftmost_leaf_if_necessary(threshold as f64);
            assert!(removed.is_some());
            tree = new_tree;
            tree.check_invariants().unwrap();
        }

        assert_eq!(
            tree.iter().map(|(v, _)| v).collect::<Vec<_>>(),
            (10..16).map(|v| v as f64).collect::<Vec<_>>()
        );
    }

    #[test]
    fn r_time_to_v_time_matches_linear_single_flow() {
        let tree = BreakPointTree::new().insert(10.0, -1.0);

        // anchors: old_v_time=0, old_r_time=0, sum_weight=1
        let v_time = tree.r_time_to_v_time(0.0, 0.0, 1.0, 6.0);
        assert!((v_time - 6.0).abs() < 1e-9);
    }

    #[test]
    fn r_time_to_v_time_three_flow_descent() {
        // Leaves (1, -1), (2, -1), (4, -1); anchors old_v=0, old_r=0, w=3.
        let tree = BreakPointTree::new()
            .insert(1.0, -1.0)
            .insert(2.0, -1.0)
            .insert(4.0, -1.0);

        let v_time = tree.r_time_to_v_time(0.0, 0.0, 3.0, 5.0);
        assert!((v_time - 2.0).abs() < 1e-9, "expected 2.0, got {v_time}");
    }
}
