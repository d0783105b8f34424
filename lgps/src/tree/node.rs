use std::sync::Arc;

use crate::{near_eq, Error, Result};

/// A node of the augmented break-point tree.
///
/// Every node, leaf or interior, carries the same three augmented fields.
/// At a leaf they collapse to the trivial single-element case: `v_time_max`
/// is the leaf's own `v_time`, `delta_weight_sum` is its own `delta_weight`,
/// and `delta_r_time` is zero. At an interior node they are recomputed from
/// the two children by [`Node::refresh`] after every structural change.
///
/// A node with no children is a leaf; a node with children always has both
/// (the tree is a full binary tree — interior nodes carry only
/// augmentation, never a break point of their own).
///
/// The tree is persistent: every mutating operation takes `&self` and
/// returns a new `Node`, sharing untouched subtrees with the original via
/// `Arc`. This mirrors the rest of this crate's ordered-tree code, which is
/// itself immutable and structurally-shared.
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) v_time_max: f64,
    pub(crate) delta_weight_sum: f64,
    pub(crate) delta_r_time: f64,

    /// Leaf height is 0, so an empty child (modeled as `None` one level up) is -1.
    height: isize,

    left: Option<Arc<Node>>,
    right: Option<Arc<Node>>,
}

impl Node {
    /// Construct a leaf carrying a single break point.
    pub(crate) fn leaf(v_time: f64, delta_weight: f64) -> Self {
        Self {
            v_time_max: v_time,
            delta_weight_sum: delta_weight,
            delta_r_time: 0.0,
            height: 0,
            left: None,
            right: None,
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        debug_assert_eq!(
            self.left.is_none(),
            self.right.is_none(),
            "node must have both children or neither (full binary tree invariant)"
        );
        self.left.is_none() && self.right.is_none()
    }

    pub(crate) fn height(&self) -> isize {
        self.height
    }

    fn left(&self) -> &Node {
        self.left.as_deref().expect("interior node must have a left child")
    }

    fn right(&self) -> &Node {
        self.right
            .as_deref()
            .expect("interior node must have a right child")
    }

    fn balance(&self) -> isize {
        height_of(&self.left) - height_of(&self.right)
    }

    /// Recompute `height` and the augmented fields from `left`/`right`.
    ///
    /// No-op on a leaf (no children to derive anything from); leaves carry
    /// their own augmentation by construction.
    fn refresh(self) -> Self {
        if self.is_leaf() {
            return self;
        }

        let l = self.left();
        let r = self.right();

        Self {
            v_time_max: r.v_time_max,
            delta_weight_sum: l.delta_weight_sum + r.delta_weight_sum,
            delta_r_time: l.delta_r_time + r.delta_r_time
                - (r.v_time_max - l.v_time_max) * l.delta_weight_sum,
            height: 1 + l.height.max(r.height),
            ..self
        }
    }

    /// Left rotation with `self` as the pivot: the right child becomes the new
    /// subtree root, `self` becomes its left child, and its former left child
    /// becomes `self`'s new right child.
    fn rotate_left(&self) -> Self {
        let r = self.right();
        debug_assert!(
            !r.is_leaf(),
            "rotate_left requires the pivot's right child to be an interior node"
        );

        let new_left = Self {
            right: r.left.clone(),
            ..self.clone()
        }
        .refresh();

        Self {
            left: Some(Arc::new(new_left)),
            right: r.right.clone(),
            ..r.clone()
        }
        .refresh()
    }

    /// Mirror of [`Node::rotate_left`].
    fn rotate_right(&self) -> Self {
        let l = self.left();
        debug_assert!(
            !l.is_leaf(),
            "rotate_right requires the pivot's left child to be an interior node"
        );

        let new_right = Self {
            left: l.right.clone(),
            ..self.clone()
        }
        .refresh();

        Self {
            left: l.left.clone(),
            right: Some(Arc::new(new_right)),
            ..l.clone()
        }
        .refresh()
    }

    /// Rebalance after an insert or a removal changed this node's height by
    /// at most one. The single-vs-double rotation choice is always made from
    /// the affected child's own balance factor, never from the key that was
    /// just inserted or removed: a newly-extremal key equals the child's own
    /// `v_time_max` exactly, so comparing against it cannot distinguish the
    /// single- and double-rotation cases (the child's balance factor can).
    fn rebalance(self) -> Self {
        let balance = self.balance();

        if balance > 1 {
            if self.left().balance() >= 0 {
                self.rotate_right()
            } else {
                let new_left = self.left().rotate_left();
                Self {
                    left: Some(Arc::new(new_left)),
                    ..self
                }
                .refresh()
                .rotate_right()
            }
        } else if balance < -1 {
            if self.right().balance() <= 0 {
                self.rotate_left()
            } else {
                let new_right = self.right().rotate_right();
                Self {
                    right: Some(Arc::new(new_right)),
                    ..self
                }
                .refresh()
                .rotate_left()
            }
        } else {
            self
        }
    }

    /// Insert `(new_v_time, new_delta_weight)`, coalescing into an existing
    /// leaf within [`crate::EPS`] of `new_v_time` rather than creating a new one.
    pub(crate) fn insert(&self, new_v_time: f64, new_delta_weight: f64) -> Self {
        if self.is_leaf() {
            if near_eq(new_v_time, self.v_time_max) {
                return Self {
                    delta_weight_sum: self.delta_weight_sum + new_delta_weight,
                    ..self.clone()
                };
            }

            let new_leaf = Self::leaf(new_v_time, new_delta_weight);
            let (left, right) = if new_v_time < self.v_time_max {
                (new_leaf, self.clone())
            } else {
                (self.clone(), new_leaf)
            };

            return Self {
                v_time_max: 0.0,
                delta_weight_sum: 0.0,
                delta_r_time: 0.0,
                height: 0,
                left: Some(Arc::new(left)),
                right: Some(Arc::new(right)),
            }
            .refresh();
        }

        if new_v_time < self.v_time_max - crate::EPS {
            let new_left = self.left().insert(new_v_time, new_delta_weight);
            Self {
                left: Some(Arc::new(new_left)),
                ..self.clone()
            }
            .refresh()
            .rebalance()
        } else {
            let new_right = self.right().insert(new_v_time, new_delta_weight);
            Self {
                right: Some(Arc::new(new_right)),
                ..self.clone()
            }
            .refresh()
            .rebalance()
        }
    }

    /// Remove the leftmost leaf of this (interior) subtree if its `v_time` is
    /// at or before `threshold`, returning the replacement subtree and the
    /// removed leaf's `(v_time, delta_weight)` payload.
    ///
    /// Precondition: `self` is an interior node, enforced by the caller
    /// ([`super::BreakPointTree::remove_leftmost_leaf_if_necessary`]) special-casing
    /// the single-leaf tree.
    pub(crate) fn remove_leftmost(&self, threshold: f64) -> (Self, Option<(f64, f64)>) {
        let left = self.left();

        if left.is_leaf() {
            if left.v_time_max <= threshold + crate::EPS {
                let removed = (left.v_time_max, left.delta_weight_sum);
                (self.right().clone(), Some(removed))
            } else {
                (self.clone(), None)
            }
        } else {
            let (new_left, removed) = left.remove_leftmost(threshold);

            match removed {
                None => (self.clone(), None),
                Some(removed) => {
                    let node = Self {
                        left: Some(Arc::new(new_left)),
                        ..self.clone()
                    }
                    .refresh()
                    .rebalance();

                    (node, Some(removed))
                }
            }
        }
    }

    /// Walk a single root-to-leaf path, converting `new_r_time` to the
    /// corresponding virtual time, given the anchors `(vt, rt, w)` that held
    /// immediately before this subtree.
    pub(crate) fn descend(&self, vt: f64, rt: f64, w: f64, new_r_time: f64) -> f64 {
        if self.is_leaf() {
            return vt + (new_r_time - rt) / w;
        }

        let l = self.left();
        let rt_l_max = rt + (l.v_time_max - vt) * w - l.delta_r_time;

        if new_r_time < rt_l_max {
            l.descend(vt, rt, w, new_r_time)
        } else {
            self.right()
                .descend(l.v_time_max, rt_l_max, w + l.delta_weight_sum, new_r_time)
        }
    }

    /// Verify invariants 1-4 of the module documentation over this subtree,
    /// returning the subtree's own augmented summary so an ancestor can fold
    /// it into its own check without re-walking already-verified leaves.
    pub(crate) fn check_invariants(&self) -> Result<NodeSummary> {
        if self.is_leaf() {
            return Ok(NodeSummary {
                v_time_max: self.v_time_max,
                delta_weight_sum: self.delta_weight_sum,
                delta_r_time: self.delta_r_time,
                height: self.height,
                leftmost_v_time: self.v_time_max,
            });
        }

        if self.left.is_none() || self.right.is_none() {
            return Err(Error::NotFull {
                v_time_max: self.v_time_max,
            });
        }

        let l = self.left().check_invariants()?;
        let r = self.right().check_invariants()?;

        if (l.height - r.height).abs() > 1 {
            return Err(Error::Unbalanced {
                v_time_max: self.v_time_max,
                left_height: l.height,
                right_height: r.height,
            });
        }

        if l.v_time_max + crate::EPS >= r.leftmost_v_time {
            return Err(Error::NonAscendingLeaves {
                prev: l.v_time_max,
                next: r.leftmost_v_time,
            });
        }

        let expected_height = 1 + l.height.max(r.height);
        let expected_v_time_max = r.v_time_max;
        let expected_delta_weight_sum = l.delta_weight_sum + r.delta_weight_sum;
        let expected_delta_r_time =
            l.delta_r_time + r.delta_r_time - (r.v_time_max - l.v_time_max) * l.delta_weight_sum;

        if self.height != expected_height {
            return Err(Error::AugmentationMismatch {
                v_time_max: self.v_time_max,
                field: "height",
                cached: self.height as f64,
                recomputed: expected_height as f64,
            });
        }
        if !near_eq(self.v_time_max, expected_v_time_max) {
            return Err(Error::AugmentationMismatch {
                v_time_max: self.v_time_max,
                field: "v_time_max",
                cached: self.v_time_max,
                recomputed: expected_v_time_max,
            });
        }
        if !near_eq(self.delta_weight_sum, expected_delta_weight_sum) {
            return Err(Error::AugmentationMismatch {
                v_time_max: self.v_time_max,
                field: "delta_weight_sum",
                cached: self.delta_weight_sum,
                recomputed: expected_delta_weight_sum,
            });
        }
        if !near_eq(self.delta_r_time, expected_delta_r_time) {
            return Err(Error::AugmentationMismatch {
                v_time_max: self.v_time_max,
                field: "delta_r_time",
                cached: self.delta_r_time,
                recomputed: expected_delta_r_time,
            });
        }

        Ok(NodeSummary {
            v_time_max: expected_v_time_max,
            delta_weight_sum: expected_delta_weight_sum,
            delta_r_time: expected_delta_r_time,
            height: expected_height,
            leftmost_v_time: l.leftmost_v_time,
        })
    }
}

/// Folded result of [`Node::check_invariants`], reused by the caller to
/// avoid re-deriving a subtree's augmentation from scratch at every level.
pub(crate) struct NodeSummary {
    pub(crate) v_time_max: f64,
    pub(crate) delta_weight_sum: f64,
    pub(crate) delta_r_time: f64,
    height: isize,
    leftmost_v_time: f64,
}

fn height_of(node: &Option<Arc<Node>>) -> isize {
    node.as_ref().map(|n| n.height()).unwrap_or(-1)
}

/// In-order iterator over a subtree's leaves, yielding `(v_time, delta_weight)`.
pub(crate) struct Iter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(root: Option<&'a Arc<Node>>) -> Self {
        let mut iter = Self { stack: Vec::new() };
        iter.descend_left(root.map(|n| &**n));
        iter
    }

    fn descend_left(&mut self, mut node: Option<&'a Node>) {
        while let Some(current) = node {
            self.stack.push(current);
            node = current.left.as_deref();
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        if !node.is_leaf() {
            // Interior nodes carry no break point of their own; descend into
            // the right subtree for the next leaf and retry.
            self.descend_left(node.right.as_deref());
            return self.next();
        }

        self.descend_left(node.right.as_deref());
        Some((node.v_time_max, node.delta_weight_sum))
    }
}
