//! This module defines [`Bvh`], its configuration and errors, and the plain
//! object-split builder.

use log::debug;
use thiserror::Error;

use crate::aabb::{Aabb, Bounded};
use crate::bvh::node::{BvhNode, NodeKind};
use crate::bvh::partition;
use crate::Real;

/// Errors reported by the builders.
///
/// Bad input geometry is not an error: empty inputs yield empty trees and
/// degenerate boxes are routed by centroid. Violated invariants inside a
/// build are `assert!`s instead; they indicate a bug, not bad input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The configuration failed validation.
    #[error("invalid build configuration: {reason}")]
    InvalidConfig {
        /// What was rejected.
        reason: &'static str,
    },

    /// The tree needed more node slots than the over-allocation bound allows.
    #[error("node storage exhausted: needed {needed} slots, the over-allocation bound is {limit}")]
    NodeOverflow {
        /// Slots the build would have used.
        needed: usize,
        /// Slots the configuration granted.
        limit: usize,
    },

    /// The tree needed more reference slots than the over-allocation bound
    /// allows. Only spatial splits can duplicate references.
    #[error("reference storage exhausted: needed {needed} slots, the over-allocation bound is {limit}")]
    ReferenceOverflow {
        /// Slots the build would have used.
        needed: usize,
        /// Slots the configuration granted.
        limit: usize,
    },
}

/// Parameters of the SBVH builder.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SbvhConfig {
    /// Largest range the SAH termination test may turn into a leaf. Ranges
    /// larger than this always split.
    pub max_primitives_in_leaf: usize,

    /// Number of spatial bins per axis.
    pub bin_count: usize,

    /// A spatial split is only considered when the surface area of the
    /// object-split children's overlap exceeds this fraction of the root
    /// surface area. `1.0` disables spatial splits entirely, `0.0` considers
    /// them at every node.
    pub alpha: Real,

    /// Bound on the node and reference counts as a multiple of the input
    /// size. The build fails with [`BuildError::NodeOverflow`] or
    /// [`BuildError::ReferenceOverflow`] instead of exceeding it.
    pub over_allocation_factor: Real,
}

impl Default for SbvhConfig {
    fn default() -> SbvhConfig {
        SbvhConfig {
            max_primitives_in_leaf: 1,
            bin_count: 256,
            alpha: 1e-5,
            over_allocation_factor: 4.0,
        }
    }
}

impl SbvhConfig {
    pub(crate) fn validate(&self) -> Result<(), BuildError> {
        if self.max_primitives_in_leaf == 0 {
            return Err(BuildError::InvalidConfig {
                reason: "max_primitives_in_leaf must be at least 1",
            });
        }
        if self.bin_count < 2 {
            return Err(BuildError::InvalidConfig {
                reason: "bin_count must be at least 2",
            });
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(BuildError::InvalidConfig {
                reason: "alpha must lie in [0, 1]",
            });
        }
        if self.over_allocation_factor < 2.0 {
            return Err(BuildError::InvalidConfig {
                reason: "over_allocation_factor must be at least 2",
            });
        }
        Ok(())
    }
}

/// A flat bounding volume hierarchy.
///
/// `nodes[0]` is the root. Children always occupy adjacent slots, allocated
/// in pairs starting at slot 2; slot 1 is reserved padding which keeps the
/// pairing aligned and is never referenced by any parent. Every leaf owns a
/// slice of `indices`, which refers back to the positions of the input
/// primitives. A plain build emits every primitive exactly once; an SBVH
/// build may reference a primitive from several leaves.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bvh {
    /// The nodes in pre-order.
    pub nodes: Vec<BvhNode>,

    /// The flat reference array the leaves index into.
    pub indices: Vec<u32>,
}

impl Bvh {
    /// Number of node slots, the reserved padding included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaf references. Equals the primitive count for a plain
    /// build; at least the primitive count for an SBVH build.
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Builds a plain BVH over `primitives` using SAH object splits.
    ///
    /// Ranges of fewer than three primitives become leaves, as do ranges
    /// whose best split prices worse than intersecting the range directly.
    /// An empty input yields an empty tree with no nodes.
    pub fn build<P: Bounded>(primitives: &[P]) -> Result<Bvh, BuildError> {
        if primitives.is_empty() {
            return Ok(Bvh {
                nodes: Vec::new(),
                indices: Vec::new(),
            });
        }

        let n = primitives.len();
        let mut builder = BvhBuilder {
            primitives,
            indices: partition::sorted_indices(primitives),
            nodes: vec![BvhNode::placeholder(); 2 * n],
            node_index: 2,
            sah: vec![0.0; n],
            temp: vec![0; n],
        };
        builder.build_recursive(0, 0, n);

        let BvhBuilder {
            indices,
            mut nodes,
            node_index,
            ..
        } = builder;
        debug_assert!(node_index <= 2 * n);
        nodes.truncate(node_index);
        let [indices_x, _, _] = indices;

        debug!("built BVH over {} primitives: {} node slots", n, node_index);

        Ok(Bvh {
            nodes,
            indices: indices_x,
        })
    }

    /// Returns whether the tree passes every structural check of
    /// [`Bvh::assert_consistent`].
    pub fn is_consistent<P: Bounded>(&self, primitives: &[P]) -> bool {
        self.check_consistent(primitives).is_ok()
    }

    /// Walks the tree and panics when a structural invariant is broken:
    /// child bounds escaping their parent, empty or out-of-range leaves,
    /// unreachable node slots, unreferenced primitives, or a root box that
    /// is not the exact union of the primitive boxes.
    pub fn assert_consistent<P: Bounded>(&self, primitives: &[P]) {
        if let Err(reason) = self.check_consistent(primitives) {
            panic!("inconsistent BVH: {reason}");
        }
    }

    fn check_consistent<P: Bounded>(&self, primitives: &[P]) -> Result<(), String> {
        if self.nodes.is_empty() {
            if !self.indices.is_empty() {
                return Err("empty tree with leftover references".to_string());
            }
            if !primitives.is_empty() {
                return Err("empty tree for a non-empty input".to_string());
            }
            return Ok(());
        }

        let expected_root = partition::calculate_bounds(
            primitives,
            &(0..primitives.len() as u32).collect::<Vec<_>>(),
        );
        if self.nodes[0].aabb != expected_root {
            return Err(format!(
                "root bounds {} are not the union of the primitive bounds {}",
                self.nodes[0].aabb, expected_root
            ));
        }

        let mut visited = 0usize;
        let mut referenced = 0usize;
        let mut covered = vec![false; primitives.len()];
        self.check_subtree(primitives, 0, &mut visited, &mut referenced, &mut covered)?;

        // Every slot except the reserved padding must be reachable from the root.
        if visited != self.nodes.len() - 1 {
            return Err(format!(
                "{} of {} node slots reachable",
                visited,
                self.nodes.len() - 1
            ));
        }
        if referenced != self.indices.len() {
            return Err(format!(
                "leaves own {} references, the array holds {}",
                referenced,
                self.indices.len()
            ));
        }
        if let Some(missing) = covered.iter().position(|c| !c) {
            return Err(format!("primitive {missing} is never referenced"));
        }
        Ok(())
    }

    fn check_subtree<P: Bounded>(
        &self,
        primitives: &[P],
        node_index: usize,
        visited: &mut usize,
        referenced: &mut usize,
        covered: &mut [bool],
    ) -> Result<(), String> {
        *visited += 1;
        let node = &self.nodes[node_index];

        match node.kind {
            NodeKind::Leaf { first, count } => {
                let (first, count) = (first as usize, count as usize);
                if count == 0 {
                    return Err(format!("leaf {node_index} is empty"));
                }
                if first + count > self.indices.len() {
                    return Err(format!("leaf {node_index} overruns the reference array"));
                }
                for &index in &self.indices[first..first + count] {
                    let Some(flag) = covered.get_mut(index as usize) else {
                        return Err(format!("leaf {node_index} references unknown primitive {index}"));
                    };
                    *flag = true;

                    // A spatial split may have clipped the leaf bounds tighter
                    // than the primitive, but they always still overlap.
                    let aabb = primitives[index as usize].aabb();
                    if aabb.is_valid() && !Aabb::overlap(&node.aabb, &aabb).is_valid() {
                        return Err(format!(
                            "leaf {node_index} does not touch primitive {index}"
                        ));
                    }
                }
                *referenced += count;
            }
            NodeKind::Interior { left_child, .. } => {
                let left_child = left_child as usize;
                if left_child <= node_index {
                    return Err(format!(
                        "interior {node_index} points backwards to child {left_child}"
                    ));
                }
                if left_child + 1 >= self.nodes.len() {
                    return Err(format!("interior {node_index} overruns the node array"));
                }
                for child in [left_child, left_child + 1] {
                    if !node
                        .aabb
                        .approx_contains_aabb_eps(&self.nodes[child].aabb, crate::EPSILON)
                    {
                        return Err(format!(
                            "child {child} escapes the bounds of node {node_index}"
                        ));
                    }
                    self.check_subtree(primitives, child, visited, referenced, covered)?;
                }
            }
        }
        Ok(())
    }

    /// Total SAH cost of the tree: one traversal step per interior node and
    /// one intersection per leaf reference, each weighted by the node's
    /// surface area relative to the root. A diagnostic, not used by the
    /// builders themselves.
    pub fn sah_cost(&self) -> Real {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let root_area = self.nodes[0].aabb.surface_area();
        if root_area == 0.0 {
            return 0.0;
        }

        let mut cost = 0.0;
        let mut stack = vec![0usize];
        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index];
            match node.kind {
                NodeKind::Leaf { count, .. } => {
                    cost += node.aabb.surface_area() * count as Real;
                }
                NodeKind::Interior { left_child, .. } => {
                    cost += node.aabb.surface_area();
                    stack.push(left_child as usize);
                    stack.push(left_child as usize + 1);
                }
            }
        }
        cost / root_area
    }

    /// Prints the tree in a compact indented form, leaves with the
    /// references they own.
    pub fn pretty_print(&self) {
        fn print_node(nodes: &[BvhNode], indices: &[u32], node_index: usize, depth: usize) {
            let padding = " ".repeat(depth);
            let node = &nodes[node_index];
            match node.kind {
                NodeKind::Leaf { first, count } => {
                    let slice = &indices[first as usize..(first + count) as usize];
                    println!("{padding}leaf\t{slice:?}");
                }
                NodeKind::Interior { left_child, axis } => {
                    println!("{padding}node {axis}\t{}", node.aabb);
                    print_node(nodes, indices, left_child as usize, depth + 1);
                    print_node(nodes, indices, left_child as usize + 1, depth + 1);
                }
            }
        }
        if !self.nodes.is_empty() {
            print_node(&self.nodes, &self.indices, 0, 0);
        }
    }
}

/// Working state of a plain build: the axis-sorted index arrays are
/// partitioned in place, `temp` buffers one side during the reshuffle.
struct BvhBuilder<'a, P> {
    primitives: &'a [P],
    indices: [Vec<u32>; 3],
    nodes: Vec<BvhNode>,
    node_index: usize,
    sah: Vec<Real>,
    temp: Vec<u32>,
}

impl<P: Bounded> BvhBuilder<'_, P> {
    fn build_recursive(&mut self, node: usize, first: usize, count: usize) {
        let aabb =
            partition::calculate_bounds(self.primitives, &self.indices[0][first..first + count]);
        self.nodes[node].aabb = aabb;

        if count < 3 {
            self.nodes[node].kind = NodeKind::Leaf {
                first: first as u32,
                count: count as u32,
            };
            return;
        }

        let split =
            partition::object_split(self.primitives, &self.indices, first, count, &mut self.sah);

        // SAH termination: splitting must beat intersecting the range directly.
        let parent_cost = aabb.surface_area() * count as Real;
        if split.cost >= parent_cost {
            self.nodes[node].kind = NodeKind::Leaf {
                first: first as u32,
                count: count as u32,
            };
            return;
        }

        let left_child = self.node_index;
        self.node_index += 2;
        self.nodes[node].kind = NodeKind::Interior {
            left_child: left_child as u32,
            axis: split.axis,
        };

        let split_coord = self.primitives
            [self.indices[split.axis as usize][split.index] as usize]
            .centroid()[split.axis];
        partition::split_indices(
            self.primitives,
            &mut self.indices,
            first,
            count,
            &mut self.temp,
            split.axis,
            split.index,
            split_coord,
        );

        let n_left = split.index - first;
        let n_right = count - n_left;

        self.build_recursive(left_child, first, n_left);
        self.build_recursive(left_child + 1, first + n_left, n_right);
    }
}
