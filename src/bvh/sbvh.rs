//! The spatial-split builder.
//!
//! Every node computes an object-split candidate; where the object children
//! overlap badly, a binned spatial-split candidate competes with it. A
//! spatial split assigns a straddling primitive to both children unless the
//! unsplit heuristic finds it cheaper on one side alone. Because a subtree
//! can therefore emit more references than it was handed, the recursion
//! returns the number of reference slots it occupied and the right sibling's
//! input is copied in after the left subtree has finished.

use log::{debug, info};

use crate::aabb::{Aabb, Bounded};
use crate::axis::Axis;
use crate::bvh::bvh_impl::{BuildError, Bvh, SbvhConfig};
use crate::bvh::node::{BvhNode, NodeKind};
use crate::bvh::partition::{self, ObjectSplit, SpatialSplit, BIN_EPSILON};
use crate::Real;

impl Bvh {
    /// Builds an SBVH over `primitives`.
    ///
    /// Works like [`Bvh::build`] but may reference a primitive from several
    /// leaves, so `index_count() >= primitives.len()`. Leaf sizes are
    /// governed by [`SbvhConfig::max_primitives_in_leaf`]; node and
    /// reference storage by [`SbvhConfig::over_allocation_factor`], beyond
    /// which the build fails. An empty input yields an empty tree with no
    /// nodes.
    pub fn build_sbvh<P: Bounded>(
        primitives: &[P],
        config: &SbvhConfig,
    ) -> Result<Bvh, BuildError> {
        config.validate()?;
        if primitives.is_empty() {
            return Ok(Bvh {
                nodes: Vec::new(),
                indices: Vec::new(),
            });
        }

        let n = primitives.len();
        info!("constructing SBVH over {n} primitives, this may take a while for large scenes");

        let capacity = (config.over_allocation_factor as f64 * n as f64) as usize;

        let mut indices = partition::sorted_indices(primitives);
        for axis_indices in indices.iter_mut() {
            axis_indices.resize(capacity, 0);
        }

        let root_aabb = partition::calculate_bounds(primitives, &indices[0][..n]);

        let mut builder = SbvhBuilder {
            primitives,
            indices,
            nodes: vec![BvhNode::placeholder(); capacity],
            node_index: 2,
            sah: vec![0.0; n],
            goes_left: vec![false; n],
            goes_right: vec![false; n],
            inv_root_area: 1.0 / root_aabb.surface_area(),
            config: *config,
            capacity,
        };
        builder.nodes[0].aabb = root_aabb;

        let index_count = builder.build_recursive(0, 0, n)?;

        let SbvhBuilder {
            mut nodes,
            indices,
            node_index,
            ..
        } = builder;
        nodes.truncate(node_index);
        let [mut indices_x, _, _] = indices;
        indices_x.truncate(index_count);

        debug!(
            "SBVH finished: {} node slots, {} references for {} primitives",
            node_index, index_count, n
        );

        Ok(Bvh {
            nodes,
            indices: indices_x,
        })
    }
}

/// Working state of an SBVH build. The index arrays are over-allocated to
/// `capacity` because spatial splits append duplicate references;
/// `goes_left`/`goes_right` are per-primitive lookup tables filled during
/// the classification pass of a spatial split.
struct SbvhBuilder<'a, P> {
    primitives: &'a [P],
    indices: [Vec<u32>; 3],
    nodes: Vec<BvhNode>,
    node_index: usize,
    sah: Vec<Real>,
    goes_left: Vec<bool>,
    goes_right: Vec<bool>,
    inv_root_area: Real,
    config: SbvhConfig,
    capacity: usize,
}

impl<P: Bounded> SbvhBuilder<'_, P> {
    /// Expands `node` over `[first, first + count)`, whose bounds were
    /// already written by the parent. Returns the number of reference slots
    /// the finished subtree occupies.
    fn build_recursive(
        &mut self,
        node: usize,
        first: usize,
        count: usize,
    ) -> Result<usize, BuildError> {
        if count == 1 {
            self.nodes[node].kind = NodeKind::Leaf {
                first: first as u32,
                count: 1,
            };
            return Ok(1);
        }

        let node_aabb = self.nodes[node].aabb;

        let object =
            partition::object_split(self.primitives, &self.indices, first, count, &mut self.sah);

        // Spatial splits only pay off where the object children overlap; the
        // overlap area relative to the root gates the search.
        let overlap = Aabb::overlap(&object.aabb_left, &object.aabb_right);
        let ratio = overlap.surface_area() * self.inv_root_area;

        let spatial = if ratio > self.config.alpha {
            partition::spatial_split(
                self.primitives,
                &self.indices,
                first,
                count,
                &node_aabb,
                self.config.bin_count,
            )
        } else {
            None
        };
        let spatial_cost = spatial.as_ref().map_or(Real::INFINITY, |s| s.cost);

        if count <= self.config.max_primitives_in_leaf {
            let parent_cost = node_aabb.surface_area() * count as Real;
            if parent_cost <= object.cost && parent_cost <= spatial_cost {
                self.nodes[node].kind = NodeKind::Leaf {
                    first: first as u32,
                    count: count as u32,
                };
                return Ok(count);
            }
        }

        assert!(
            object.cost < Real::INFINITY || spatial_cost < Real::INFINITY,
            "no usable split for {count} references"
        );

        // Left halves are rewritten in place; right halves are buffered here
        // until the left subtree has finished and their final offset is known.
        let mut children_right: [Vec<u32>; 3] = std::array::from_fn(|_| Vec::with_capacity(count));

        let spatial_partition = match spatial {
            // The object split wins ties.
            Some(split) if split.cost < object.cost => {
                self.partition_spatial(first, count, &node_aabb, split, &mut children_right)
            }
            _ => None,
        };
        let (axis, n_left, aabb_left, aabb_right) = match spatial_partition {
            Some(partitioned) => partitioned,
            None => self.partition_object(first, count, &object, &mut children_right),
        };
        let n_right = children_right[0].len();

        if self.node_index + 2 > self.capacity {
            return Err(BuildError::NodeOverflow {
                needed: self.node_index + 2,
                limit: self.capacity,
            });
        }
        let left_child = self.node_index;
        self.node_index += 2;

        self.nodes[node].kind = NodeKind::Interior {
            left_child: left_child as u32,
            axis,
        };
        self.nodes[left_child].aabb = aabb_left;
        self.nodes[left_child + 1].aabb = aabb_right;

        let leaves_left = self.build_recursive(left_child, first, n_left)?;

        // The left subtree may have emitted duplicates; the right child's
        // pre-sorted input lands after everything it produced.
        let right_first = first + leaves_left;
        if right_first + n_right > self.capacity {
            return Err(BuildError::ReferenceOverflow {
                needed: right_first + n_right,
                limit: self.capacity,
            });
        }
        for d in 0..3 {
            self.indices[d][right_first..right_first + n_right]
                .copy_from_slice(&children_right[d]);
        }

        let leaves_right = self.build_recursive(left_child + 1, right_first, n_right)?;

        Ok(leaves_left + leaves_right)
    }

    /// Rewrites the axis orders for an object split. The equal-centroid
    /// tie-break keeps every axis consistent with the split position, so the
    /// left half is exactly `[first, split.index)` of the split axis's order.
    fn partition_object(
        &mut self,
        first: usize,
        count: usize,
        split: &ObjectSplit,
        children_right: &mut [Vec<u32>; 3],
    ) -> (Axis, usize, Aabb, Aabb) {
        let primitives = self.primitives;
        let axis = split.axis;
        let split_coord =
            primitives[self.indices[axis as usize][split.index] as usize].centroid()[axis];

        for d in 0..3 {
            let mut left_count = first;
            for i in first..first + count {
                let index = self.indices[d][i];
                let goes_left = partition::object_split_side(
                    primitives,
                    &self.indices[axis as usize],
                    first,
                    split.index,
                    axis,
                    split_coord,
                    index,
                );
                if goes_left {
                    self.indices[d][left_count] = index;
                    left_count += 1;
                } else {
                    children_right[d].push(index);
                }
            }
            assert_eq!(
                left_count, split.index,
                "axis {d} disagrees with the split position"
            );
        }

        (axis, split.index - first, split.aabb_left, split.aabb_right)
    }

    /// Classifies the range against the winning spatial plane and rewrites
    /// the axis orders. Every reference goes left, right or both; the
    /// unsplit heuristic may pull a straddler to one side and widen that
    /// child instead of referencing it twice.
    ///
    /// Returns `None` without touching the index arrays when the partition
    /// would not shrink the range on both sides (possible when every
    /// reference straddles the plane); the caller then falls back to the
    /// object split.
    fn partition_spatial(
        &mut self,
        first: usize,
        count: usize,
        node_aabb: &Aabb,
        mut split: SpatialSplit,
        children_right: &mut [Vec<u32>; 3],
    ) -> Option<(Axis, usize, Aabb, Aabb)> {
        let primitives = self.primitives;
        let axis = split.axis;

        let bounds_min = node_aabb.min[axis] - BIN_EPSILON;
        let bounds_max = node_aabb.max[axis] + BIN_EPSILON;
        let bin_scale = self.config.bin_count as Real / (bounds_max - bounds_min);

        // Running per-side reference counts for the unsplit heuristic.
        let mut n1 = split.count_left as Real;
        let mut n2 = split.count_right as Real;

        let mut rejected_left = 0usize;
        let mut rejected_right = 0usize;
        let mut n_left = 0usize;
        let mut n_right = 0usize;

        for i in first..first + count {
            let index = self.indices[axis as usize][i] as usize;
            let clipped = Aabb::overlap(&primitives[index].aabb(), node_aabb);

            let mut goes_left;
            let mut goes_right;
            if clipped.is_valid() {
                let bin_min = partition::bin_index(
                    clipped.min[axis],
                    bounds_min,
                    bin_scale,
                    self.config.bin_count,
                );
                let bin_max = partition::bin_index(
                    clipped.max[axis],
                    bounds_min,
                    bin_scale,
                    self.config.bin_count,
                );

                goes_left = bin_min < split.bin;
                goes_right = bin_max >= split.bin;

                // A reference can land on one side of the plane without its
                // clip touching that child's bounds; drop such assignments.
                if goes_left && !Aabb::overlap(&clipped, &split.aabb_left).is_valid() {
                    goes_left = false;
                    rejected_left += 1;
                }
                if goes_right && !Aabb::overlap(&clipped, &split.aabb_right).is_valid() {
                    goes_right = false;
                    rejected_right += 1;
                }

                if goes_left && goes_right {
                    // Straddler: unsplitting it to one side may be cheaper
                    // than referencing it twice.
                    let mut delta_left = split.aabb_left;
                    let mut delta_right = split.aabb_right;
                    delta_left.join_mut(&clipped);
                    delta_right.join_mut(&clipped);

                    let area_left = split.aabb_left.surface_area();
                    let area_right = split.aabb_right.surface_area();

                    let c_split = area_left * n1 + area_right * n2;
                    let c_left = delta_left.surface_area() * n1 + area_right * (n2 - 1.0);
                    let c_right = area_left * (n1 - 1.0) + delta_right.surface_area() * n2;

                    if c_left < c_split {
                        if c_right < c_left {
                            goes_left = false;
                            rejected_left += 1;
                            n1 -= 1.0;
                            split.aabb_right = delta_right;
                        } else {
                            goes_right = false;
                            rejected_right += 1;
                            n2 -= 1.0;
                            split.aabb_left = delta_left;
                        }
                    } else if c_right < c_split {
                        goes_left = false;
                        rejected_left += 1;
                        n1 -= 1.0;
                        split.aabb_right = delta_right;
                    }
                }
            } else {
                // Degenerate clip: route by the centroid alone.
                let b = partition::bin_index(
                    primitives[index].centroid()[axis],
                    bounds_min,
                    bin_scale,
                    self.config.bin_count,
                );
                goes_left = b < split.bin;
                goes_right = !goes_left;
            }

            assert!(
                goes_left || goes_right,
                "reference {index} assigned to neither side"
            );
            self.goes_left[index] = goes_left;
            self.goes_right[index] = goes_right;
            n_left += goes_left as usize;
            n_right += goes_right as usize;
        }

        assert_eq!(n_left, split.count_left - rejected_left);
        assert_eq!(n_right, split.count_right - rejected_right);

        if n_left == 0 || n_right == 0 || n_left == count || n_right == count {
            return None;
        }

        // Commit: rebuild the three axis orders from the lookup tables.
        for d in 0..3 {
            let mut left_count = first;
            for i in first..first + count {
                let index = self.indices[d][i];
                if self.goes_left[index as usize] {
                    self.indices[d][left_count] = index;
                    left_count += 1;
                }
                if self.goes_right[index as usize] {
                    children_right[d].push(index);
                }
            }
            assert_eq!(
                left_count - first,
                n_left,
                "axis {d} disagrees on the left count"
            );
            assert_eq!(
                children_right[d].len(),
                n_right,
                "axis {d} disagrees on the right count"
            );
        }

        Some((axis, n_left, split.aabb_left, split.aabb_right))
    }
}

#[cfg(test)]
mod tests {
    use hashbrown::HashSet;

    use crate::axis::Axis;
    use crate::bvh::{BuildError, Bvh, NodeKind, SbvhConfig};
    use crate::testbase::{
        create_n_cubes, default_bounds, spanning_wall_scene, unit_triangle_at,
    };
    use crate::triangle::Triangle;
    use crate::{Point3, Real};

    /// An empty input produces an empty tree.
    #[test]
    fn test_sbvh_empty() {
        let bvh = Bvh::build_sbvh::<Triangle>(&[], &SbvhConfig::default()).unwrap();
        assert_eq!(bvh.node_count(), 0);
        assert_eq!(bvh.index_count(), 0);
    }

    /// A single primitive becomes the root leaf.
    #[test]
    fn test_sbvh_single_triangle() {
        let triangles = [Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )];
        let bvh = Bvh::build_sbvh(&triangles, &SbvhConfig::default()).unwrap();

        assert_eq!(bvh.indices, vec![0]);
        assert_eq!(bvh.nodes[0].kind, NodeKind::Leaf { first: 0, count: 1 });
        assert_eq!(bvh.nodes[0].aabb.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(bvh.nodes[0].aabb.max, Point3::new(1.0, 1.0, 0.0));
        bvh.assert_consistent(&triangles);
    }

    /// Two primitives apart on x split into singleton leaves, left before right.
    #[test]
    fn test_sbvh_two_disjoint_on_x() {
        let triangles = [
            unit_triangle_at(Point3::new(0.0, 0.0, 0.0)),
            unit_triangle_at(Point3::new(10.0, 0.0, 0.0)),
        ];
        let bvh = Bvh::build_sbvh(&triangles, &SbvhConfig::default()).unwrap();

        assert_eq!(bvh.nodes[0].split_axis(), Axis::X);
        let left_child = bvh.nodes[0].left_child();
        assert_eq!(bvh.nodes[left_child].kind, NodeKind::Leaf { first: 0, count: 1 });
        assert_eq!(
            bvh.nodes[left_child + 1].kind,
            NodeKind::Leaf { first: 1, count: 1 }
        );
        assert_eq!(bvh.indices, vec![0, 1]);
        bvh.assert_consistent(&triangles);
    }

    /// A row of four splits into singleton leaves over at most three levels,
    /// always on the x axis.
    #[test]
    fn test_sbvh_colinear_row() {
        let triangles: Vec<_> = (0..4)
            .map(|i| unit_triangle_at(Point3::new(i as Real, 0.0, 0.0)))
            .collect();
        let bvh = Bvh::build_sbvh(&triangles, &SbvhConfig::default()).unwrap();

        let mut stack = vec![(0usize, 1usize)];
        while let Some((node_index, depth)) = stack.pop() {
            assert!(depth <= 3);
            match bvh.nodes[node_index].kind {
                NodeKind::Leaf { count, .. } => assert_eq!(count, 1),
                NodeKind::Interior { left_child, axis } => {
                    assert_eq!(axis, Axis::X);
                    stack.push((left_child as usize, depth + 1));
                    stack.push((left_child as usize + 1, depth + 1));
                }
            }
        }
        assert_eq!(bvh.index_count(), 4);
        bvh.assert_consistent(&triangles);
    }

    /// A triangle spanning a row of walls gets referenced from both sides of
    /// a spatial split.
    #[test]
    fn test_sbvh_spatial_split_duplicates_spanning_triangle() {
        let triangles = spanning_wall_scene();
        let bvh = Bvh::build_sbvh(&triangles, &SbvhConfig::default()).unwrap();

        assert!(!bvh.nodes[0].is_leaf());
        assert_eq!(bvh.nodes[0].split_axis(), Axis::X);
        assert!(bvh.index_count() > triangles.len());
        assert!(bvh.index_count() <= 4 * triangles.len());
        bvh.assert_consistent(&triangles);

        // Children of a spatial split stay inside the parent bounds.
        let left_child = bvh.nodes[0].left_child();
        for child in [left_child, left_child + 1] {
            assert!(bvh.nodes[0]
                .aabb
                .approx_contains_aabb_eps(&bvh.nodes[child].aabb, crate::EPSILON));
        }
    }

    /// Coincident primitives cannot be separated spatially; the leaf cap
    /// still bounds every emitted leaf.
    #[test]
    fn test_sbvh_leaf_cap_on_coincident_input() {
        let triangles: Vec<_> = (0..100)
            .map(|_| unit_triangle_at(Point3::new(1.0, 2.0, 3.0)))
            .collect();
        let config = SbvhConfig {
            max_primitives_in_leaf: 4,
            ..SbvhConfig::default()
        };
        let bvh = Bvh::build_sbvh(&triangles, &config).unwrap();

        for node in &bvh.nodes[2..] {
            if let NodeKind::Leaf { count, .. } = node.kind {
                assert!(count <= 4);
            }
        }
        assert_eq!(bvh.index_count(), 100);
        assert!(bvh.node_count() <= 400);
        bvh.assert_consistent(&triangles);
    }

    /// `alpha = 1` never considers spatial splits, so no reference is ever
    /// duplicated and the tree is a pure object-split hierarchy.
    #[test]
    fn test_sbvh_alpha_one_never_duplicates() {
        let triangles = create_n_cubes(10, &default_bounds());
        let config = SbvhConfig {
            alpha: 1.0,
            ..SbvhConfig::default()
        };
        let bvh = Bvh::build_sbvh(&triangles, &config).unwrap();

        assert_eq!(bvh.index_count(), triangles.len());
        let unique: HashSet<u32> = bvh.indices.iter().copied().collect();
        assert_eq!(unique.len(), triangles.len());
        bvh.assert_consistent(&triangles);
    }

    /// The same input and configuration always produce the same tree.
    #[test]
    fn test_sbvh_is_deterministic() {
        let triangles = spanning_wall_scene();
        let a = Bvh::build_sbvh(&triangles, &SbvhConfig::default()).unwrap();
        let b = Bvh::build_sbvh(&triangles, &SbvhConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    /// A default-configuration build of a generated scene passes every
    /// structural check and stays within its storage bounds.
    #[test]
    fn test_sbvh_random_scene_is_consistent() {
        let triangles = create_n_cubes(10, &default_bounds());
        let bvh = Bvh::build_sbvh(&triangles, &SbvhConfig::default()).unwrap();

        assert!(bvh.index_count() >= triangles.len());
        assert!(bvh.index_count() <= 4 * triangles.len());
        assert!(bvh.node_count() <= 4 * triangles.len());
        bvh.assert_consistent(&triangles);
    }

    #[test]
    fn test_sbvh_rejects_invalid_config() {
        let triangles = [unit_triangle_at(Point3::new(0.0, 0.0, 0.0))];
        for config in [
            SbvhConfig {
                max_primitives_in_leaf: 0,
                ..SbvhConfig::default()
            },
            SbvhConfig {
                bin_count: 1,
                ..SbvhConfig::default()
            },
            SbvhConfig {
                alpha: 1.5,
                ..SbvhConfig::default()
            },
            SbvhConfig {
                over_allocation_factor: 1.0,
                ..SbvhConfig::default()
            },
        ] {
            assert!(matches!(
                Bvh::build_sbvh(&triangles, &config),
                Err(BuildError::InvalidConfig { .. })
            ));
        }
    }

    /// With the tightest allowed over-allocation, a duplicating scene runs
    /// out of node slots and reports it instead of building a broken tree.
    #[test]
    fn test_sbvh_reports_overflow() {
        let triangles = spanning_wall_scene();
        let config = SbvhConfig {
            over_allocation_factor: 2.0,
            ..SbvhConfig::default()
        };
        let result = Bvh::build_sbvh(&triangles, &config);
        assert!(matches!(
            result,
            Err(BuildError::NodeOverflow { .. }) | Err(BuildError::ReferenceOverflow { .. })
        ));
    }

    /// Degenerate primitives with point bounds are routed by centroid and
    /// never lost.
    #[test]
    fn test_sbvh_point_degenerate_primitives() {
        let mut triangles = spanning_wall_scene();
        let p = Point3::new(5.0, 0.25, 0.5);
        triangles.push(Triangle::new(p, p, p));

        let bvh = Bvh::build_sbvh(&triangles, &SbvhConfig::default()).unwrap();
        bvh.assert_consistent(&triangles);
    }
}
