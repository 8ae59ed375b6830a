//! Partition kernels shared by the two builders: the SAH object-split sweep,
//! the binned spatial-split search, and the three-way index reshuffle.
//!
//! All kernels operate on a range `[first, first + count)` of three index
//! arrays, one per axis, each holding the same references sorted by that
//! axis's centroid coordinate. The kernels keep that invariant intact.

use crate::aabb::{Aabb, Bounded};
use crate::axis::Axis;
use crate::Real;

/// Slack added to the parent bounds on the binned axis, so that no primitive
/// lands exactly on the outer bin borders.
pub(crate) const BIN_EPSILON: Real = 0.001;

/// The best SAH object split found for a range.
#[derive(Debug, Copy, Clone)]
pub(crate) struct ObjectSplit {
    /// SAH cost of the split.
    pub cost: Real,
    /// Axis whose sorted order the split position refers to.
    pub axis: Axis,
    /// Absolute position in that order; the left child owns `[first, index)`.
    pub index: usize,
    /// Bounds of the left child.
    pub aabb_left: Aabb,
    /// Bounds of the right child.
    pub aabb_right: Aabb,
}

/// The best binned spatial split found for a range.
#[derive(Debug, Copy, Clone)]
pub(crate) struct SpatialSplit {
    /// SAH cost of the split.
    pub cost: Real,
    /// Axis the split plane is orthogonal to.
    pub axis: Axis,
    /// Index of the first bin on the right side of the plane.
    pub bin: usize,
    /// Bounds of the left child; grown further by unsplit primitives.
    pub aabb_left: Aabb,
    /// Bounds of the right child; grown further by unsplit primitives.
    pub aabb_right: Aabb,
    /// References entering bins left of the plane. Straddlers count on both
    /// sides, so `count_left + count_right >= count`.
    pub count_left: usize,
    /// References exiting bins right of the plane.
    pub count_right: usize,
}

/// Returns the joint bounds of the referenced primitives.
pub(crate) fn calculate_bounds<P: Bounded>(primitives: &[P], indices: &[u32]) -> Aabb {
    let mut aabb = Aabb::empty();
    for &index in indices {
        aabb.join_mut(&primitives[index as usize].aabb());
    }
    aabb
}

/// Builds the three axis-sorted index arrays the recursions start from.
/// Ties keep the original primitive order, so builds are reproducible.
pub(crate) fn sorted_indices<P: Bounded>(primitives: &[P]) -> [Vec<u32>; 3] {
    std::array::from_fn(|d| {
        let mut axis_indices: Vec<u32> = (0..primitives.len() as u32).collect();
        axis_indices.sort_by(|&a, &b| {
            let ca = primitives[a as usize].centroid()[d];
            let cb = primitives[b as usize].centroid()[d];
            ca.total_cmp(&cb)
        });
        axis_indices
    })
}

/// Sweeps all three axes for the cheapest SAH object split of the range.
///
/// For every axis the forward sweep caches the prefix surface areas in
/// `sah`, the backward sweep grows the suffix box and evaluates the cost
/// `i * area_left(i) + (count - i) * area_right(i)` at every position.
/// Ties are broken towards the earliest axis, then the smallest position.
///
/// `count` must be at least 2; the returned split always has a non-empty
/// side on both ends.
pub(crate) fn object_split<P: Bounded>(
    primitives: &[P],
    indices: &[Vec<u32>; 3],
    first: usize,
    count: usize,
    sah: &mut [Real],
) -> ObjectSplit {
    assert!(count >= 2, "object split needs at least two references");

    let mut best_cost = Real::INFINITY;
    let mut best_axis = Axis::X;
    let mut best_index = 0;

    for axis in Axis::ALL {
        let sorted = &indices[axis as usize][first..first + count];

        let mut aabb = Aabb::empty();
        for (i, &index) in sorted.iter().enumerate() {
            aabb.join_mut(&primitives[index as usize].aabb());
            sah[i] = aabb.surface_area();
        }

        let mut aabb = Aabb::empty();
        let mut axis_cost = Real::INFINITY;
        let mut axis_index = 0;
        for i in (1..count).rev() {
            aabb.join_mut(&primitives[sorted[i] as usize].aabb());

            let cost = i as Real * sah[i - 1] + (count - i) as Real * aabb.surface_area();
            // `<=` so that the last position visited, the smallest one, wins ties.
            if cost <= axis_cost {
                axis_cost = cost;
                axis_index = i;
            }
        }

        if axis_cost < best_cost {
            best_cost = axis_cost;
            best_axis = axis;
            best_index = first + axis_index;
        }
    }

    assert!(best_index > first, "object split found no position");

    // Recompute the child bounds of the winning position in one pass.
    let sorted = &indices[best_axis as usize][first..first + count];
    let split = best_index - first;
    let mut aabb_left = Aabb::empty();
    for &index in &sorted[..split] {
        aabb_left.join_mut(&primitives[index as usize].aabb());
    }
    let mut aabb_right = Aabb::empty();
    for &index in &sorted[split..] {
        aabb_right.join_mut(&primitives[index as usize].aabb());
    }

    ObjectSplit {
        cost: best_cost,
        axis: best_axis,
        index: best_index,
        aabb_left,
        aabb_right,
    }
}

/// Maps a coordinate into a bin, clamped so floating point round-up at the
/// far border cannot escape the last bin.
pub(crate) fn bin_index(coord: Real, bounds_min: Real, bin_scale: Real, bin_count: usize) -> usize {
    (((coord - bounds_min) * bin_scale) as isize).clamp(0, bin_count as isize - 1) as usize
}

/// A spatial bin: the bounds of the primitive fragments inside its slab plus
/// the number of references entering and exiting it.
#[derive(Copy, Clone)]
struct Bin {
    aabb: Aabb,
    entries: usize,
    exits: usize,
}

impl Bin {
    fn empty() -> Bin {
        Bin {
            aabb: Aabb::empty(),
            entries: 0,
            exits: 0,
        }
    }
}

/// Searches all three axes for the cheapest binned spatial split.
///
/// The parent bounds, slightly extended on the binned axis, are divided into
/// `bin_count` equal slabs. Every primitive's box is clipped against the
/// parent and grows each touched bin by the part of the clip inside the
/// bin's slab; the first bin counts an entry, the last an exit. A prefix and
/// a suffix sweep over the bins then price every plane between two bins.
///
/// A primitive whose clip against the parent is invalid (degenerate input)
/// is binned by its centroid alone.
///
/// Returns `None` when every plane has an empty side, which happens whenever
/// all references fall into a single bin.
pub(crate) fn spatial_split<P: Bounded>(
    primitives: &[P],
    indices: &[Vec<u32>; 3],
    first: usize,
    count: usize,
    parent_aabb: &Aabb,
    bin_count: usize,
) -> Option<SpatialSplit> {
    let mut best: Option<SpatialSplit> = None;

    let mut bins = vec![Bin::empty(); bin_count];
    let mut suffix_aabbs = vec![Aabb::empty(); bin_count];
    let mut suffix_exits = vec![0usize; bin_count];

    for axis in Axis::ALL {
        let bounds_min = parent_aabb.min[axis] - BIN_EPSILON;
        let bounds_max = parent_aabb.max[axis] + BIN_EPSILON;
        let bin_step = (bounds_max - bounds_min) / bin_count as Real;
        let bin_scale = bin_count as Real / (bounds_max - bounds_min);

        for bin in bins.iter_mut() {
            *bin = Bin::empty();
        }

        for &index in &indices[axis as usize][first..first + count] {
            let primitive = &primitives[index as usize];
            let clipped = Aabb::overlap(&primitive.aabb(), parent_aabb);

            if clipped.is_valid() {
                let bin_min = bin_index(clipped.min[axis], bounds_min, bin_scale, bin_count);
                let bin_max = bin_index(clipped.max[axis], bounds_min, bin_scale, bin_count);

                for b in bin_min..=bin_max {
                    // Only the part of the clip inside the bin's slab counts.
                    let slab_min = bounds_min + b as Real * bin_step;
                    let slab_max = slab_min + bin_step;
                    let mut fragment = clipped;
                    fragment.min[axis] = fragment.min[axis].max(slab_min);
                    fragment.max[axis] = fragment.max[axis].min(slab_max);
                    bins[b].aabb.join_mut(&fragment);
                }
                bins[bin_min].entries += 1;
                bins[bin_max].exits += 1;
            } else {
                let b = bin_index(primitive.centroid()[axis], bounds_min, bin_scale, bin_count);
                bins[b].aabb.grow_mut(&primitive.centroid());
                bins[b].entries += 1;
                bins[b].exits += 1;
            }
        }

        // Suffix sweep: bounds and exit counts of everything right of each bin.
        let mut aabb = Aabb::empty();
        let mut exits = 0;
        for b in (0..bin_count).rev() {
            aabb.join_mut(&bins[b].aabb);
            exits += bins[b].exits;
            suffix_aabbs[b] = aabb;
            suffix_exits[b] = exits;
        }

        // Prefix sweep: price the plane after every bin but the last.
        let mut aabb_left = Aabb::empty();
        let mut count_left = 0;
        for b in 0..bin_count - 1 {
            aabb_left.join_mut(&bins[b].aabb);
            count_left += bins[b].entries;
            let count_right = suffix_exits[b + 1];

            if count_left == 0 || count_right == 0 {
                continue;
            }

            let cost = aabb_left.surface_area() * count_left as Real
                + suffix_aabbs[b + 1].surface_area() * count_right as Real;
            // Strict `<` keeps the earliest axis and the smallest plane on ties.
            if best.map_or(true, |best| cost < best.cost) {
                best = Some(SpatialSplit {
                    cost,
                    axis,
                    bin: b + 1,
                    aabb_left,
                    aabb_right: suffix_aabbs[b + 1],
                    count_left,
                    count_right,
                });
            }
        }
    }

    best
}

/// Decides the side of `index` under an object split at coordinate `split`
/// on `axis`, whose sorted order puts the split at `split_index`.
///
/// A primitive with a centroid exactly on the split coordinate cannot be
/// classified by comparison alone. It goes left exactly when its reference
/// sits among the left slice of the split axis's sorted order, which is
/// found by scanning that order backwards through the run of equal
/// centroids. Every axis therefore makes the same decision as the
/// position-based split.
pub(crate) fn object_split_side<P: Bounded>(
    primitives: &[P],
    sorted_split_axis: &[u32],
    first: usize,
    split_index: usize,
    axis: Axis,
    split: Real,
    index: u32,
) -> bool {
    let centroid = primitives[index as usize].centroid()[axis];
    if centroid != split {
        return centroid < split;
    }

    let mut j = split_index;
    while j > first {
        j -= 1;
        let other = sorted_split_axis[j];
        if primitives[other as usize].centroid()[axis] != split {
            break;
        }
        if other == index {
            return true;
        }
    }
    false
}

/// Three-way reshuffle after an object split: rearranges every axis's range
/// so the left child owns `[first, split_index)` and the right child the
/// rest, both still sorted by their axis. Stable within each axis; `temp`
/// buffers the right side and must hold at least `count` entries.
pub(crate) fn split_indices<P: Bounded>(
    primitives: &[P],
    indices: &mut [Vec<u32>; 3],
    first: usize,
    count: usize,
    temp: &mut [u32],
    split_axis: Axis,
    split_index: usize,
    split: Real,
) {
    for axis in Axis::ALL {
        let d = axis as usize;
        let mut left = first;
        let mut right = 0;

        for i in first..first + count {
            let index = indices[d][i];
            let goes_left = object_split_side(
                primitives,
                &indices[split_axis as usize],
                first,
                split_index,
                split_axis,
                split,
                index,
            );

            if goes_left {
                indices[d][left] = index;
                left += 1;
            } else {
                temp[right] = index;
                right += 1;
            }
        }

        indices[d][left..left + right].copy_from_slice(&temp[..right]);
        assert_eq!(
            left, split_index,
            "axis {axis} disagrees with the split position"
        );
    }
}
