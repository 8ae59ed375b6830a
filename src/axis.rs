//! Axis enum for indexing three-dimensional structures.

use crate::{Point3, Real, Vector3};
use std::fmt::{Display, Formatter, Result};
use std::ops::{Index, IndexMut};

/// An `Axis` in a three-dimensional coordinate system.
/// Used to access [`Point3`]/[`Vector3`] structs via index.
///
/// # Examples
/// ```
/// use sbvh::axis::Axis;
///
/// let mut position = [1.0, 0.5, 42.0];
/// position[Axis::Y] *= 4.0;
///
/// assert_eq!(position[Axis::Y], 2.0);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    /// Index of the X axis.
    X = 0,

    /// Index of the Y axis.
    Y = 1,

    /// Index of the Z axis.
    Z = 2,
}

impl Axis {
    /// All three axes in sweep order. The builders iterate this to keep
    /// tie-breaking deterministic: X wins over Y wins over Z.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

/// Display implementation for `Axis`.
impl Display for Axis {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(
            f,
            "{}",
            match *self {
                Axis::X => "x",
                Axis::Y => "y",
                Axis::Z => "z",
            }
        )
    }
}

/// Make slices indexable by `Axis`.
impl Index<Axis> for [Real] {
    type Output = Real;

    fn index(&self, axis: Axis) -> &Real {
        &self[axis as usize]
    }
}

/// Make `Point3` indexable by `Axis`.
impl Index<Axis> for Point3 {
    type Output = Real;

    fn index(&self, axis: Axis) -> &Real {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

/// Make `Vector3` indexable by `Axis`.
impl Index<Axis> for Vector3 {
    type Output = Real;

    fn index(&self, axis: Axis) -> &Real {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

/// Make slices mutably accessible by `Axis`.
impl IndexMut<Axis> for [Real] {
    fn index_mut(&mut self, axis: Axis) -> &mut Real {
        &mut self[axis as usize]
    }
}

/// Make `Point3` mutably accessible by `Axis`.
impl IndexMut<Axis> for Point3 {
    fn index_mut(&mut self, axis: Axis) -> &mut Real {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}

/// Make `Vector3` mutably accessible by `Axis`.
impl IndexMut<Axis> for Vector3 {
    fn index_mut(&mut self, axis: Axis) -> &mut Real {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::aabb::Bounded;
    use crate::axis::Axis;
    use crate::testbase::{tuple_to_point, tuplevec_small_strategy, unit_triangle_at};
    use proptest::prelude::*;

    proptest! {
        /// Axis lookups on a primitive's bounds read the corner fields the
        /// builders partition by.
        #[test]
        fn test_axis_reads_bounds_corners(tpl in tuplevec_small_strategy()) {
            let aabb = unit_triangle_at(tuple_to_point(&tpl)).aabb();

            assert_eq!(aabb.min[Axis::X], aabb.min.x);
            assert_eq!(aabb.min[Axis::Y], aabb.min.y);
            assert_eq!(aabb.min[Axis::Z], aabb.min.z);
            assert_eq!(aabb.max[Axis::X], aabb.max.x);
            assert_eq!(aabb.max[Axis::Y], aabb.max.y);
            assert_eq!(aabb.max[Axis::Z], aabb.max.z);
        }

        /// Axis lookups on a box size agree with the extent between the
        /// corners on every axis.
        #[test]
        fn test_axis_reads_extents(tpl in tuplevec_small_strategy()) {
            let aabb = unit_triangle_at(tuple_to_point(&tpl)).aabb();
            let size = aabb.size();

            for axis in Axis::ALL {
                assert_eq!(size[axis], aabb.max[axis] - aabb.min[axis]);
            }
        }

        /// Writing through an axis moves a point on that axis only.
        #[test]
        fn test_axis_writes_single_component(tpl in tuplevec_small_strategy()) {
            let mut point = tuple_to_point(&tpl);
            let before = point;

            point[Axis::Y] += 1.0;

            assert_eq!(point.x, before.x);
            assert_eq!(point.y, before.y + 1.0);
            assert_eq!(point.z, before.z);
        }
    }

    #[test]
    fn test_sweep_order() {
        assert_eq!(Axis::ALL.map(|a| a as usize), [0, 1, 2]);

        // Scratch slices index the same way.
        let mut extents = [0.0, 0.0, 0.0];
        extents[Axis::Z] = 2.0;
        assert_eq!(extents[2], 2.0);
        assert_eq!(extents[Axis::X], 0.0);
    }
}
