//! Axis Aligned Bounding Boxes.

use std::fmt;
use std::ops::Index;

use crate::{Point3, Real, Vector3};

/// An axis aligned bounding box, stored as a pair of corner points.
///
/// A box with `min > max` on any axis is *invalid*. Invalid boxes arise on
/// purpose: [`Aabb::empty`] is the identity element of [`Aabb::join`], and
/// [`Aabb::overlap`] of two disjoint boxes is inverted. Invalid boxes report
/// a surface area of zero and must not be fed back into geometry.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    /// Minimum coordinates.
    pub min: Point3,

    /// Maximum coordinates.
    pub max: Point3,
}

/// A trait implemented by things which can be bounded by an [`Aabb`].
pub trait Bounded {
    /// Returns the [`Aabb`] bounding `self`.
    fn aabb(&self) -> Aabb;

    /// Returns the point the builders sort and partition by.
    /// Defaults to the center of the bounding box.
    fn centroid(&self) -> Point3 {
        self.aabb().center()
    }
}

impl Aabb {
    /// Creates a new [`Aabb`] with the given bounds.
    pub fn with_bounds(min: Point3, max: Point3) -> Aabb {
        Aabb { min, max }
    }

    /// Creates a new empty [`Aabb`], the identity element of [`Aabb::join`].
    pub fn empty() -> Aabb {
        Aabb {
            min: Point3::new(Real::INFINITY, Real::INFINITY, Real::INFINITY),
            max: Point3::new(Real::NEG_INFINITY, Real::NEG_INFINITY, Real::NEG_INFINITY),
        }
    }

    /// Builds the bounding box of a point set by folding [`Aabb::grow`] over
    /// [`Aabb::empty`].
    pub fn from_points(points: &[Point3]) -> Aabb {
        points.iter().fold(Aabb::empty(), |aabb, p| aabb.grow(p))
    }

    /// `min <= max` on every axis.
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Returns true if the [`Point3`] is inside the [`Aabb`].
    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Returns true if `other` is inside this [`Aabb`], within `epsilon` on
    /// every axis.
    pub fn approx_contains_aabb_eps(&self, other: &Aabb, epsilon: Real) -> bool {
        (other.min.x - self.min.x) > -epsilon
            && (other.max.x - self.max.x) < epsilon
            && (other.min.y - self.min.y) > -epsilon
            && (other.max.y - self.max.y) < epsilon
            && (other.min.z - self.min.z) > -epsilon
            && (other.max.z - self.max.z) < epsilon
    }

    /// Returns a new minimal [`Aabb`] which contains both this [`Aabb`] and the point `p`.
    pub fn grow(&self, p: &Point3) -> Aabb {
        Aabb::with_bounds(
            Point3::new(
                self.min.x.min(p.x),
                self.min.y.min(p.y),
                self.min.z.min(p.z),
            ),
            Point3::new(
                self.max.x.max(p.x),
                self.max.y.max(p.y),
                self.max.z.max(p.z),
            ),
        )
    }

    /// Grows this [`Aabb`] in place to contain the point `p`.
    pub fn grow_mut(&mut self, p: &Point3) {
        *self = self.grow(p);
    }

    /// Returns a new minimal [`Aabb`] which contains both this [`Aabb`] and `other`.
    pub fn join(&self, other: &Aabb) -> Aabb {
        Aabb::with_bounds(
            Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        )
    }

    /// Joins `other` into this [`Aabb`] in place.
    pub fn join_mut(&mut self, other: &Aabb) {
        *self = self.join(other);
    }

    /// Componentwise intersection of `a` and `b`. The result is invalid when
    /// the boxes are disjoint; callers must check [`Aabb::is_valid`].
    pub fn overlap(a: &Aabb, b: &Aabb) -> Aabb {
        Aabb::with_bounds(
            Point3::new(
                a.min.x.max(b.min.x),
                a.min.y.max(b.min.y),
                a.min.z.max(b.min.z),
            ),
            Point3::new(
                a.max.x.min(b.max.x),
                a.max.y.min(b.max.y),
                a.max.z.min(b.max.z),
            ),
        )
    }

    /// Returns the size of this [`Aabb`] in all three dimensions.
    pub fn size(&self) -> Vector3 {
        self.max - self.min
    }

    /// Returns the center point of the [`Aabb`].
    pub fn center(&self) -> Point3 {
        self.min + (self.size() * 0.5)
    }

    /// Returns the total surface area of this [`Aabb`], or zero for an
    /// invalid box.
    pub fn surface_area(&self) -> Real {
        if !self.is_valid() {
            return 0.0;
        }
        let size = self.size();
        2.0 * (size.x * size.y + size.x * size.z + size.y * size.z)
    }
}

impl Default for Aabb {
    fn default() -> Aabb {
        Aabb::empty()
    }
}

impl fmt::Display for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Min bound: {}; Max bound: {}", self.min, self.max)
    }
}

/// Make [`Aabb`]s indexable. `aabb[0]` gives a reference to the minimum bound.
/// All other indices return a reference to the maximum bound.
impl Index<usize> for Aabb {
    type Output = Point3;

    fn index(&self, index: usize) -> &Point3 {
        if index == 0 {
            &self.min
        } else {
            &self.max
        }
    }
}

/// Implementation of [`Bounded`] for single points.
impl Bounded for Point3 {
    fn aabb(&self) -> Aabb {
        Aabb::with_bounds(*self, *self)
    }
}
