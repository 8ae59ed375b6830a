//! Triangle primitives as consumed by the builders.

use crate::aabb::{Aabb, Bounded};
use crate::Point3;

/// A triangle with an opaque material handle.
///
/// The builders only ever look at the bounding box and the centroid; the
/// vertices and the material id are carried for the caller (intersection
/// kernels, shading) and never interpreted here.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Triangle {
    /// First vertex.
    pub a: Point3,
    /// Second vertex.
    pub b: Point3,
    /// Third vertex.
    pub c: Point3,
    /// Opaque material handle, carried through untouched.
    pub material_id: u32,
    aabb: Aabb,
}

impl Triangle {
    /// Creates a triangle with material id 0.
    pub fn new(a: Point3, b: Point3, c: Point3) -> Triangle {
        Triangle::with_material(a, b, c, 0)
    }

    /// Creates a triangle with the given material handle.
    pub fn with_material(a: Point3, b: Point3, c: Point3, material_id: u32) -> Triangle {
        Triangle {
            a,
            b,
            c,
            material_id,
            aabb: Aabb::empty().grow(&a).grow(&b).grow(&c),
        }
    }
}

impl Bounded for Triangle {
    fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// The vertex mean, not the box center.
    fn centroid(&self) -> Point3 {
        Point3::from((self.a.coords + self.b.coords + self.c.coords) / 3.0)
    }
}
