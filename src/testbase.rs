//! Common utilities shared by unit tests.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::aabb::{Aabb, Bounded};
use crate::triangle::Triangle;
use crate::{Point3, Real, Vector3};

/// A vector represented as a tuple.
pub type TupleVec = (f32, f32, f32);

/// Generate a [`TupleVec`] for [`proptest::strategy::Strategy`] from -10e10 to 10e10.
/// A small enough range to prevent most fp32 errors from breaking certain tests.
pub fn tuplevec_small_strategy() -> impl Strategy<Value = TupleVec> {
    (
        -10e10_f32..10e10_f32,
        -10e10_f32..10e10_f32,
        -10e10_f32..10e10_f32,
    )
}

/// Convert a [`TupleVec`] to a [`Point3`].
pub fn tuple_to_point(tpl: &TupleVec) -> Point3 {
    Point3::new(tpl.0, tpl.1, tpl.2)
}

/// Define some [`Bounded`] structure.
#[derive(PartialEq, Debug)]
pub struct UnitBox {
    pub id: i32,
    pub pos: Point3,
}

impl UnitBox {
    pub fn new(id: i32, pos: Point3) -> UnitBox {
        UnitBox { id, pos }
    }
}

/// [`UnitBox`]'s boxes are unit [`Aabb`]'s centered on the box's position.
impl Bounded for UnitBox {
    fn aabb(&self) -> Aabb {
        let min = self.pos + Vector3::new(-0.5, -0.5, -0.5);
        let max = self.pos + Vector3::new(0.5, 0.5, 0.5);
        Aabb::with_bounds(min, max)
    }
}

/// A flat triangle whose box is the unit square around `pos` in x/y.
pub fn unit_triangle_at(pos: Point3) -> Triangle {
    Triangle::new(
        Point3::new(pos.x - 0.5, pos.y - 0.5, pos.z),
        Point3::new(pos.x + 0.5, pos.y - 0.5, pos.z),
        Point3::new(pos.x, pos.y + 0.5, pos.z),
    )
}

/// One long triangle spanning a row of eight wall triangles. The object
/// split has to keep the long triangle's box on one side, so a spatial
/// split through the middle prices clearly better and references it from
/// both children.
pub fn spanning_wall_scene() -> Vec<Triangle> {
    let mut triangles = vec![Triangle::new(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(20.0, 0.0, 1.0),
        Point3::new(10.0, 0.5, 0.0),
    )];
    for k in 0..8 {
        let x = 2.0 * k as Real;
        triangles.push(Triangle::new(
            Point3::new(x, -0.25, 0.0),
            Point3::new(x + 1.0, -0.25, 1.0),
            Point3::new(x, 0.75, 0.5),
        ));
    }
    triangles
}

/// Corner `i` of a box; bit `d` of `i` selects the max corner over the min
/// corner on axis `d`.
fn corner(aabb: &Aabb, i: usize) -> Point3 {
    Point3::new(aabb[i & 1].x, aabb[(i >> 1) & 1].y, aabb[(i >> 2) & 1].z)
}

/// The six faces of a box as corner-index quads, each fanned into two
/// triangles below. The builders only ever look at bounds, so the winding
/// does not matter.
const CUBE_FACES: [[usize; 4]; 6] = [
    [0, 1, 3, 2],
    [4, 5, 7, 6],
    [0, 1, 5, 4],
    [2, 3, 7, 6],
    [0, 2, 6, 4],
    [1, 3, 7, 5],
];

/// Pushes the twelve surface triangles of a unit cube centered at `pos`.
fn push_cube(pos: Point3, shapes: &mut Vec<Triangle>) {
    let half = Vector3::new(0.5, 0.5, 0.5);
    let aabb = Aabb::with_bounds(pos - half, pos + half);
    for quad in CUBE_FACES {
        let [a, b, c, d] = quad.map(|i| corner(&aabb, i));
        shapes.push(Triangle::new(a, b, c));
        shapes.push(Triangle::new(a, c, d));
    }
}

/// Implementation of splitmix64.
/// For reference see: http://xoroshiro.di.unimi.it/splitmix64.c
fn splitmix64(x: &mut u64) -> u64 {
    *x = x.wrapping_add(0x9E3779B97F4A7C15u64);
    let mut z = *x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9u64);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EBu64);
    z ^ (z >> 31)
}

/// The high 24 bits of one draw, mapped to `[0, 1)`. Staying within the
/// f32 mantissa keeps the sample exact, so scenes reproduce bit for bit.
fn unit_sample(seed: &mut u64) -> Real {
    (splitmix64(seed) >> 40) as Real / (1u64 << 24) as Real
}

/// Generates a new [`Point3`] inside the given [`Aabb`], one draw per
/// coordinate. Mutates the seed.
pub fn next_point3(seed: &mut u64, aabb: &Aabb) -> Point3 {
    let size = aabb.size();
    aabb.min
        + Vector3::new(
            unit_sample(seed) * size.x,
            unit_sample(seed) * size.y,
            unit_sample(seed) * size.z,
        )
}

/// The box all generated test scenes are placed in.
pub fn default_bounds() -> Aabb {
    Aabb::with_bounds(
        Point3::new(-1000.0, -1000.0, -1000.0),
        Point3::new(1000.0, 1000.0, 1000.0),
    )
}

/// Scatters `n` unit cubes (twelve triangles each) through `bounds`,
/// deterministically from a fixed seed.
pub fn create_n_cubes(n: usize, bounds: &Aabb) -> Vec<Triangle> {
    let mut seed = 0x5bd1e995;
    let mut shapes = Vec::with_capacity(12 * n);
    for _ in 0..n {
        push_cube(next_point3(&mut seed, bounds), &mut shapes);
    }
    shapes
}

/// Returns the scene with its primitives deterministically shuffled.
pub fn shuffle_scene(mut triangles: Vec<Triangle>, seed: u64) -> Vec<Triangle> {
    let mut rng = StdRng::seed_from_u64(seed);
    triangles.shuffle(&mut rng);
    triangles
}
