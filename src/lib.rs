//! A crate which exports axis-aligned bounding boxes and offline builders for
//! binary bounding volume hierarchies.
//!
//! ## About
//!
//! A BVH (Bounding Volume Hierarchy) reduces the cost of ray-scene queries
//! from O(n) to O(log2(n)) at the price of building the tree once in advance.
//! This crate contains two builders which share their data structures and
//! partition kernels:
//!
//! * [`Bvh::build`](bvh::Bvh::build) constructs a plain BVH by recursively
//!   partitioning the primitives with a Surface Area Heuristic (SAH) object
//!   split.
//! * [`Bvh::build_sbvh`](bvh::Bvh::build_sbvh) constructs a Split BVH (SBVH),
//!   which additionally considers binned spatial splits. A spatial split may
//!   reference a primitive from both children when it straddles the split
//!   plane, which lowers traversal cost for scenes with large or elongated
//!   primitives.
//!
//! Both builders emit the same flat output: a pre-order array of nodes and a
//! reference array indexed by the leaves. Traversal, wide runtime layouts and
//! persistence are left to the caller.
//!
//! ## Example
//!
//! ```
//! use sbvh::bvh::{Bvh, SbvhConfig};
//! use sbvh::triangle::Triangle;
//! use sbvh::Point3;
//!
//! let triangles = vec![
//!     Triangle::new(
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ),
//!     Triangle::new(
//!         Point3::new(4.0, 0.0, 0.0),
//!         Point3::new(5.0, 0.0, 0.0),
//!         Point3::new(4.0, 1.0, 0.0),
//!     ),
//! ];
//!
//! let bvh = Bvh::build_sbvh(&triangles, &SbvhConfig::default()).unwrap();
//!
//! assert!(bvh.index_count() >= triangles.len());
//! bvh.assert_consistent(&triangles);
//! ```

/// A minimal floating value used as a lower bound.
/// TODO: replace by/add ULPS/relative float comparison methods.
pub const EPSILON: Real = 0.00001;

/// Scalar type used by this crate.
pub type Real = f32;

/// Point math type used by this crate. Type alias for [`nalgebra::Point3`].
pub type Point3 = nalgebra::Point3<Real>;

/// Vector math type used by this crate. Type alias for [`nalgebra::Vector3`].
pub type Vector3 = nalgebra::Vector3<Real>;

pub mod aabb;
pub mod axis;
pub mod bvh;
pub mod triangle;

#[cfg(test)]
mod testbase;
