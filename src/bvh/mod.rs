//! This module defines [`Bvh`] and its builders.

mod bvh_impl;
mod node;
mod partition;
mod sbvh;

pub use self::bvh_impl::*;
pub use self::node::*;
