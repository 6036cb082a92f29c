//! The driver tag cache and the group abstraction it is indexed by.

pub mod cache;
pub mod group;
