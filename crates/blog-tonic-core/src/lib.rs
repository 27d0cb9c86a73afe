#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates share the exact `bson` version used
// by `BlogId` and `BlogItem`.
pub use bson;
