//! Leaf utilities shared by the publish and rewrite crates: content hashes,
//! the line codec used by every persisted lavender file, and atomic file
//! replacement.

pub mod codec;
pub mod error;
pub mod fs;
pub mod content_hash;

pub use error::{CommonError, CommonResult};
pub use content_hash::Md5;
