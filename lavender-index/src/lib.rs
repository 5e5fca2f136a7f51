//! Persistent bookkeeping for published resources.
//!
//! An [`Index`] maps original resource paths to their lavendelized
//! destinations, the [`Md5Cache`] remembers content hashes per source
//! content id so unchanged resources are not re-read on every publish.

pub mod error;
pub mod index;
pub mod label;
pub mod md5_cache;

pub use error::{IndexError, IndexResult};
pub use index::{Index, ALL_IDX};
pub use label::Label;
pub use md5_cache::Md5Cache;
