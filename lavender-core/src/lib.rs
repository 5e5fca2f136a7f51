//! Publish-time half of lavender.
//!
//! A [`Module`] yields [`Resource`]s from some source tree. [`publish`] runs
//! them through the module's md5 cache and a [`Distributor`], which writes
//! changed content to every target [`Docroot`] and keeps the per-module and
//! all-indexes identical across targets. [`gc`] and [`validate`] are the
//! operational tools for docroots that drifted.

pub mod distributor;
pub mod docroot;
pub mod error;
pub mod gc;
pub mod lock;
pub mod module;
pub mod publish;
pub mod resource;
pub mod validate;

pub use distributor::Distributor;
pub use docroot::Docroot;
pub use error::{CoreError, CoreResult};
pub use gc::{collect_garbage, GcReport};
pub use lock::Lock;
pub use module::{file::FileModule, jar::JarEntry, jar::JarModule, Module, ModuleConfig};
pub use publish::{publish, publish_to, PublishReport};
pub use resource::{Resource, ResourceData};
pub use validate::{validate, validate_cluster, Problem, ValidateOptions, ValidationReport};
