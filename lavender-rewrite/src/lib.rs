//! Serve-time half of lavender.
//!
//! A [`RewriteEngine`] combines the published [`lavender_index::Index`] with a
//! [`ConsistentHash`] ring over the configured CDN nodes. The streaming
//! [`HtmlProcessor`] and [`CssProcessor`] scan response bodies character by
//! character and hand every rewritable reference to a [`Rewriter`], forwarding
//! everything else untouched.
//!
//! The engine is immutable once built and meant to be shared behind an `Arc`;
//! processors are cheap, per response, and never shared between threads.

pub mod consistent_hash;
pub mod css;
pub mod engine;
pub mod error;
pub mod html;
pub mod processor;

pub use consistent_hash::ConsistentHash;
pub use css::{rewrite_css, CssProcessor};
pub use engine::{BoundRewriter, Nodes, RewriteEngine};
pub use error::{RewriteError, RewriteResult};
pub use html::{rewrite_html, HtmlProcessor};
pub use processor::{Processor, ProcessorWriter, Rewriter};
