//! Resource discovery engine
//!
//! Everything here is independent of the network: the adapters in
//! [`crate::azure`] plug in through [`ResourceBackend`].
//!
//! # Architecture
//!
//! - [`id`] - ARM resource id parsing, root and route scopes
//! - [`schema`] - Resource type hierarchy built from the schema snapshot
//! - [`pool`] - Bounded concurrent task pool with a serialized collector
//! - [`fetcher`] - Seed query pagination and per-endpoint child listing
//! - [`crawler`] - Breadth-first expansion into child resources
//! - [`extension`] - One-level listing of extension resource types
//!
//! # Example
//!
//! ```ignore
//! use azlist::resource::{list_child_resources, CrawlContext, SchemaTree};
//!
//! async fn expand(ctx: &CrawlContext, seed: Vec<Resource>) -> azlist::Result<()> {
//!     let (resources, errors) = list_child_resources(ctx, seed).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod crawler;
pub mod extension;
pub mod fetcher;
pub mod id;
pub mod pool;
pub mod schema;
mod types;

pub use backend::{
    AuthorizationScopeFilter, ChildPage, ResourceBackend, SeedQueryPage, SeedQueryRequest,
    SEED_PAGE_SIZE,
};
pub use crawler::{list_child_resources, CrawlContext};
pub use extension::{
    list_extension_resources, scope_matches_parent, validate_extension_types, ExtensionResource,
    ResourceFilter, ROLE_ASSIGNMENTS,
};
pub use fetcher::{fetch_seed_resources, list_resource, SeedQuery};
pub use id::{ResourceId, RootScope};
pub use pool::TaskPool;
pub use schema::{SchemaEntry, SchemaSnapshot, SchemaTree};
pub use types::*;
