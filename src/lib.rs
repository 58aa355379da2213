//! List Azure resources matching a Resource Graph predicate, optionally
//! expanding them into child resources, their resource groups and extension
//! resources.

pub mod azure;
pub mod config;
pub mod error;
pub mod lister;
pub mod resource;

pub use error::{ApiError, Error, Result};
pub use lister::{Lister, Options, DEFAULT_TABLE};
pub use resource::{ExtensionResource, ListError, ListResult, Resource, ResourceId, SchemaTree};
