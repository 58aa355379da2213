//! Lister
//!
//! Sequences the seed query, child crawl, managed-resource filtering,
//! resource group enrichment and extension listing into one result.

use crate::error::{ApiError, Error, Result};
use crate::resource::fetcher::cancellable;
use crate::resource::{
    fetch_seed_resources, list_child_resources, list_extension_resources, sort_resources,
    validate_extension_types, AuthorizationScopeFilter, CrawlContext, ErrorSet,
    ExtensionResource, ListResult, Resource, ResourceBackend, ResourceSet, RootScope, SchemaTree,
    SeedQuery,
};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

/// Default Resource Graph table
pub const DEFAULT_TABLE: &str = "Resources";

/// Listing options
#[derive(Debug, Clone)]
pub struct Options {
    pub subscription_id: String,
    /// Concurrent listings; `None` uses the host's available parallelism
    pub parallelism: Option<usize>,
    pub recursive: bool,
    pub include_managed: bool,
    pub include_resource_group: bool,
    pub extension_resource_types: Vec<ExtensionResource>,
    pub table: String,
    pub authorization_scope_filter: Option<AuthorizationScopeFilter>,
    /// Where logs go; `None` discards them
    pub logger: Option<Dispatch>,
    pub cancel: CancellationToken,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            parallelism: None,
            recursive: false,
            include_managed: false,
            include_resource_group: false,
            extension_resource_types: Vec::new(),
            table: DEFAULT_TABLE.to_string(),
            authorization_scope_filter: None,
            logger: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Number of concurrent listings used when none is configured
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

pub struct Lister {
    subscription_id: String,
    ctx: CrawlContext,
    recursive: bool,
    include_managed: bool,
    include_resource_group: bool,
    extensions: Vec<ExtensionResource>,
    table: String,
    authorization_scope_filter: Option<AuthorizationScopeFilter>,
    dispatch: Dispatch,
}

impl Lister {
    /// Validate `options` against the schema and build a lister
    pub fn new(
        backend: Arc<dyn ResourceBackend>,
        schema: Arc<SchemaTree>,
        options: Options,
    ) -> Result<Self> {
        if options.subscription_id.trim().is_empty() {
            return Err(Error::configuration("subscription id is empty"));
        }
        let parallelism = match options.parallelism {
            Some(0) => return Err(Error::configuration("parallelism must be at least 1")),
            Some(n) => n,
            None => default_parallelism(),
        };
        validate_extension_types(&schema, &options.extension_resource_types)?;

        let table = if options.table.trim().is_empty() {
            DEFAULT_TABLE.to_string()
        } else {
            options.table
        };

        Ok(Self {
            subscription_id: options.subscription_id,
            ctx: CrawlContext::new(backend, schema, parallelism).with_cancellation(options.cancel),
            recursive: options.recursive,
            include_managed: options.include_managed,
            include_resource_group: options.include_resource_group,
            extensions: options.extension_resource_types,
            table,
            authorization_scope_filter: options.authorization_scope_filter,
            dispatch: options.logger.unwrap_or_else(Dispatch::none),
        })
    }

    pub fn parallelism(&self) -> usize {
        self.ctx.parallelism
    }

    /// List every resource matching `predicate`, expanded per the options.
    ///
    /// Output from a cancelled run is never returned.
    pub async fn list(&self, predicate: &str) -> Result<ListResult> {
        self.list_inner(predicate)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn list_inner(&self, predicate: &str) -> Result<ListResult> {
        tracing::info!(
            subscription = %self.subscription_id,
            predicate,
            parallelism = self.ctx.parallelism,
            recursive = self.recursive,
            include_managed = self.include_managed,
            "List begins"
        );

        tracing::debug!("Listing tracked resources");
        let seed = SeedQuery {
            table: self.table.clone(),
            predicate: predicate.to_string(),
            subscription_id: self.subscription_id.clone(),
            authorization_scope_filter: self.authorization_scope_filter,
        };
        let mut resources =
            fetch_seed_resources(self.ctx.backend.as_ref(), &self.ctx.cancel, &seed).await?;

        let mut errors = ErrorSet::new();
        if self.recursive {
            tracing::debug!("Listing child resources");
            let (expanded, child_errors) = list_child_resources(&self.ctx, resources).await?;
            resources = expanded;
            errors.extend(child_errors);
        }

        if !self.include_managed {
            resources.retain(|res| match res.managed_by() {
                Some(by) => {
                    tracing::debug!("Removing managed resource {} (managed by {})", res.id, by);
                    false
                }
                None => true,
            });
        }

        if self.include_resource_group {
            tracing::debug!("Listing resource groups");
            let mut groups = self.list_resource_groups(&resources).await?;
            groups.append(&mut resources);
            resources = groups;
        }

        if !self.extensions.is_empty() {
            tracing::debug!("Listing extension resources");
            let (extended, ext_errors) =
                list_extension_resources(&self.ctx, resources, &self.extensions).await?;
            resources = extended;
            errors.extend(ext_errors);
        }

        if self.ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        sort_resources(&mut resources);
        let errors = errors.into_sorted();
        tracing::info!(resources = resources.len(), errors = errors.len(), "List ends");

        Ok(ListResult { resources, errors })
    }

    /// Fetch the distinct resource groups containing `resources`, sorted by
    /// id, leaving out groups already present in `resources`.
    async fn list_resource_groups(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        let present: ResourceSet = resources.iter().cloned().collect();
        let mut seen = HashSet::new();
        let mut groups = ResourceSet::new();

        for res in resources {
            let root = res.id.root_scope();
            let RootScope::ResourceGroup { name, .. } = root else {
                continue;
            };
            if !seen.insert(root.to_string().to_uppercase()) {
                continue;
            }

            tracing::debug!("Getting resource group {}", name);
            let body = cancellable(
                &self.ctx.cancel,
                self.ctx.backend.get_resource_group(name),
            )
            .await??;
            let group = Resource::from_properties(body).map_err(|message| {
                ApiError::Decode(format!("resource group {name}: {message}"))
            })?;

            if !present.contains(&group.id) {
                groups.insert(group);
            }
        }

        Ok(groups.into_sorted())
    }
}
