//! Extension resource resolver
//!
//! Extension resources (role assignments, locks, diagnostic settings...) hang
//! off a parent outside the containment hierarchy, under
//! `{parent}/providers/{type}`. They are listed one level deep for every
//! parent and never expanded further.

use super::crawler::CrawlContext;
use super::fetcher::list_resource;
use super::pool::TaskPool;
use super::schema::SchemaTree;
use super::types::{id_of, scope_of, ErrorSet, ListError, ListResult, Resource, ResourceSet};
use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Decides whether a candidate is kept: `(parent properties, candidate properties)`
pub type ResourceFilter = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

pub const ROLE_ASSIGNMENTS: &str = "Microsoft.Authorization/roleAssignments";

/// A requested extension resource type
#[derive(Clone)]
pub struct ExtensionResource {
    pub resource_type: String,
    pub filter: Option<ResourceFilter>,
}

impl fmt::Debug for ExtensionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionResource")
            .field("resource_type", &self.resource_type)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl ExtensionResource {
    pub fn new(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            filter: None,
        }
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Extension type with the filter this tool applies to it by default.
    ///
    /// Role assignments are only kept when their scope is the parent itself,
    /// otherwise every inherited assignment shows up under every resource.
    pub fn with_default_filter(resource_type: &str) -> Self {
        let ext = Self::new(resource_type);
        if resource_type.eq_ignore_ascii_case(ROLE_ASSIGNMENTS) {
            ext.with_filter(scope_matches_parent)
        } else {
            ext
        }
    }
}

/// Keep candidates whose `properties.scope` equals the parent's id
pub fn scope_matches_parent(parent: &Value, candidate: &Value) -> bool {
    match (id_of(parent), scope_of(candidate)) {
        (Some(id), Some(scope)) => id.eq_ignore_ascii_case(scope),
        _ => false,
    }
}

/// Every requested type must be known to the schema
pub fn validate_extension_types(schema: &SchemaTree, extensions: &[ExtensionResource]) -> Result<()> {
    for ext in extensions {
        let known = schema
            .get(&ext.resource_type)
            .and_then(|entry| entry.latest_version())
            .is_some();
        if !known {
            return Err(Error::configuration(format!(
                "no schema entry found for extension resource type {}",
                ext.resource_type
            )));
        }
    }
    Ok(())
}

/// List the requested extension resources of every resource in `resources`.
///
/// Returns `resources` merged with the extension resources found, sorted by
/// id, plus listing failures sorted by endpoint.
pub async fn list_extension_resources(
    ctx: &CrawlContext,
    resources: Vec<Resource>,
    extensions: &[ExtensionResource],
) -> Result<(Vec<Resource>, Vec<ListError>)> {
    validate_extension_types(&ctx.schema, extensions)?;

    let mut found: ResourceSet = resources.into_iter().collect();
    let mut errors = ErrorSet::new();
    if extensions.is_empty() {
        return Ok((found.into_sorted(), Vec::new()));
    }

    let parents: Vec<Resource> = found.iter().cloned().collect();
    let mut pool: TaskPool<ListResult, Error> = TaskPool::new(ctx.parallelism);
    for parent in &parents {
        tracing::debug!("Listing extension resources of {}", parent.id);
        for ext in extensions {
            // validated above
            let Some(version) = ctx
                .schema
                .get(&ext.resource_type)
                .and_then(|entry| entry.latest_version())
                .map(str::to_string)
            else {
                continue;
            };
            let backend = Arc::clone(&ctx.backend);
            let cancel = ctx.cancel.clone();
            let parent = parent.clone();
            let child_type = format!("providers/{}", ext.resource_type);
            let filter = ext.filter.clone();
            pool.add_task(async move {
                list_resource(
                    backend.as_ref(),
                    &cancel,
                    &parent,
                    &child_type,
                    &version,
                    filter.as_ref(),
                )
                .await
            });
        }
    }

    let mut discovered = Vec::new();
    pool.wait(|result| {
        discovered.extend(result.resources);
        errors.extend(result.errors);
    })
    .await?;

    for res in discovered {
        found.insert(res);
    }

    Ok((found.into_sorted(), errors.into_sorted()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_filter_keeps_only_exact_scope() {
        let parent = json!({"id": "P"});
        let same = json!({"id": "a", "properties": {"scope": "P"}});
        let other = json!({"id": "b", "properties": {"scope": "Q"}});
        let missing = json!({"id": "c", "properties": {}});

        assert!(scope_matches_parent(&parent, &same));
        assert!(scope_matches_parent(&parent, &json!({"properties": {"scope": "p"}})));
        assert!(!scope_matches_parent(&parent, &other));
        assert!(!scope_matches_parent(&parent, &missing));
        assert!(!scope_matches_parent(&json!({}), &same));
    }

    #[test]
    fn test_default_filter_only_for_role_assignments() {
        assert!(ExtensionResource::with_default_filter("microsoft.authorization/roleassignments")
            .filter
            .is_some());
        assert!(ExtensionResource::with_default_filter("Microsoft.Authorization/locks")
            .filter
            .is_none());
    }

    #[test]
    fn test_unknown_extension_type_is_configuration_error() {
        let schema = SchemaTree::from_json(r#"{"Microsoft.Authorization/locks": ["2020-05-01"]}"#).unwrap();
        assert!(validate_extension_types(&schema, &[ExtensionResource::new("Microsoft.Authorization/locks")]).is_ok());

        let err = validate_extension_types(&schema, &[ExtensionResource::new(ROLE_ASSIGNMENTS)]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
