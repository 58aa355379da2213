//! Child resource crawler
//!
//! Breadth-first, level-synchronous expansion of a resource set into the
//! child resources that the seed query does not index. Each level gets its
//! own task pool and the next level starts only after it has drained; all
//! dedup happens on the caller's task between levels.

use super::backend::ResourceBackend;
use super::fetcher::list_resource;
use super::pool::TaskPool;
use super::schema::SchemaTree;
use super::types::{ErrorSet, ListError, ListResult, Resource, ResourceSet};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a crawl task needs, cheap to clone into each task
#[derive(Clone)]
pub struct CrawlContext {
    pub backend: Arc<dyn ResourceBackend>,
    pub schema: Arc<SchemaTree>,
    pub parallelism: usize,
    pub cancel: CancellationToken,
}

impl CrawlContext {
    pub fn new(backend: Arc<dyn ResourceBackend>, schema: Arc<SchemaTree>, parallelism: usize) -> Self {
        Self {
            backend,
            schema,
            parallelism,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Recursively list the child resources of `resources`.
///
/// Returns the input merged with everything discovered, sorted by id, plus
/// the per-endpoint listing failures sorted by endpoint.
pub async fn list_child_resources(
    ctx: &CrawlContext,
    resources: Vec<Resource>,
) -> Result<(Vec<Resource>, Vec<ListError>)> {
    let mut found = ResourceSet::new();
    let mut errors = ErrorSet::new();

    let mut frontier: Vec<Resource> = resources
        .into_iter()
        .filter(|res| found.insert(res.clone()))
        .collect();

    let mut level = 0;
    while !frontier.is_empty() {
        level += 1;
        let mut pool: TaskPool<ListResult, Error> = TaskPool::new(ctx.parallelism);
        for parent in &frontier {
            submit_direct_children(ctx, &mut pool, parent);
        }
        let submitted = pool.len();

        let mut discovered = Vec::new();
        let mut discovered_errors = Vec::new();
        pool.wait(|result| {
            discovered.extend(result.resources);
            discovered_errors.extend(result.errors);
        })
        .await?;

        tracing::debug!(
            "Crawl level {}: {} parents, {} listings, {} resources, {} errors",
            level,
            frontier.len(),
            submitted,
            discovered.len(),
            discovered_errors.len()
        );

        frontier = discovered
            .into_iter()
            .filter(|res| found.insert(res.clone()))
            .collect();
        errors.extend(discovered_errors);
    }

    Ok((found.into_sorted(), errors.into_sorted()))
}

/// Queue one listing per child type the schema declares for `parent`
fn submit_direct_children(ctx: &CrawlContext, pool: &mut TaskPool<ListResult, Error>, parent: &Resource) {
    let route = parent.id.route_scope_string();
    let Some(entry) = ctx.schema.get(&route) else {
        return;
    };

    tracing::debug!("Listing direct child resources of {}", parent.id);
    for (child_type, child) in entry.children() {
        let Some(version) = child.latest_version() else {
            continue;
        };
        let backend = Arc::clone(&ctx.backend);
        let cancel = ctx.cancel.clone();
        let parent = parent.clone();
        let child_type = child_type.to_string();
        let version = version.to_string();
        pool.add_task(async move {
            list_resource(backend.as_ref(), &cancel, &parent, &child_type, &version, None).await
        });
    }
}
