//! Resource Fetcher
//!
//! Paginated walks over the two listing capabilities: the seed query against
//! the indexed catalog, and per-parent child collection listing.

use super::backend::{AuthorizationScopeFilter, ResourceBackend, SeedQueryRequest, SEED_PAGE_SIZE};
use super::extension::ResourceFilter;
use super::types::{sort_resources, ListError, ListResult, Resource};
use crate::error::{Error, Result};
use serde_json::Value;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `fut` unless `cancel` fires first. Dropping the future aborts any
/// request it has in flight.
pub async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        output = fut => Ok(output),
    }
}

/// Parameters of the seed query
#[derive(Debug, Clone)]
pub struct SeedQuery {
    pub table: String,
    pub predicate: String,
    pub subscription_id: String,
    pub authorization_scope_filter: Option<AuthorizationScopeFilter>,
}

impl SeedQuery {
    pub fn query_text(&self) -> String {
        format!("{} | where {} | order by id desc", self.table, self.predicate)
    }
}

/// Run the seed query to completion and return its resources sorted by id.
///
/// Pages are requested with both the continuation token and an offset that
/// advances by the page size, until the cumulative count reaches the
/// reported total.
pub async fn fetch_seed_resources(
    backend: &dyn ResourceBackend,
    cancel: &CancellationToken,
    seed: &SeedQuery,
) -> Result<Vec<Resource>> {
    let query = seed.query_text();
    let seed_error = |message: String| Error::SeedQuery {
        query: query.clone(),
        message,
    };

    let mut request = SeedQueryRequest {
        query: query.clone(),
        subscriptions: vec![seed.subscription_id.clone()],
        top: SEED_PAGE_SIZE,
        skip: None,
        skip_token: None,
        authorization_scope_filter: seed.authorization_scope_filter,
    };

    tracing::debug!("Running seed query: {}", query);
    let page = cancellable(cancel, backend.query_resources(&request))
        .await?
        .map_err(|e| seed_error(e.to_string()))?;

    let mut resources = Vec::new();
    collect_seed_items(page.items, &mut resources).map_err(&seed_error)?;

    let total = page.total_records;
    let mut count = page.count;
    let mut skip = SEED_PAGE_SIZE;
    let mut skip_token = page.skip_token;

    while count < total {
        let Some(token) = skip_token.take() else {
            return Err(seed_error(format!(
                "received {} of {} records but no continuation token",
                count, total
            )));
        };
        request.skip = Some(skip);
        request.skip_token = Some(token);

        tracing::debug!("Fetching seed query page at offset {} ({}/{})", skip, count, total);
        let page = cancellable(cancel, backend.query_resources(&request))
            .await?
            .map_err(|e| seed_error(format!("with skip token: {e}")))?;

        if page.count == 0 {
            return Err(seed_error(format!(
                "empty page after {} of {} records",
                count, total
            )));
        }

        collect_seed_items(page.items, &mut resources).map_err(&seed_error)?;
        count += page.count;
        skip += SEED_PAGE_SIZE;
        skip_token = page.skip_token;
    }

    sort_resources(&mut resources);
    Ok(resources)
}

fn collect_seed_items(items: Vec<Value>, out: &mut Vec<Resource>) -> std::result::Result<(), String> {
    for item in items {
        out.push(Resource::from_properties(item)?);
    }
    Ok(())
}

/// Walk every page of `{parent}/{child_type}`.
///
/// A 404 ends the walk without error. Any other failure ends the walk and is
/// recorded as a [`ListError`]; an item that cannot be parsed is recorded and
/// skipped. Only cancellation is returned as an `Err`.
pub async fn list_resource(
    backend: &dyn ResourceBackend,
    cancel: &CancellationToken,
    parent: &Resource,
    child_type: &str,
    api_version: &str,
    filter: Option<&ResourceFilter>,
) -> Result<ListResult> {
    let mut result = ListResult::default();
    let parent_id = parent.id.as_str();

    tracing::debug!(
        "Listing child resources: parent={}, type={}, api-version={}",
        parent_id,
        child_type,
        api_version
    );

    let mut next_link: Option<String> = None;
    loop {
        let page = cancellable(
            cancel,
            backend.list_children(parent_id, child_type, api_version, next_link.as_deref()),
        )
        .await?;

        let page = match page {
            Ok(page) => page,
            Err(e) if e.is_not_found() => break,
            Err(e) => {
                tracing::warn!("Listing {}/{} failed: {}", parent_id, child_type, e);
                result
                    .errors
                    .push(ListError::new(parent_id, child_type, api_version, e.to_string()));
                break;
            }
        };

        for item in page.items {
            if let Some(filter) = filter {
                if !filter(&parent.properties, &item) {
                    continue;
                }
            }
            match Resource::from_properties(item) {
                Ok(resource) => result.resources.push(resource),
                Err(message) => result
                    .errors
                    .push(ListError::new(parent_id, child_type, api_version, message)),
            }
        }

        match page.next_link {
            Some(link) if !link.is_empty() => next_link = Some(link),
            _ => break,
        }
    }

    Ok(result)
}
