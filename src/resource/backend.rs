//! The seam between the crawl engine and the network adapters

use crate::error::ApiError;
use async_trait::async_trait;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;

/// Page size requested from the seed query
pub const SEED_PAGE_SIZE: u32 = 1000;

/// Resource Graph authorization scope filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[value(rename_all = "verbatim")]
pub enum AuthorizationScopeFilter {
    AtScopeAndBelow,
    AtScopeAndAbove,
    AtScopeAboveAndBelow,
    AtScopeExact,
}

/// One request against the indexed resource catalog
#[derive(Debug, Clone, PartialEq)]
pub struct SeedQueryRequest {
    pub query: String,
    pub subscriptions: Vec<String>,
    pub top: u32,
    pub skip: Option<u32>,
    pub skip_token: Option<String>,
    pub authorization_scope_filter: Option<AuthorizationScopeFilter>,
}

/// One page of seed query results
#[derive(Debug, Clone, Default)]
pub struct SeedQueryPage {
    pub items: Vec<Value>,
    pub total_records: u64,
    pub count: u64,
    pub skip_token: Option<String>,
}

/// One page of a child collection listing
#[derive(Debug, Clone, Default)]
pub struct ChildPage {
    pub items: Vec<Value>,
    pub next_link: Option<String>,
}

/// Capabilities the crawl engine needs from the outside world.
///
/// `list_children` with `next_link == None` fetches the first page of
/// `{parent_id}/{resource_type}`; otherwise it follows the opaque link.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    async fn query_resources(&self, request: &SeedQueryRequest) -> Result<SeedQueryPage, ApiError>;

    async fn list_children(
        &self,
        parent_id: &str,
        resource_type: &str,
        api_version: &str,
        next_link: Option<&str>,
    ) -> Result<ChildPage, ApiError>;

    async fn get_resource_group(&self, name: &str) -> Result<Value, ApiError>;
}
