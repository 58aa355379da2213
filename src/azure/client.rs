//! ARM Client
//!
//! Main client for Azure Resource Manager, combining authentication and HTTP
//! functionality. Implements [`ResourceBackend`] for the crawl engine.

use super::auth::AzureCredentials;
use super::cloud::CloudEnvironment;
use super::http::ArmHttpClient;
use crate::error::ApiError;
use crate::resource::{ChildPage, ResourceBackend, SeedQueryPage, SeedQueryRequest};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use url::Url;

/// Resource Graph API version used for the seed query
pub const RESOURCE_GRAPH_API_VERSION: &str = "2021-03-01";

/// Resources API version used for resource group lookups
pub const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    pub credentials: AzureCredentials,
    pub http: ArmHttpClient,
    pub subscription_id: String,
    endpoint: String,
}

impl ArmClient {
    /// Create a new ARM client for `subscription_id` in `cloud`
    pub fn new(
        subscription_id: &str,
        credentials: AzureCredentials,
        cloud: CloudEnvironment,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            credentials,
            http: ArmHttpClient::new()?,
            subscription_id: subscription_id.to_string(),
            endpoint: cloud.resource_manager_endpoint().to_string(),
        })
    }

    /// Point the client at a different Resource Manager endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    async fn get_token(&self) -> Result<String, ApiError> {
        self.credentials
            .get_token()
            .await
            .map_err(|e| ApiError::Auth(format!("{e:#}")))
    }

    async fn refresh_token(&self) -> Result<String, ApiError> {
        tracing::debug!("Token rejected, refreshing");
        self.credentials
            .refresh_token()
            .await
            .map_err(|e| ApiError::Auth(format!("{e:#}")))
    }

    /// Make a GET request to ARM, retrying once with a fresh token on 401
    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.get_token().await?;
        match self.http.get(url, &token).await {
            Err(e) if e.status() == Some(401) => {
                let token = self.refresh_token().await?;
                self.http.get(url, &token).await
            }
            other => other,
        }
    }

    /// Make a POST request to ARM, retrying once with a fresh token on 401
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value, ApiError> {
        let token = self.get_token().await?;
        match self.http.post(url, &token, body).await {
            Err(e) if e.status() == Some(401) => {
                let token = self.refresh_token().await?;
                self.http.post(url, &token, body).await
            }
            other => other,
        }
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build a Resource Manager URL
    pub fn resource_manager_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    /// Build the URL listing `resource_type` under `parent_id`
    pub fn list_child_url(
        &self,
        parent_id: &str,
        resource_type: &str,
        api_version: &str,
    ) -> Result<String, ApiError> {
        let raw = self.resource_manager_url(&format!(
            "{}/{}",
            parent_id.trim_matches('/'),
            resource_type.trim_matches('/')
        ));
        let mut url = Url::parse(&raw)
            .map_err(|e| ApiError::Decode(format!("invalid listing url {raw:?}: {e}")))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url.to_string())
    }

    /// Build the Resource Graph query URL
    pub fn resource_graph_url(&self) -> String {
        self.resource_manager_url(&format!(
            "providers/Microsoft.ResourceGraph/resources?api-version={}",
            RESOURCE_GRAPH_API_VERSION
        ))
    }

    /// Build the URL of a resource group in the client's subscription
    pub fn resource_group_url(&self, name: &str) -> String {
        self.resource_manager_url(&format!(
            "subscriptions/{}/resourcegroups/{}?api-version={}",
            urlencoding::encode(&self.subscription_id),
            urlencoding::encode(name),
            RESOURCE_GROUP_API_VERSION
        ))
    }
}

/// Build the Resource Graph request body
fn seed_query_body(request: &SeedQueryRequest) -> Value {
    let mut options = Map::new();
    options.insert("resultFormat".to_string(), json!("objectArray"));
    options.insert("$top".to_string(), json!(request.top));
    if let Some(skip) = request.skip {
        options.insert("$skip".to_string(), json!(skip));
    }
    if let Some(token) = &request.skip_token {
        options.insert("$skipToken".to_string(), json!(token));
    }
    if let Some(filter) = request.authorization_scope_filter {
        options.insert("authorizationScopeFilter".to_string(), json!(filter));
    }

    json!({
        "subscriptions": request.subscriptions,
        "query": request.query,
        "options": Value::Object(options),
    })
}

fn parse_seed_page(response: Value) -> Result<SeedQueryPage, ApiError> {
    let items = match response.get("data") {
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(ApiError::Decode(
                "query response data is not an object array".to_string(),
            ))
        }
        None => return Err(ApiError::Decode("query response has no data".to_string())),
    };

    let count = response
        .get("count")
        .and_then(|v| v.as_u64())
        .unwrap_or(items.len() as u64);

    Ok(SeedQueryPage {
        total_records: response
            .get("totalRecords")
            .and_then(|v| v.as_u64())
            .unwrap_or(count),
        count,
        skip_token: response
            .get("$skipToken")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        items,
    })
}

fn parse_child_page(response: Value) -> Result<ChildPage, ApiError> {
    let items = match response.get("value") {
        Some(Value::Array(items)) => items.clone(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err(ApiError::Decode("listing value is not an array".to_string())),
    };

    Ok(ChildPage {
        items,
        next_link: response
            .get("nextLink")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}

#[async_trait]
impl ResourceBackend for ArmClient {
    async fn query_resources(&self, request: &SeedQueryRequest) -> Result<SeedQueryPage, ApiError> {
        let response = self
            .post(&self.resource_graph_url(), &seed_query_body(request))
            .await?;
        parse_seed_page(response)
    }

    async fn list_children(
        &self,
        parent_id: &str,
        resource_type: &str,
        api_version: &str,
        next_link: Option<&str>,
    ) -> Result<ChildPage, ApiError> {
        let url = match next_link {
            Some(link) => link.to_string(),
            None => self.list_child_url(parent_id, resource_type, api_version)?,
        };
        let response = self.get(&url).await?;
        parse_child_page(response)
    }

    async fn get_resource_group(&self, name: &str) -> Result<Value, ApiError> {
        self.get(&self.resource_group_url(name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::auth::StaticTokenCredential;
    use crate::resource::AuthorizationScopeFilter;
    use std::sync::Arc;

    fn client() -> ArmClient {
        let credentials = AzureCredentials::new(
            Arc::new(StaticTokenCredential::new("t")),
            CloudEnvironment::Public,
        );
        ArmClient::new("0000", credentials, CloudEnvironment::Public).unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.list_child_url("/subscriptions/0000/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1", "SUBNETS", "2023-01-01").unwrap(),
            "https://management.azure.com/subscriptions/0000/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1/SUBNETS?api-version=2023-01-01"
        );
        assert_eq!(
            client.resource_group_url("my rg"),
            "https://management.azure.com/subscriptions/0000/resourcegroups/my%20rg?api-version=2021-04-01"
        );
        let client = client.with_endpoint("http://127.0.0.1:8080/");
        assert_eq!(
            client.resource_graph_url(),
            "http://127.0.0.1:8080/providers/Microsoft.ResourceGraph/resources?api-version=2021-03-01"
        );
    }

    #[test]
    fn test_seed_query_body() {
        let body = seed_query_body(&SeedQueryRequest {
            query: "Resources | where true".to_string(),
            subscriptions: vec!["0000".to_string()],
            top: 1000,
            skip: Some(1000),
            skip_token: Some("tok".to_string()),
            authorization_scope_filter: Some(AuthorizationScopeFilter::AtScopeExact),
        });
        assert_eq!(body["options"]["$top"], 1000);
        assert_eq!(body["options"]["$skip"], 1000);
        assert_eq!(body["options"]["$skipToken"], "tok");
        assert_eq!(body["options"]["authorizationScopeFilter"], "AtScopeExact");
        assert_eq!(body["options"]["resultFormat"], "objectArray");
        assert_eq!(body["subscriptions"][0], "0000");
    }

    #[test]
    fn test_parse_pages() {
        let page = parse_seed_page(json!({"totalRecords": 3, "count": 1, "data": [{"id": "x"}], "$skipToken": "t"})).unwrap();
        assert_eq!((page.total_records, page.count, page.items.len()), (3, 1, 1));
        assert_eq!(page.skip_token.as_deref(), Some("t"));
        assert!(parse_seed_page(json!({"count": 0})).is_err());

        let page = parse_child_page(json!({"value": [], "nextLink": ""})).unwrap();
        assert!(page.next_link.is_none());
        let page = parse_child_page(json!({})).unwrap();
        assert!(page.items.is_empty());
        assert!(parse_child_page(json!({"value": 1})).is_err());
    }
}
