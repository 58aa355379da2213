//! Integration tests for the ARM client using wiremock
//!
//! These tests verify the client against mocked Resource Manager and
//! Resource Graph endpoints: pagination, status handling and the
//! end-to-end listing flow.

use azlist::azure::auth::{AzureCredentials, StaticTokenCredential};
use azlist::azure::client::ArmClient;
use azlist::azure::cloud::CloudEnvironment;
use azlist::resource::{
    fetch_seed_resources, list_resource, Resource, ResourceBackend, SchemaTree, SeedQuery,
};
use azlist::{ApiError, Error, Lister, Options};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{bearer_token, body_partial_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
const GRAPH_PATH: &str = "/providers/Microsoft.ResourceGraph/resources";

fn vnet_id(name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/{}",
        SUBSCRIPTION, name
    )
}

fn client(server: &MockServer) -> ArmClient {
    let credentials = AzureCredentials::new(
        Arc::new(StaticTokenCredential::new("test-token")),
        CloudEnvironment::Public,
    );
    ArmClient::new(SUBSCRIPTION, credentials, CloudEnvironment::Public)
        .expect("client should build")
        .with_endpoint(&server.uri())
}

fn vnet(name: &str) -> Resource {
    Resource::from_properties(json!({"id": vnet_id(name), "name": name})).unwrap()
}

/// Test module for child collection listing
mod listing_tests {
    use super::*;

    /// Test that listing follows nextLink until it is absent
    #[tokio::test]
    async fn test_list_children_follows_next_link() {
        let server = MockServer::start().await;
        let parent = vnet("vnet1");
        let subnets = format!("{}/SUBNETS", vnet_id("vnet1"));

        Mock::given(method("GET"))
            .and(path(subnets.as_str()))
            .and(query_param("api-version", "2023-05-01"))
            .and(bearer_token("test-token"))
            .and(header_exists("x-ms-client-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": format!("{}/subnet1", subnets)}],
                "nextLink": format!("{}/page2", server.uri())
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": format!("{}/subnet2", subnets)}]
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let result = list_resource(
            &client,
            &CancellationToken::new(),
            &parent,
            "SUBNETS",
            "2023-05-01",
            None,
        )
        .await
        .unwrap();

        assert_eq!(result.resources.len(), 2);
        assert!(result.errors.is_empty());
        assert!(result.resources[1].id.as_str().ends_with("/subnet2"));
    }

    /// Test 404 means "no children" and is not recorded
    #[tokio::test]
    async fn test_404_yields_no_children_and_no_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "NotFound", "message": "not here"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client
            .list_children(&vnet_id("vnet1"), "SUBNETS", "2023-05-01", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let result = list_resource(
            &client,
            &CancellationToken::new(),
            &vnet("vnet1"),
            "SUBNETS",
            "2023-05-01",
            None,
        )
        .await
        .unwrap();
        assert!(result.resources.is_empty());
        assert!(result.errors.is_empty());
    }

    /// Test 500 is recorded as exactly one listing error
    #[tokio::test]
    async fn test_500_yields_one_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"code": "InternalServerError", "message": "boom"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let result = list_resource(
            &client,
            &CancellationToken::new(),
            &vnet("vnet1"),
            "SUBNETS",
            "2023-05-01",
            None,
        )
        .await
        .unwrap();

        assert!(result.resources.is_empty());
        assert_eq!(result.errors.len(), 1);
        let error = &result.errors[0];
        assert_eq!(error.endpoint, format!("{}/SUBNETS", vnet_id("vnet1")).to_uppercase());
        assert_eq!(error.api_version, "2023-05-01");
        assert!(error.message.contains("status 500"));
        assert!(error.message.contains("boom"));
    }

    /// Test an item without id is recorded and skipped
    #[tokio::test]
    async fn test_item_without_id_is_recorded() {
        let server = MockServer::start().await;
        let subnets = format!("{}/SUBNETS", vnet_id("vnet1"));

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "anonymous"}, {"id": format!("{}/subnet1", subnets)}]
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let result = list_resource(
            &client,
            &CancellationToken::new(),
            &vnet("vnet1"),
            "SUBNETS",
            "2023-05-01",
            None,
        )
        .await
        .unwrap();

        assert_eq!(result.resources.len(), 1);
        assert_eq!(result.errors.len(), 1);
    }

    /// Test 401 is retried once and then surfaces as a status error
    #[tokio::test]
    async fn test_401_returns_status_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": "InvalidAuthenticationToken", "message": "expired"}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client.get_resource_group("rg1").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        match err {
            ApiError::Status { message, method, .. } => {
                assert_eq!(message, "expired");
                assert_eq!(method, "GET");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

/// Test module for the Resource Graph seed query
mod seed_query_tests {
    use super::*;

    fn seed() -> SeedQuery {
        SeedQuery {
            table: "Resources".to_string(),
            predicate: "resourceGroup =~ 'rg1'".to_string(),
            subscription_id: SUBSCRIPTION.to_string(),
            authorization_scope_filter: None,
        }
    }

    /// Test seed query pages with skip token and offset
    #[tokio::test]
    async fn test_seed_query_paging() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GRAPH_PATH))
            .and(query_param("api-version", "2021-03-01"))
            .and(body_partial_json(json!({
                "options": {"$skipToken": "page2", "$skip": 1000}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalRecords": 2,
                "count": 1,
                "data": [{"id": vnet_id("vnet1")}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(GRAPH_PATH))
            .and(bearer_token("test-token"))
            .and(body_partial_json(json!({
                "subscriptions": [SUBSCRIPTION],
                "query": "Resources | where resourceGroup =~ 'rg1' | order by id desc",
                "options": {"$top": 1000, "resultFormat": "objectArray"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalRecords": 2,
                "count": 1,
                "data": [{"id": vnet_id("vnet2")}],
                "$skipToken": "page2"
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let resources = fetch_seed_resources(&client, &CancellationToken::new(), &seed())
            .await
            .unwrap();

        let ids: Vec<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![vnet_id("vnet1"), vnet_id("vnet2")]);
    }

    /// Test a seed query failure is fatal
    #[tokio::test]
    async fn test_seed_query_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GRAPH_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": "BadRequest", "message": "bad predicate"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = fetch_seed_resources(&client, &CancellationToken::new(), &seed())
            .await
            .unwrap_err();
        match err {
            Error::SeedQuery { message, .. } => assert!(message.contains("bad predicate")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Test a missing continuation token is reported instead of looping
    #[tokio::test]
    async fn test_seed_query_missing_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GRAPH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalRecords": 5,
                "count": 1,
                "data": [{"id": vnet_id("vnet1")}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let err = fetch_seed_resources(&client, &CancellationToken::new(), &seed())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SeedQuery { .. }));
    }
}

/// Test module for the full listing flow
mod lister_tests {
    use super::*;

    /// Test recursive listing with resource group enrichment end to end
    #[tokio::test]
    async fn test_recursive_list_with_resource_group() {
        let server = MockServer::start().await;
        let subnets = format!("{}/SUBNETS", vnet_id("vnet1"));

        Mock::given(method("POST"))
            .and(path(GRAPH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalRecords": 2,
                "count": 2,
                "data": [
                    {"id": vnet_id("vnet1")},
                    {"id": vnet_id("managed"), "managedBy": "someone"}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(subnets.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": format!("{}/subnet1", subnets)}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/resourcegroups/rg1", SUBSCRIPTION).as_str()))
            .and(query_param("api-version", "2021-04-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": format!("/subscriptions/{}/resourceGroups/rg1", SUBSCRIPTION),
                "name": "rg1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let schema = SchemaTree::from_json(
            r#"{
                "Microsoft.Network/virtualNetworks": ["2023-05-01"],
                "Microsoft.Network/virtualNetworks/subnets": ["2022-01-01", "2023-05-01"]
            }"#,
        )
        .unwrap();

        let lister = Lister::new(
            Arc::new(client(&server)),
            Arc::new(schema),
            Options {
                subscription_id: SUBSCRIPTION.to_string(),
                parallelism: Some(2),
                recursive: true,
                include_resource_group: true,
                ..Default::default()
            },
        )
        .unwrap();

        let result = lister.list("resourceGroup =~ 'rg1'").await.unwrap();
        let ids: Vec<String> = result.resources.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                format!("/subscriptions/{}/resourceGroups/rg1", SUBSCRIPTION),
                vnet_id("vnet1"),
                format!("{}/subnet1", subnets),
            ]
        );
        assert!(result.errors.is_empty());
    }
}
