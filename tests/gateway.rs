//! End-to-end request handling against a mocked Zoho API and OAuth endpoint

use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::{Value, json};

use zoho_inventory_mcp::inventory::ResourceResolver;
use zoho_inventory_mcp::mcp::McpGateway;
use zoho_inventory_mcp::mcp::gateway::SERVER_NAME;
use zoho_inventory_mcp::mcp::protocol::{
    INTERNAL_ERROR, JsonRpcId, JsonRpcRequest, JsonRpcResponse, RESOURCE_NOT_FOUND,
};
use zoho_inventory_mcp::zoho::{
    CachedToken, ClientOptions, CredentialStore, Credentials, InventoryClient, NoopTokenStore,
};

const ITEMS: &str = "/inventory/v1/items";

/// Gateway whose client starts with the access token `stale`
fn gateway(server: &MockServer) -> McpGateway {
    let credentials = Credentials {
        client_id: "cid".to_string(),
        client_secret: "csecret".to_string(),
        refresh_token: "rtoken".to_string(),
        api_domain: server.base_url(),
        accounts_url: server.base_url(),
        organization_id: "42".to_string(),
    };
    let store = Arc::new(CredentialStore::new(credentials, CachedToken::new("stale", None)));
    let client = InventoryClient::new(store, Arc::new(NoopTokenStore), &ClientOptions::default())
        .expect("client");
    McpGateway::new(SERVER_NAME, ResourceResolver::new(Arc::new(client)))
}

async fn call(gateway: &McpGateway, method: &str, params: Value) -> JsonRpcResponse {
    gateway
        .handle_request(JsonRpcRequest::new(JsonRpcId::Number(1), method, Some(params)))
        .await
}

/// Parsed JSON of the first content entry of a read or tool result
fn body(response: &JsonRpcResponse) -> Value {
    let result = response.result.as_ref().expect("result");
    let text = result
        .pointer("/contents/0/text")
        .or_else(|| result.pointer("/content/0/text"))
        .and_then(Value::as_str)
        .expect("text content");
    serde_json::from_str(text).expect("json text")
}

async fn led_strip_mocks(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path(ITEMS).query_param("organization_id", "42");
            then.status(200).json_body(json!({
                "code": 0,
                "items": [
                    {"item_id": "9", "name": "LED Strip", "sku": "LED Strip - XL Booth", "stock_on_hand": 12}
                ],
                "page_context": {"page": 1, "has_more_page": false}
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/9", ITEMS));
            then.status(200).json_body(json!({
                "code": 0,
                "item": {
                    "item_id": "9",
                    "name": "LED Strip",
                    "sku": "LED Strip - XL Booth",
                    "stock_on_hand": 12,
                    "warehouses": [
                        {"warehouse_id": "1", "warehouse_name": "Main", "warehouse_stock_on_hand": 10},
                        {"warehouse_id": "2", "warehouse_name": "Booth", "warehouse_stock_on_hand": 2}
                    ]
                }
            }));
        })
        .await;
}

#[tokio::test]
async fn initialize_advertises_resources_and_tools() {
    let server = MockServer::start_async().await;
    let response = call(&gateway(&server), "initialize", json!({})).await;

    let result = response.result.expect("result");
    assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    assert!(result["capabilities"]["resources"].is_object());
    assert!(result["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn sku_with_spaces_resolves_encoded_or_raw() {
    let server = MockServer::start_async().await;
    led_strip_mocks(&server).await;
    let gateway = gateway(&server);

    for uri in [
        "inventory://sku/LED%20Strip%20-%20XL%20Booth",
        "inventory://sku/LED Strip - XL Booth",
    ] {
        let response = call(&gateway, "resources/read", json!({ "uri": uri })).await;
        assert!(response.error.is_none(), "{}: {:?}", uri, response.error);

        let result = response.result.as_ref().expect("result");
        assert_eq!(result["contents"][0]["mimeType"], "application/json");

        let body = body(&response);
        assert_eq!(body["sku"], "LED Strip - XL Booth");
        assert_eq!(body["items"][0]["item_id"], "9");
        assert_eq!(body["items"][0]["warehouses"][1]["stock_on_hand"], 2.0);
    }
}

#[tokio::test]
async fn missing_item_is_resource_not_found() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(ITEMS);
            then.status(200).json_body(json!({"code": 0, "items": []}));
        })
        .await;

    let response = call(
        &gateway(&server),
        "resources/read",
        json!({"uri": "inventory://stock/Nothing%20Here"}),
    )
    .await;

    let error = response.error.expect("error");
    assert_eq!(error.code, RESOURCE_NOT_FOUND);
    assert!(error.message.contains("Nothing Here"));
}

#[tokio::test]
async fn update_stock_retries_once_after_refresh() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(ITEMS);
            then.status(200).json_body(json!({
                "code": 0,
                "items": [{"item_id": "7", "name": "Widget A", "sku": "WA-1", "stock_on_hand": 5}]
            }));
        })
        .await;
    let oauth = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth/v2/token")
                .query_param("refresh_token", "rtoken")
                .query_param("grant_type", "refresh_token");
            then.status(200)
                .json_body(json!({"access_token": "fresh", "expires_in": 3600}));
        })
        .await;
    let rejected = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path(format!("{}/7", ITEMS))
                .header("Authorization", "Zoho-oauthtoken stale");
            then.status(401)
                .json_body(json!({"code": 57, "message": "You are not authorized to perform this operation"}));
        })
        .await;
    let accepted = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path(format!("{}/7", ITEMS))
                .header("Authorization", "Zoho-oauthtoken fresh")
                .json_body(json!({"stock_on_hand": 100}));
            then.status(200).json_body(json!({
                "code": 0,
                "item": {"item_id": "7", "name": "Widget A", "sku": "WA-1", "stock_on_hand": 100}
            }));
        })
        .await;

    let response = call(
        &gateway(&server),
        "tools/call",
        json!({"name": "update_stock", "arguments": {"item_name": "Widget A", "quantity": 100}}),
    )
    .await;

    assert_eq!(response.result.as_ref().expect("result").get("isError"), None);
    let body = body(&response);
    assert_eq!(body["success"], true);
    assert_eq!(body["item"]["stock_on_hand"], 100.0);

    oauth.assert_hits_async(1).await;
    rejected.assert_hits_async(1).await;
    accepted.assert_hits_async(1).await;
}

#[tokio::test]
async fn ambiguous_name_never_writes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(ITEMS);
            then.status(200).json_body(json!({
                "code": 0,
                "items": [
                    {"item_id": "1", "name": "Widget", "stock_on_hand": 1},
                    {"item_id": "2", "name": "Widget", "stock_on_hand": 2}
                ]
            }));
        })
        .await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT);
            then.status(200);
        })
        .await;

    let response = call(
        &gateway(&server),
        "tools/call",
        json!({"name": "update_stock", "arguments": {"item_name": "Widget", "quantity": 3}}),
    )
    .await;

    assert_eq!(response.result.as_ref().expect("result")["isError"], true);
    let body = body(&response);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "ambiguous_target");
    put.assert_hits_async(0).await;
}

#[tokio::test]
async fn update_by_sku_posts_the_delta() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(ITEMS);
            then.status(200).json_body(json!({
                "code": 0,
                "items": [{"item_id": "9", "name": "LED Strip", "sku": "LED Strip - XL Booth", "stock_on_hand": 12}]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/9", ITEMS));
            then.status(200).json_body(json!({
                "code": 0,
                "item": {"item_id": "9", "name": "LED Strip", "sku": "LED Strip - XL Booth", "stock_on_hand": 12}
            }));
        })
        .await;
    let adjustment = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/inventory/v1/inventoryadjustments")
                .body_contains("\"adjustment_type\":\"quantity\"")
                .body_contains("\"item_id\":\"9\"");
            then.status(201).json_body(json!({
                "code": 0,
                "inventory_adjustment": {"inventory_adjustment_id": "555", "reason": "recount"}
            }));
        })
        .await;

    let response = call(
        &gateway(&server),
        "tools/call",
        json!({"name": "update_stock_by_sku", "arguments": {
            "sku": "LED Strip - XL Booth", "quantity": 20, "reason": "recount"
        }}),
    )
    .await;

    let body = body(&response);
    assert_eq!(body["success"], true, "{}", body);
    assert_eq!(body["adjustment"]["delta"], 8.0);
    assert_eq!(body["adjustment"]["adjustment"]["adjustment_id"], "555");
    adjustment.assert_hits_async(1).await;
}

#[tokio::test]
async fn revoked_refresh_token_is_reported_not_retried() {
    let server = MockServer::start_async().await;
    let oauth = server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth/v2/token");
            then.status(200).json_body(json!({"error": "invalid_code"}));
        })
        .await;
    let warehouses = server
        .mock_async(|when, then| {
            when.method(GET).path("/inventory/v1/warehouses");
            then.status(401).json_body(json!({"code": 14, "message": "Invalid OAuth token"}));
        })
        .await;

    let response = call(
        &gateway(&server),
        "resources/read",
        json!({"uri": "inventory://warehouses"}),
    )
    .await;

    let error = response.error.expect("error");
    assert_eq!(error.code, INTERNAL_ERROR);
    assert_eq!(error.data, Some(json!({"kind": "auth_fatal"})));
    assert!(error.message.contains("invalid_code"));
    oauth.assert_hits_async(1).await;
    warehouses.assert_hits_async(1).await;
}
