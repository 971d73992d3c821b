//! Xtream Codes Proxy Routes
//!
//! These routes act as a proxy between the frontend and Xtream Codes servers.
//! The browser sends the provider credentials with every call; nothing is
//! stored server-side and the provider's JSON is returned untouched.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::routes::relay::inbound_is_https;
use crate::services::xtream::{ListAction, XtreamClient, XtreamError, XtreamProxyRequest};
use crate::AppState;

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiError>;

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

fn upstream_error(context: &str, err: XtreamError) -> ApiError {
    error!("Xtream {} error: {}", context, err);
    api_error(StatusCode::BAD_GATEWAY, err.to_string())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Validate the body and build a client for the provider it names
fn client_for(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Json<XtreamProxyRequest>, JsonRejection>,
) -> Result<(XtreamClient, XtreamProxyRequest), ApiError> {
    let Json(request) = body.map_err(|e| bad_request(e.body_text()))?;

    let config = &request.config;
    if config.server_url.trim().is_empty() {
        return Err(bad_request("Server URL is required"));
    }
    if config.username.is_empty() || config.password.is_empty() {
        return Err(bad_request("Username and password are required"));
    }
    if url::Url::parse(config.server_url.trim()).is_err() {
        return Err(bad_request("Server URL must be an absolute http(s) URL"));
    }

    let mut creds = config.credentials();
    // An HTTPS page cannot call an HTTP provider from the browser either
    if state.config.upgrade_origin_https && inbound_is_https(headers) {
        let upgraded = creds.upgraded_to_https();
        if upgraded != creds {
            info!("Upgrading API request for {} to HTTPS", creds.server);
            creds = upgraded;
        }
    }

    Ok((XtreamClient::new(state.xtream_http.clone(), &creds), request))
}

fn list_action(request: &XtreamProxyRequest, categories: bool) -> Result<ListAction, ApiError> {
    let action: ListAction = request
        .action
        .as_deref()
        .ok_or_else(|| bad_request("action is required"))?
        .parse()
        .map_err(|e: String| bad_request(e))?;

    if action.is_category_listing() != categories {
        return Err(bad_request(format!(
            "Action {} is not valid for this endpoint",
            action
        )));
    }
    Ok(action)
}

fn required_id(value: Option<i64>, name: &str) -> Result<i64, ApiError> {
    value.ok_or_else(|| bad_request(format!("{} is required", name)))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /api/xtream/authenticate
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<XtreamProxyRequest>, JsonRejection>,
) -> ApiResult {
    let (client, _) = client_for(&state, &headers, body)?;
    let profile = client
        .authenticate()
        .await
        .map_err(|e| upstream_error("authenticate", e))?;
    Ok(Json(profile))
}

/// POST /api/xtream/categories
pub async fn categories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<XtreamProxyRequest>, JsonRejection>,
) -> ApiResult {
    let (client, request) = client_for(&state, &headers, body)?;
    let action = list_action(&request, true)?;
    let data = client
        .list(action, None)
        .await
        .map_err(|e| upstream_error("categories", e))?;
    Ok(Json(data))
}

/// POST /api/xtream/streams
pub async fn streams(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<XtreamProxyRequest>, JsonRejection>,
) -> ApiResult {
    let (client, request) = client_for(&state, &headers, body)?;
    let action = list_action(&request, false)?;
    let data = client
        .list(action, request.category_id.as_deref())
        .await
        .map_err(|e| upstream_error("streams", e))?;
    Ok(Json(data))
}

/// POST /api/xtream/epg
pub async fn epg(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<XtreamProxyRequest>, JsonRejection>,
) -> ApiResult {
    let (client, request) = client_for(&state, &headers, body)?;
    let stream_id = required_id(request.stream_id, "streamId")?;
    let data = client
        .short_epg(stream_id)
        .await
        .map_err(|e| upstream_error("EPG", e))?;
    Ok(Json(data))
}

/// POST /api/xtream/vod-info
pub async fn vod_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<XtreamProxyRequest>, JsonRejection>,
) -> ApiResult {
    let (client, request) = client_for(&state, &headers, body)?;
    let vod_id = required_id(request.vod_id, "vodId")?;
    let data = client
        .vod_info(vod_id)
        .await
        .map_err(|e| upstream_error("VOD info", e))?;
    Ok(Json(data))
}

/// POST /api/xtream/series-info
pub async fn series_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<XtreamProxyRequest>, JsonRejection>,
) -> ApiResult {
    let (client, request) = client_for(&state, &headers, body)?;
    let series_id = required_id(request.series_id, "seriesId")?;
    let data = client
        .series_info(series_id)
        .await
        .map_err(|e| upstream_error("series info", e))?;
    Ok(Json(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::test_origin::{serve, spawn_origin, OriginLog};
    use axum::{extract::Query, routing::get, Router};
    use std::collections::HashMap;

    /// Provider that echoes the query it received
    async fn provider(log: OriginLog) -> String {
        spawn_origin(
            Router::new().route(
                "/player_api.php",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    Json(serde_json::json!({ "echo": q }))
                }),
            ),
            log,
        )
        .await
    }

    async fn api() -> String {
        let state = Arc::new(AppState::new(Config::from_env()).unwrap());
        serve(crate::app(state)).await
    }

    fn body(server: &str, extra: Value) -> Value {
        let mut body = serde_json::json!({
            "config": { "serverUrl": server, "username": "user", "password": "pass" }
        });
        if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        body
    }

    #[tokio::test]
    async fn test_streams_forwards_action_and_category() {
        let server = provider(OriginLog::default()).await;
        let api = api().await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/xtream/streams", api))
            .json(&body(
                &server,
                serde_json::json!({ "action": "get_live_streams", "categoryId": "4" }),
            ))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        let data: Value = response.json().await.unwrap();
        assert_eq!(data["echo"]["action"], "get_live_streams");
        assert_eq!(data["echo"]["category_id"], "4");
        assert_eq!(data["echo"]["username"], "user");
    }

    #[tokio::test]
    async fn test_detail_endpoints_pass_ids() {
        let server = provider(OriginLog::default()).await;
        let api = api().await;
        let client = reqwest::Client::new();

        let vod: Value = client
            .post(format!("{}/api/xtream/vod-info", api))
            .json(&body(&server, serde_json::json!({ "vodId": 77 })))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(vod["echo"]["action"], "get_vod_info");
        assert_eq!(vod["echo"]["vod_id"], "77");

        let epg: Value = client
            .post(format!("{}/api/xtream/epg", api))
            .json(&body(&server, serde_json::json!({ "streamId": 5 })))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(epg["echo"]["action"], "get_short_epg");
    }

    #[tokio::test]
    async fn test_invalid_bodies_are_rejected() {
        let api = api().await;
        let client = reqwest::Client::new();

        let missing_config = client
            .post(format!("{}/api/xtream/authenticate", api))
            .json(&serde_json::json!({ "action": "get_series" }))
            .send()
            .await
            .unwrap();
        assert_eq!(missing_config.status().as_u16(), 400);

        let wrong_endpoint = client
            .post(format!("{}/api/xtream/categories", api))
            .json(&body("http://x.example", serde_json::json!({ "action": "get_series" })))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong_endpoint.status().as_u16(), 400);

        let unknown_action = client
            .post(format!("{}/api/xtream/streams", api))
            .json(&body("http://x.example", serde_json::json!({ "action": "drop_tables" })))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown_action.status().as_u16(), 400);

        let missing_id = client
            .post(format!("{}/api/xtream/series-info", api))
            .json(&body("http://x.example", serde_json::json!({})))
            .send()
            .await
            .unwrap();
        assert_eq!(missing_id.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_provider_failure_is_bad_gateway() {
        let server = spawn_origin(
            Router::new().route(
                "/player_api.php",
                get(|| async { StatusCode::UNAUTHORIZED }),
            ),
            OriginLog::default(),
        )
        .await;
        let api = api().await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/xtream/authenticate", api))
            .json(&body(&server, serde_json::json!({})))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 502);
        let data: Value = response.json().await.unwrap();
        assert_eq!(data["error"], "HTTP error! status: 401");
    }
}
