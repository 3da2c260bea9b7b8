//! HTTP transport: JSON-RPC over POST, a heartbeat SSE stream and a health
//! probe.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use mcp_cloudfs_core::Storage;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Server, ServerError};

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

#[derive(Debug)]
pub struct HttpOptions {
    pub addr: String,
    /// When set, every route except `/healthz` requires `Bearer <token>`.
    pub auth_token: Option<SecretString>,
    pub heartbeat: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".into(),
            auth_token: None,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

struct HttpState<S> {
    server: Server<S>,
    auth_token: Option<Arc<SecretString>>,
    heartbeat: Duration,
    shutdown: CancellationToken,
}

impl<S> Clone for HttpState<S> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            auth_token: self.auth_token.clone(),
            heartbeat: self.heartbeat,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S> HttpState<S> {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.auth_token else {
            return true;
        };
        let Some(value) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        match value.trim().strip_prefix("Bearer ") {
            Some(token) => constant_time_eq(token.trim(), expected.expose_secret()),
            None => false,
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response()
}

/// Builds the HTTP surface. Heartbeat streams end once `shutdown` fires.
pub fn router<S>(server: Server<S>, options: &HttpOptions, shutdown: CancellationToken) -> Router
where
    S: Storage + Send + Sync + 'static,
{
    let state = HttpState {
        server,
        auth_token: options
            .auth_token
            .as_ref()
            .map(|t| Arc::new(SecretString::new(t.expose_secret().to_owned()))),
        heartbeat: options.heartbeat,
        shutdown,
    };
    Router::new()
        .route("/rpc", post(rpc::<S>))
        .route("/mcp", post(rpc::<S>))
        .route("/events", get(events::<S>))
        .route("/sse", get(events::<S>))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn rpc<S>(State(state): State<HttpState<S>>, headers: HeaderMap, body: Bytes) -> Response
where
    S: Storage + Send + Sync + 'static,
{
    if !state.authorized(&headers) {
        warn!("rejected rpc request without valid bearer token");
        return unauthorized();
    }
    let line = String::from_utf8_lossy(&body);
    match state.server.handle_line(&line).await {
        Some(response) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            response,
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn events<S>(State(state): State<HttpState<S>>, headers: HeaderMap) -> Response
where
    S: Storage + Send + Sync + 'static,
{
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(1);
    let token = state.shutdown.clone();
    let period = state.heartbeat;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let event = Event::default()
                        .event("heartbeat")
                        .data(Utc::now().to_rfc3339());
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("heartbeat stream closed");
    });
    Sse::new(ReceiverStream::new(rx)).into_response()
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

impl<S> Server<S>
where
    S: Storage + Send + Sync + 'static,
{
    /// Serves HTTP until Ctrl-C, then drains in-flight requests.
    pub async fn run_http(&self, options: HttpOptions) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(&options.addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: options.addr.clone(),
                reason: e.to_string(),
            })?;
        let shutdown_token = CancellationToken::new();
        let app = router(self.clone(), &options, shutdown_token.clone());
        info!(addr = %options.addr, auth = options.auth_token.is_some(), "http server listening");

        let server_shutdown = shutdown_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl_c received; shutting down http server");
            }
            server_shutdown.cancel();
        });
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
            .await?;
        info!("http server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use mcp_cloudfs_storage_ephemeral::EphemeralStorage;
    use serde_json::Value;
    use tokio_stream::StreamExt;
    use tower::ServiceExt;

    fn app(token: Option<&str>) -> (Router, CancellationToken) {
        let server = Server::new(EphemeralStorage::new()).unwrap();
        let options = HttpOptions {
            auth_token: token.map(|t| SecretString::new(t.to_string())),
            heartbeat: Duration::from_millis(10),
            ..HttpOptions::default()
        };
        let shutdown = CancellationToken::new();
        (router(server, &options, shutdown.clone()), shutdown)
    }

    fn post_rpc(uri: &str, body: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rpc_round_trip_on_both_paths() {
        let (app, _) = app(None);
        for uri in ["/rpc", "/mcp"] {
            let resp = app
                .clone()
                .oneshot(post_rpc(uri, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, None))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(json_body(resp).await["result"], json!({}));
        }
    }

    #[tokio::test]
    async fn bearer_token_is_checked_before_parsing() {
        let (app, _) = app(Some("s3cret"));
        let resp = app
            .clone()
            .oneshot(post_rpc("/rpc", "{garbage", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await, json!({ "error": "unauthorized" }));

        let resp = app
            .clone()
            .oneshot(post_rpc("/rpc", "{garbage", Some("wrong!")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(post_rpc("/rpc", "{garbage", Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["error"]["code"], json!(-32700));
    }

    #[tokio::test]
    async fn notifications_return_no_content() {
        let (app, _) = app(None);
        let resp = app
            .oneshot(post_rpc(
                "/rpc",
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn healthz_skips_auth() {
        let (app, _) = app(Some("s3cret"));
        let resp = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn heartbeat_streams_until_shutdown() {
        let (app, shutdown) = app(None);
        let resp = app
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let mut stream = resp.into_body().into_data_stream();
        let first = stream.next().await.unwrap().unwrap();
        let frame = String::from_utf8_lossy(&first).to_string();
        assert!(frame.contains("event: heartbeat"), "{frame}");

        shutdown.cancel();
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while stream.next().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "stream should end after shutdown");
    }

    #[test]
    fn token_compare_requires_exact_match() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
