//! Throwaway origin servers for relay tests

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::sync::{Arc, Mutex};

/// A request as the fake origin saw it
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    headers: HeaderMap,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

/// Shared log of every request an origin received
#[derive(Debug, Clone, Default)]
pub struct OriginLog(Arc<Mutex<Vec<SeenRequest>>>);

impl OriginLog {
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.0.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

async fn record(State(log): State<OriginLog>, req: Request, next: Next) -> Response {
    if let Ok(mut seen) = log.0.lock() {
        seen.push(SeenRequest {
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            headers: req.headers().clone(),
        });
    }
    next.run(req).await
}

/// Serve `router` on an ephemeral port, returning its base URL
pub async fn spawn_origin(router: Router, log: OriginLog) -> String {
    let app = router.layer(middleware::from_fn_with_state(log, record));
    serve(app).await
}

/// Serve any router on an ephemeral port, returning its base URL
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{}", addr)
}
