//! Static-resource HTTP endpoint (spec §4.10): serves the pre-formatted
//! shape bundle addressed by its minute-granular key. Grounded on the
//! original Python `handle_static_data_request`/`static_data` route
//! (`original_source/zet/webserver/webserver.py`).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::Mutex;

use crate::static_index::StaticSnapshotRecord;

const CACHE_HIT: &str = "public, max-age=31536000";
const CACHE_MISS: &str = "no-cache";

#[derive(Clone)]
pub struct StaticEndpointState {
    history: Arc<Mutex<Vec<StaticSnapshotRecord>>>,
}

impl StaticEndpointState {
    pub fn new(history: Arc<Mutex<Vec<StaticSnapshotRecord>>>) -> Self {
        Self { history }
    }

    pub fn router(self) -> Router {
        Router::new().route("/static/{key}", get(handle_get)).with_state(self)
    }
}

async fn handle_get(Path(key): Path<String>, State(state): State<StaticEndpointState>) -> Response {
    let history = state.history.lock().await;
    match history.iter().find(|s| s.key == key) {
        Some(snapshot) => {
            let mut response = snapshot.preformatted_json.clone().into_response();
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_HIT));
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        None => {
            let mut response = (StatusCode::NOT_FOUND, "static data not found").into_response();
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_MISS));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_index::StaticIndex;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    fn snapshot(key: &str, json: &str) -> StaticSnapshotRecord {
        StaticSnapshotRecord {
            key: key.to_string(),
            index: StaticIndex::default(),
            preformatted_json: json.to_string(),
        }
    }

    #[tokio::test]
    async fn known_key_returns_200_with_long_cache_header() {
        let history = Arc::new(Mutex::new(vec![snapshot("2024-01-01-00-00", "{\"shapes\":{}}")]));
        let app = StaticEndpointState::new(history).router();

        let response = app
            .oneshot(Request::get("/static/2024-01-01-00-00").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            CACHE_HIT
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{\"shapes\":{}}");
    }

    #[tokio::test]
    async fn unknown_key_returns_404_with_no_cache_header() {
        let history = Arc::new(Mutex::new(vec![snapshot("2024-01-01-00-00", "{}")]));
        let app = StaticEndpointState::new(history).router();

        let response = app
            .oneshot(Request::get("/static/stale-key").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            CACHE_MISS
        );
    }

    #[tokio::test]
    async fn key_evicted_after_fourth_snapshot_returns_404() {
        let history = Arc::new(Mutex::new(vec![
            snapshot("k1", "{}"),
            snapshot("k2", "{}"),
            snapshot("k3", "{}"),
        ]));
        {
            let mut h = history.lock().await;
            h.remove(0);
            h.push(snapshot("k4", "{}"));
        }
        let app = StaticEndpointState::new(history).router();

        let response = app
            .oneshot(Request::get("/static/k1").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
