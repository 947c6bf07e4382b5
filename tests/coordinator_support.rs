//! Test utilities: an in-process mock coordinator speaking the statement
//! protocol.
//!
//! Pages are scripted up front; the coordinator chains them together with
//! `nextUri` links, records every request it receives, and can be told to
//! answer 503 a number of times before a page succeeds.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One scripted page of a query. `body` omits `nextUri`; pages are chained
/// automatically, with the last page terminal.
#[derive(Clone, Default)]
pub struct PageSpec {
    pub body: serde_json::Value,
    pub headers: Vec<(String, String)>,
    /// How many times this page answers 503 before succeeding.
    pub unavailable_before: usize,
    /// Sleep before answering, to give tests a window for cancellation.
    pub delay: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, matched case-insensitively.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

struct CoordinatorState {
    base: String,
    pages: Vec<PageSpec>,
    remaining_unavailable: Vec<usize>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<CoordinatorState>>;

/// A mock coordinator bound to an ephemeral localhost port. The server is
/// aborted when the value is dropped.
pub struct MockCoordinator {
    addr: SocketAddr,
    state: Shared,
    handle: JoinHandle<()>,
}

impl MockCoordinator {
    pub async fn start(pages: Vec<PageSpec>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let remaining_unavailable = pages.iter().map(|p| p.unavailable_before).collect();
        let state = Arc::new(Mutex::new(CoordinatorState {
            base: format!("http://{}", addr),
            pages,
            remaining_unavailable,
            requests: Vec::new(),
        }));

        let app = Router::new()
            .route("/v1/statement", post(submit))
            .route("/v1/statement/page/:index", get(page))
            .route("/v1/query/:id", delete(cancel))
            .with_state(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockCoordinator {
            addr,
            state,
            handle,
        }
    }

    pub fn dsn(&self) -> String {
        format!("http://tester@{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count(&self, method: &str, path_prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(path_prefix))
            .count()
    }
}

impl Drop for MockCoordinator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn submit(State(state): State<Shared>, headers: HeaderMap, body: String) -> Response {
    respond(&state, 0, "POST", "/v1/statement".to_string(), &headers, body).await
}

async fn page(
    State(state): State<Shared>,
    Path(index): Path<usize>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/v1/statement/page/{}", index);
    respond(&state, index, "GET", path, &headers, String::new()).await
}

async fn cancel(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    record(
        &state,
        "DELETE",
        format!("/v1/query/{}", id),
        &headers,
        String::new(),
    );
    StatusCode::NO_CONTENT.into_response()
}

async fn respond(
    state: &Shared,
    index: usize,
    method: &str,
    path: String,
    headers: &HeaderMap,
    body: String,
) -> Response {
    record(state, method, path, headers, body);

    let (page, next_uri) = {
        let mut guard = state.lock().unwrap();
        if index >= guard.pages.len() {
            return StatusCode::NOT_FOUND.into_response();
        }
        if guard.remaining_unavailable[index] > 0 {
            guard.remaining_unavailable[index] -= 1;
            return (StatusCode::SERVICE_UNAVAILABLE, "try again later").into_response();
        }
        let next_uri = if index + 1 < guard.pages.len() {
            Some(format!("{}/v1/statement/page/{}", guard.base, index + 1))
        } else {
            None
        };
        (guard.pages[index].clone(), next_uri)
    };

    if let Some(delay) = page.delay {
        tokio::time::sleep(delay).await;
    }

    let mut envelope = page.body.clone();
    if let Some(next_uri) = next_uri {
        envelope["nextUri"] = serde_json::Value::String(next_uri);
    }

    let mut response = (StatusCode::OK, envelope.to_string()).into_response();
    for (name, value) in &page.headers {
        response.headers_mut().append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    response
}

fn record(state: &Shared, method: &str, path: String, headers: &HeaderMap, body: String) {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    state.lock().unwrap().requests.push(RecordedRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    });
}
