#![cfg(test)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// How a mock node answers
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Healthy,
    /// Answers 429 once `after` calls were served
    RateLimited { after: usize },
    /// Answers with a JSON-RPC error object once `after` calls were served
    RpcErrorAfter { after: usize },
    /// Healthy, but slow
    Delay(Duration),
    /// 200 with a body that isn't JSON
    Garbage,
}

#[derive(Debug)]
struct NodeState {
    behavior: Behavior,
    calls: AtomicUsize,
}

/// An in-process JSON-RPC node, serving on a random local port
#[derive(Debug)]
pub struct MockNode {
    pub url: String,
    state: Arc<NodeState>,
}

impl MockNode {
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

pub async fn spawn_node(behavior: Behavior) -> MockNode {
    let state = Arc::new(NodeState {
        behavior,
        calls: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/", post(rpc))
        .with_state(state.clone());

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move { axum::serve(listener, app).await });

    MockNode {
        url: format!("http://{}/", addr),
        state,
    }
}

async fn rpc(State(state): State<Arc<NodeState>>, Json(req): Json<Value>) -> Response {
    let served = state.calls.fetch_add(1, Ordering::SeqCst);
    let id = req["id"].clone();

    match state.behavior {
        Behavior::RateLimited { after } if served >= after => {
            return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
        }
        Behavior::RpcErrorAfter { after } if served >= after => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32005, "message": "daily request count exceeded" },
            }))
            .into_response();
        }
        Behavior::Delay(delay) => tokio::time::sleep(delay).await,
        Behavior::Garbage => return "<html>maintenance</html>".into_response(),
        _ => {}
    }

    let result = match (req["method"].as_str(), req["params"][0].as_str()) {
        (Some("eth_blockNumber"), _) => json!("0x64"),
        (Some("eth_getBlockByNumber"), Some("0x64")) => json!({
            "number": "0x64",
            "transactions": [format!("0x{}", "aa".repeat(32))],
        }),
        (Some("eth_getTransactionReceipt"), Some(hash)) if hash.ends_with("aaaa") => json!({
            "contractAddress": format!("0x{}", "11".repeat(20)),
            "to": null,
        }),
        (Some("eth_getCode"), _) => json!("0x6080"),
        (Some("eth_getBalance"), _) => json!("0xde0b6b3a7640000"),
        _ => Value::Null,
    };

    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
}
