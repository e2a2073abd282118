//! # HTTP / WebSocket gateway
//!
//! One axum server per node:
//!
//! - `GET /blocks` — the full serialized chain
//! - `GET /balance/:account` — current balance, zero for unknown accounts
//! - `POST /tx` — submit a signed transaction (fire-and-forget; the signed
//!   receipt goes out over the client's WebSocket)
//! - `GET /ws` — the peer/client wire: newline-free JSON [`PeerMessage`]
//!   text frames, both directions
//!
//! Handlers never touch the engine: reads come from the runner's published
//! snapshot, writes go through its inbox.

use crate::runner::RunnerHandle;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_with::{serde_as, Bytes};
use shared_crypto::Signature;
use shared_types::{Block, ClientRequest, PeerMessage};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::debug;

#[derive(Clone)]
struct AppState {
    handle: RunnerHandle,
}

pub fn router(handle: RunnerHandle) -> Router {
    Router::new()
        .route("/blocks", get(blocks))
        .route("/balance/:account", get(balance))
        .route("/tx", post(submit_tx))
        .route("/ws", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { handle })
}

async fn blocks(State(state): State<AppState>) -> Json<Vec<Block>> {
    Json(state.handle.blocks())
}

async fn balance(
    State(state): State<AppState>,
    Path(account): Path<String>,
) -> Json<serde_json::Value> {
    let balance = state.handle.balance(&account);
    Json(serde_json::json!({ "account": account, "balance": balance }))
}

/// A signed transaction submission.
#[serde_as]
#[derive(Debug, Deserialize)]
pub struct TxSubmission {
    pub msg: ClientRequest,
    #[serde_as(as = "Bytes")]
    pub sig: Signature,
}

async fn submit_tx(
    State(state): State<AppState>,
    Json(submission): Json<TxSubmission>,
) -> impl IntoResponse {
    state.handle.submit(submission.msg, submission.sig);
    StatusCode::ACCEPTED
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(state.handle, socket))
}

/// Bridge one accepted WebSocket to the runner: a writer task drains the
/// connection's outbound queue, the read loop feeds decoded frames into the
/// inbox. Either side closing tears the bridge down and reports the
/// disconnect.
async fn serve_socket(handle: RunnerHandle, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<PeerMessage>();
    let conn = handle.register(tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => match serde_json::from_str::<PeerMessage>(&text) {
                Ok(msg) => handle.frame(conn, msg),
                Err(err) => debug!(conn, %err, "undecodable frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle.disconnect(conn);
    writer.abort();
}
