//! WebSocket endpoint for quick analysis.
//!
//! Each text message is an analysis request; each gets exactly one JSON reply.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tracing::{debug, info, warn};

use chess_eval_core::Analyzer;

use super::AnalyzeRequest;
use crate::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(analyzer): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, analyzer))
}

async fn handle_socket(mut socket: WebSocket, analyzer: AppState) {
    info!("websocket client connected");

    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(%err, "websocket receive failed");
                break;
            }
        };

        let reply = answer(&analyzer, &text).await;
        if socket.send(Message::Text(reply)).await.is_err() {
            break;
        }
    }

    info!("websocket client disconnected");
}

/// Runs one quick analysis for a JSON request and renders the JSON reply.
async fn answer(analyzer: &Analyzer, text: &str) -> String {
    let request: AnalyzeRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => return serde_json::json!({ "detail": format!("Invalid request: {}", err) }).to_string(),
    };
    debug!(fen = %request.fen, "websocket analysis request");

    let depth = request.depth.unwrap_or(analyzer.default_depth());
    match analyzer.analyze(&request.fen, depth).await {
        Ok(result) => serde_json::to_string(&result)
            .unwrap_or_else(|err| serde_json::json!({ "detail": err.to_string() }).to_string()),
        Err(err) => {
            warn!(%err, "websocket analysis failed");
            serde_json::json!({ "detail": err.to_string() }).to_string()
        }
    }
}
