//! WebSocket 推送通道
//!
//! 连接只用于服务端向客户端单向推送事件，客户端的所有写操作都
//! 走 HTTP 接口。每个连接持有一个有界事件信箱，连接任务负责把
//! 信箱里的事件序列化后写到对端。

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    user_id: Uuid,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();

    let buffer = state.chat_service.policy().event_buffer;
    let (tx, mut rx) = mpsc::channel(buffer);

    let connection_id = match state.chat_service.connect_user(user_id, tx).await {
        Ok(connection_id) => connection_id,
        Err(err) => {
            tracing::warn!(user_id = %user_id, error = %err, "拒绝 WebSocket 连接");
            let _ = sink.send(WsMessage::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(payload) => {
                        if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, kind = event.kind(), "事件序列化失败");
                    }
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(payload))) => {
                        let _ = sink.send(WsMessage::Pong(payload)).await;
                    }
                    // 推送通道上的客户端文本一律忽略
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(user_id = %user_id, error = %err, "连接读取错误");
                        break;
                    }
                }
            }
        }
    }

    if let Err(err) = state
        .chat_service
        .disconnect_user(user_id, connection_id)
        .await
    {
        tracing::warn!(user_id = %user_id, error = %err, "注销连接失败");
    }
}
