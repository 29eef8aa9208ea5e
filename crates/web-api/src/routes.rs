//! HTTP 路由与处理函数。

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::{
    ConversationSummary, CreateConversationRequest, PresenceInfo, SendMessageRequest,
};
use domain::{Conversation, Message};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::ws::ws_handler;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route("/api/v1/conversations/{id}", delete(delete_conversation))
        .route(
            "/api/v1/conversations/{id}/messages",
            post(send_message).get(list_messages),
        )
        .route("/api/v1/messages/{id}/read", post(mark_as_read))
        .route("/api/v1/messages/{id}/recall", post(recall_message))
        .route("/api/v1/presence/{user_id}", get(presence))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct CreateConversationBody {
    initiator_id: Uuid,
    peer_id: Uuid,
    listing_id: Option<Uuid>,
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversationBody>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .chat_service
        .create_conversation(CreateConversationRequest {
            initiator_id: body.initiator_id,
            peer_id: body.peer_id,
            listing_id: body.listing_id,
        })
        .await?;
    Ok(Json(conversation))
}

#[derive(Deserialize)]
struct ListConversationsQuery {
    user_id: Uuid,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let summaries = state
        .chat_service
        .list_conversations(query.user_id, query.limit, query.offset)
        .await?;
    Ok(Json(summaries))
}

#[derive(Deserialize)]
struct ActorQuery {
    user_id: Uuid,
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> ApiResult<StatusCode> {
    state
        .chat_service
        .delete_conversation(id, query.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SendMessageBody {
    sender_id: Uuid,
    content: String,
    #[serde(default)]
    images: Vec<String>,
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageBody>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let message = state
        .chat_service
        .send_message(SendMessageRequest {
            conversation_id: id,
            sender_id: body.sender_id,
            content: body.content,
            images: body.images,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Deserialize)]
struct ListMessagesQuery {
    user_id: Uuid,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state
        .chat_service
        .list_messages(id, query.user_id, query.limit, query.offset)
        .await?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
struct ActorBody {
    user_id: Uuid,
}

async fn mark_as_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<Message>> {
    let message = state.chat_service.mark_as_read(id, body.user_id).await?;
    Ok(Json(message))
}

async fn recall_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<Message>> {
    let message = state.chat_service.recall_message(id, body.user_id).await?;
    Ok(Json(message))
}

async fn presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Json<PresenceInfo> {
    Json(state.chat_service.presence_of(user_id).await)
}
