//! Conversation and message endpoints, all under `/user/{user_id}`.

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::SendMessageRequest;
use crate::state::AppState;
use actix_web::{delete, get, post, web, HttpResponse};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

/// **Endpoint**: `GET /user/{user_id}/reports/{report_id}/conversations/exists`
#[get("/reports/{report_id}/conversations/exists")]
pub async fn conversation_exists(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<(Uuid, i64)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, report_id) = path.into_inner();
    user.ensure_path_user(user_id)?;

    let exists = state
        .conversations
        .conversation_exists(report_id, user_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "exists": exists })))
}

/// Create the conversation for this report, or return the existing one.
///
/// **Endpoint**: `POST /user/{user_id}/reports/{report_id}/conversations`
#[post("/reports/{report_id}/conversations")]
pub async fn create_or_get_conversation(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<(Uuid, i64)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, report_id) = path.into_inner();
    user.ensure_path_user(user_id)?;

    let conversation = state
        .conversations
        .create_or_get_conversation(report_id, user_id)
        .await?;
    Ok(HttpResponse::Created().json(conversation))
}

#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    user.ensure_path_user(user_id)?;

    let conversations = state.conversations.get_user_conversations(user_id).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

#[get("/conversations/{conversation_id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<(Uuid, i64)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, conversation_id) = path.into_inner();
    user.ensure_path_user(user_id)?;

    let messages = state
        .conversations
        .get_conversation_messages(conversation_id, user_id)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// Send a message. The service relays it to live sessions; the response
/// carries the stored message.
///
/// **Endpoint**: `POST /user/{user_id}/conversations/{conversation_id}/messages`
#[post("/conversations/{conversation_id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<(Uuid, i64)>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let (user_id, conversation_id) = path.into_inner();
    user.ensure_path_user(user_id)?;
    body.validate()?;

    let result = state
        .conversations
        .send_message(conversation_id, user_id, &body.message_text)
        .await?;
    Ok(HttpResponse::Created().json(result.message))
}

#[post("/conversations/{conversation_id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<(Uuid, i64)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, conversation_id) = path.into_inner();
    user.ensure_path_user(user_id)?;

    state
        .conversations
        .mark_conversation_as_read(conversation_id, user_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Conversation marked as read" })))
}

#[delete("/conversations/{conversation_id}")]
pub async fn delete_conversation(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<(Uuid, i64)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, conversation_id) = path.into_inner();
    user.ensure_path_user(user_id)?;

    state
        .conversations
        .delete_conversation(conversation_id, user_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Conversation deleted" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(conversation_exists)
        .service(create_or_get_conversation)
        .service(list_conversations)
        .service(get_messages)
        .service(send_message)
        .service(mark_read)
        .service(delete_conversation);
}
