use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub only_unread: bool,
}

/// Accepts `true`/`false`/`1`/`0`; anything else reads as false.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(matches!(
        raw.as_deref().map(str::trim),
        Some("true") | Some("1") | Some("TRUE") | Some("True")
    ))
}

/// **Endpoint**: `GET /user/{user_id}/notifications?limit&offset&only_unread`
#[get("/notifications")]
pub async fn list_notifications(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    user.ensure_path_user(user_id)?;

    let query = query.into_inner();
    let page = state
        .notifications
        .list_user_notifications(user_id, query.limit, query.offset, query.only_unread)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/notifications/{notification_id}/read")]
pub async fn mark_notification_read(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<(Uuid, i64)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, notification_id) = path.into_inner();
    user.ensure_path_user(user_id)?;

    state
        .notifications
        .mark_notification_as_read(user_id, notification_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Notification marked as read" })))
}

#[post("/notifications/read-all")]
pub async fn mark_all_read(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    user.ensure_path_user(user_id)?;

    state
        .notifications
        .mark_all_notifications_as_read(user_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "All notifications marked as read" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_notifications)
        .service(mark_all_read)
        .service(mark_notification_read);
}
