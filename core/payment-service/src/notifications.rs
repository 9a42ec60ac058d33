// core/payment-service/src/notifications.rs
// Reading the notification records the settlement engine writes

use actix_web::{web, HttpResponse};
use lendhand_common::{domain::Notification, AuthedUser, ServiceError};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn list_notifications(
    pool: web::Data<PgPool>,
    user: AuthedUser,
) -> Result<HttpResponse, ServiceError> {
    let notifications: Vec<Notification> = sqlx::query_as(
        "SELECT * FROM notifications WHERE user_id = $1 \
         ORDER BY created_at DESC LIMIT 100",
    )
    .bind(user.0)
    .fetch_all(pool.get_ref())
    .await?;

    let unread = notifications.iter().filter(|n| !n.is_read).count();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "notifications": notifications,
        "unreadCount": unread,
    })))
}

pub async fn mark_notification_read(
    pool: web::Data<PgPool>,
    user: AuthedUser,
    notification_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let updated: Option<Notification> = sqlx::query_as(
        "UPDATE notifications SET is_read = TRUE \
         WHERE id = $1 AND user_id = $2 RETURNING *",
    )
    .bind(*notification_id)
    .bind(user.0)
    .fetch_optional(pool.get_ref())
    .await?;

    match updated {
        Some(notification) => {
            Ok(HttpResponse::Ok().json(serde_json::json!({ "notification": notification })))
        }
        None => Err(ServiceError::NotFound("Notification not found".to_string())),
    }
}
