use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use courier_messaging::contacts::ContactOptions;
use courier_messaging::{PageOptions, SendMessage};
use courier_types::api::{
    ApiResponse, Claims, ContactsQuery, ConversationQuery, EditMessageRequest, SendMessageRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;

fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {} id", what)))
}

fn query<T>(q: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    q.map(|Query(inner)| inner)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

fn json<T>(j: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    j.map(|Json(inner)| inner)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    q: Result<Query<ContactsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query(q)?;
    let contacts = state
        .service
        .list_contacts(
            claims.sub,
            &claims.account_type,
            ContactOptions {
                limit: q.limit,
                query: q.query,
            },
        )
        .await?;

    Ok(Json(ApiResponse::ok("Contacts loaded", contacts)))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contact_id): Path<String>,
    q: Result<Query<ConversationQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let contact_id = parse_id(&contact_id, "contact")?;
    let q = query(q)?;

    let messages = state
        .service
        .list_conversation(
            claims.sub,
            contact_id,
            PageOptions {
                limit: q.limit,
                before: q.before,
            },
        )
        .await?;

    Ok(Json(ApiResponse::ok("Conversation loaded", messages)))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contact_id): Path<String>,
    req: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient_id = parse_id(&contact_id, "recipient")?;
    let req = json(req)?;

    let message = state
        .service
        .send(SendMessage {
            sender_id: claims.sub,
            recipient_id,
            body: req.body,
            reply_to_message_id: req.reply_to_message_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Message sent", message))))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((contact_id, message_id)): Path<(String, String)>,
    req: Result<Json<EditMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let contact_id = parse_id(&contact_id, "contact")?;
    let message_id = parse_id(&message_id, "message")?;
    let req = json(req)?;

    let message = state
        .service
        .edit_message(claims.sub, contact_id, message_id, &req.body)
        .await?;

    Ok(Json(ApiResponse::ok("Message updated", message)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((contact_id, message_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let contact_id = parse_id(&contact_id, "contact")?;
    let message_id = parse_id(&message_id, "message")?;

    let message = state
        .service
        .delete_message(claims.sub, contact_id, message_id)
        .await?;

    Ok(Json(ApiResponse::ok("Message deleted", message)))
}
