pub mod auth;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod middleware;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// Authenticated `/api/v1/messages` routes plus the `/gateway` WebSocket,
/// which authenticates on its own.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/messages/contacts", get(messages::list_contacts))
        .route(
            "/api/v1/messages/{contact_id}",
            get(messages::get_conversation).post(messages::send_message),
        )
        .route(
            "/api/v1/messages/{contact_id}/{message_id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/gateway", get(gateway::ws_upgrade))
        .merge(protected)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use courier_db::Database;
    use courier_db::models::UserRow;
    use courier_gateway::dispatcher::Dispatcher;
    use courier_messaging::{MessagingService, NullSink, ServiceConfig, SqliteDirectory, SqliteStore};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::{AppStateInner, create_token};

    const SECRET: &str = "test-secret";

    struct Harness {
        db: Arc<Database>,
        app: Router,
    }

    impl Harness {
        fn new() -> Self {
            let db = Arc::new(Database::open_in_memory().unwrap());
            let service = MessagingService::new(
                Arc::new(SqliteDirectory::new(db.clone())),
                Arc::new(SqliteStore::new(db.clone())),
                Arc::new(NullSink),
                ServiceConfig {
                    public_url: "https://courier.test".into(),
                    ..ServiceConfig::default()
                },
            );
            let state = Arc::new(AppStateInner {
                service,
                dispatcher: Dispatcher::new(),
                jwt_secret: SECRET.into(),
            });
            Self {
                db,
                app: router(state),
            }
        }

        fn user(&self, name: &str, account_type: &str, banned: bool) -> (Uuid, String) {
            let id = Uuid::new_v4();
            self.db
                .upsert_user(&UserRow {
                    id: id.to_string(),
                    name: name.into(),
                    email: format!("{}@example.com", name.to_lowercase()),
                    phone: String::new(),
                    account_type: account_type.into(),
                    is_banned: banned,
                    avatar_ref: Some("avatars/1.png".into()),
                })
                .unwrap();
            (id, token_for(id, account_type))
        }

        async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let body = match body {
                Some(v) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(v.to_string())
                }
                None => Body::empty(),
            };

            let resp = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
            let status = resp.status();
            let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }
    }

    fn token_for(id: Uuid, account_type: &str) -> String {
        create_token(SECRET, id, "", account_type, chrono::Duration::hours(1)).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_unknown_and_banned_callers() {
        let h = Harness::new();

        let (status, _) = h.call("GET", "/api/v1/messages/contacts", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = h.call("GET", "/api/v1/messages/contacts", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let ghost = token_for(Uuid::new_v4(), "resident");
        let (status, body) = h.call("GET", "/api/v1/messages/contacts", Some(&ghost), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "USER_NOT_FOUND");

        let (_, banned) = h.user("Bad", "resident", true);
        let (status, body) = h.call("GET", "/api/v1/messages/contacts", Some(&banned), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "ACCOUNT_BANNED");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn resident_and_operator_exchange_messages() {
        let h = Harness::new();
        let (rita, rita_token) = h.user("Rita", "resident", false);
        let (omar, omar_token) = h.user("Omar", "admin_driver", false);

        let (status, body) = h.call("GET", "/api/v1/messages/contacts", Some(&rita_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Contacts loaded");
        assert_eq!(body["data"][0]["id"], omar.to_string());
        assert_eq!(body["data"][0]["role"], "operator");
        assert_eq!(
            body["data"][0]["avatarUrl"],
            format!("https://courier.test/api/v1/users/{}/profile-image", omar)
        );

        let uri = format!("/api/v1/messages/{}", omar);
        let (status, body) = h
            .call("POST", &uri, Some(&rita_token), Some(json!({ "body": "  Hello  " })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["body"], "Hello");
        assert_eq!(body["data"]["senderId"], rita.to_string());
        let first_id = body["data"]["id"].as_str().unwrap().to_string();

        let (_, body) = h.call("GET", "/api/v1/messages/contacts", Some(&omar_token), None).await;
        assert_eq!(body["data"][0]["unreadCount"], 1);

        let uri = format!("/api/v1/messages/{}", rita);
        let (status, body) = h
            .call(
                "POST",
                &uri,
                Some(&omar_token),
                Some(json!({ "body": "Hi", "replyToMessageId": first_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["replyTo"]["body"], "Hello");

        let (status, body) = h.call("GET", &uri, Some(&omar_token), None).await;
        assert_eq!(status, StatusCode::OK);
        let bodies: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["body"].as_str().unwrap())
            .collect();
        assert_eq!(bodies, ["Hello", "Hi"]);
        assert!(body["data"][0]["readAt"].is_string());

        let (_, body) = h.call("GET", "/api/v1/messages/contacts", Some(&omar_token), None).await;
        assert_eq!(body["data"][0]["unreadCount"], 0);
    }

    #[tokio::test]
    async fn edit_and_delete_are_owner_only() {
        let h = Harness::new();
        let (rita, rita_token) = h.user("Rita", "resident", false);
        let (omar, omar_token) = h.user("Omar", "operator", false);

        let (_, body) = h
            .call("POST", &format!("/api/v1/messages/{}", omar), Some(&rita_token), Some(json!({ "body": "v1" })))
            .await;
        let msg = body["data"]["id"].as_str().unwrap().to_string();

        let as_omar = format!("/api/v1/messages/{}/{}", rita, msg);
        let (status, body) = h.call("PATCH", &as_omar, Some(&omar_token), Some(json!({ "body": "hijack" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");

        let as_rita = format!("/api/v1/messages/{}/{}", omar, msg);
        let (status, body) = h.call("PATCH", &as_rita, Some(&rita_token), Some(json!({ "body": "v2" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isEdited"], true);
        assert_eq!(body["data"]["body"], "v2");

        let (status, body) = h.call("DELETE", &as_rita, Some(&rita_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Message deleted");
        assert_eq!(body["data"]["isDeleted"], true);
        assert_eq!(body["data"]["body"], "");

        let (status, _) = h.call("DELETE", &as_rita, Some(&rita_token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = h.call("PATCH", &as_rita, Some(&rita_token), Some(json!({ "body": "v3" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_input_maps_to_400_and_policy_to_403() {
        let h = Harness::new();
        let (_, rita_token) = h.user("Rita", "resident", false);
        let (rosa, _) = h.user("Rosa", "resident", false);

        let (status, body) = h
            .call("POST", "/api/v1/messages/not-a-uuid", Some(&rita_token), Some(json!({ "body": "x" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid recipient id");

        let uri = format!("/api/v1/messages/{}", rosa);
        let (status, body) = h.call("POST", &uri, Some(&rita_token), Some(json!({ "body": "x" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Messaging is only available between residents and operators");

        let (status, _) = h.call("GET", &format!("{}?before=yesterday", uri), Some(&rita_token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = h.call("POST", &uri, Some(&rita_token), Some(json!({ "text": "x" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn extra_body_fields_are_ignored() {
        let h = Harness::new();
        let (_, rita_token) = h.user("Rita", "resident", false);
        let (omar, _) = h.user("Omar", "operator", false);

        let uri = format!("/api/v1/messages/{}", omar);
        let (status, body) = h
            .call("POST", &uri, Some(&rita_token), Some(json!({ "body": "hi", "clientTag": "x1" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let msg = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = h
            .call(
                "PATCH",
                &format!("{}/{}", uri, msg),
                Some(&rita_token),
                Some(json!({ "body": "hey", "senderId": Uuid::new_v4() })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["body"], "hey");
    }
}
