use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_messaging::{MessagingError, MessagingService, SendMessage};
use courier_types::auth::verify_token;
use courier_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unauthenticated socket may take to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a WebSocket whose token was already validated at the HTTP upgrade.
pub async fn handle_connection_authenticated(
    socket: WebSocket,
    dispatcher: Dispatcher,
    service: MessagingService,
    user_id: Uuid,
) {
    let (sender, receiver) = socket.split();
    info!("{} connected to gateway (pre-authenticated)", user_id);
    run_connection_loop(sender, receiver, dispatcher, service, user_id).await;
}

/// Handle a WebSocket that must authenticate with an `Identify` command first.
/// Nothing is subscribed until the token checks out.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    service: MessagingService,
    jwt_secret: String,
) {
    let (sender, mut receiver) = socket.split();

    let user_id = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} connected to gateway", user_id);
    run_connection_loop(sender, receiver, dispatcher, service, user_id).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    service: MessagingService,
    user_id: Uuid,
) {
    let subscription = dispatcher.register(user_id).await;
    let conn_id = subscription.conn_id;
    let ack_tx = subscription.tx;
    let mut events_rx = subscription.rx;

    if let Some(ready) = encode(&GatewayEvent::Ready { user_id }) {
        if sender.send(ready).await.is_err() {
            dispatcher.unregister(user_id, conn_id).await;
            return;
        }
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward channel events + acks -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    let Some(frame) = encode(&event) else { continue };
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        if let Some(reply) = handle_command(&service, user_id, cmd).await {
                            if ack_tx.send(reply).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister(user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<Uuid> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return match verify_token(jwt_secret, &token) {
                        Ok(claims) => Some(claims.sub),
                        Err(e) => {
                            debug!("identify rejected: {}", e);
                            None
                        }
                    };
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

/// Execute one client command. Returns the event to send back on this
/// connection, if any.
pub(crate) async fn handle_command(
    service: &MessagingService,
    user_id: Uuid,
    cmd: GatewayCommand,
) -> Option<GatewayEvent> {
    match cmd {
        GatewayCommand::Identify { .. } => None, // Already handled

        GatewayCommand::SendMessage {
            request_id,
            recipient_id,
            body,
            reply_to_message_id,
        } => {
            let result = match parse_send(user_id, &recipient_id, body, reply_to_message_id.as_deref()) {
                Ok(input) => service.send(input).await,
                Err(e) => Err(e),
            };

            Some(match result {
                Ok(message) => GatewayEvent::ack_ok(request_id, message),
                Err(MessagingError::Internal(e)) => {
                    warn!("{} live send failed: {:#}", user_id, e);
                    GatewayEvent::ack_err(request_id, "Unable to send message")
                }
                Err(e) => {
                    debug!("{} live send rejected: {}", user_id, e);
                    GatewayEvent::ack_err(request_id, e.to_string())
                }
            })
        }
    }
}

fn parse_send(
    sender_id: Uuid,
    recipient_id: &str,
    body: String,
    reply_to: Option<&str>,
) -> Result<SendMessage, MessagingError> {
    let recipient_id = recipient_id
        .trim()
        .parse()
        .map_err(|_| MessagingError::bad_request("Invalid recipient id"))?;
    let reply_to_message_id = reply_to
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| MessagingError::bad_request("Invalid reply message id")))
        .transpose()?;

    Ok(SendMessage {
        sender_id,
        recipient_id,
        body,
        reply_to_message_id,
    })
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_db::Database;
    use courier_db::models::UserRow;
    use courier_messaging::{ServiceConfig, SqliteDirectory, SqliteStore};

    use super::*;

    fn fixture() -> (Arc<Database>, MessagingService, Dispatcher) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let service = MessagingService::new(
            Arc::new(SqliteDirectory::new(db.clone())),
            Arc::new(SqliteStore::new(db.clone())),
            Arc::new(dispatcher.clone()),
            ServiceConfig::default(),
        );
        (db, service, dispatcher)
    }

    fn seed(db: &Database, name: &str, account_type: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.upsert_user(&UserRow {
            id: id.to_string(),
            name: name.into(),
            email: String::new(),
            phone: String::new(),
            account_type: account_type.into(),
            is_banned: false,
            avatar_ref: None,
        })
        .unwrap();
        id
    }

    fn send_cmd(recipient_id: String, body: &str) -> GatewayCommand {
        GatewayCommand::SendMessage {
            request_id: Some("req-1".into()),
            recipient_id,
            body: body.into(),
            reply_to_message_id: None,
        }
    }

    #[tokio::test]
    async fn live_send_acks_and_fans_out() {
        let (db, service, dispatcher) = fixture();
        let r = seed(&db, "Rita", "resident");
        let o = seed(&db, "Omar", "operator");
        let mut recipient = dispatcher.register(o).await;

        let ack = handle_command(&service, r, send_cmd(o.to_string(), "hello"))
            .await
            .unwrap();
        match ack {
            GatewayEvent::SendAck {
                request_id,
                success,
                message,
                error,
            } => {
                assert_eq!(request_id.as_deref(), Some("req-1"));
                assert!(success);
                assert!(error.is_none());
                assert_eq!(message.unwrap().body, "hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let pushed = tokio::time::timeout(Duration::from_secs(1), recipient.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(pushed, GatewayEvent::MessageCreate(m) if m.body == "hello"));
    }

    #[tokio::test]
    async fn live_send_reports_validation_errors() {
        let (db, service, _dispatcher) = fixture();
        let r = seed(&db, "Rita", "resident");
        let r2 = seed(&db, "Rosa", "resident");

        let cases = [
            (send_cmd("not-a-uuid".into(), "hi"), "Invalid recipient id"),
            (send_cmd(r2.to_string(), "hi"), "Messaging is only available between residents and operators"),
            (send_cmd(r.to_string(), "hi"), "You cannot message yourself"),
        ];

        for (cmd, expected) in cases {
            match handle_command(&service, r, cmd).await {
                Some(GatewayEvent::SendAck { success, error, .. }) => {
                    assert!(!success);
                    assert_eq!(error.as_deref(), Some(expected));
                }
                other => panic!("unexpected reply: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn identify_outside_handshake_is_ignored() {
        let (_db, service, _dispatcher) = fixture();
        let reply = handle_command(
            &service,
            Uuid::new_v4(),
            GatewayCommand::Identify { token: "x".into() },
        )
        .await;
        assert!(reply.is_none());
    }
}
