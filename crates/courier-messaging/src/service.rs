use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use courier_types::events::GatewayEvent;
use courier_types::models::{ChatMessage, Contact, DELETED_MESSAGE_PLACEHOLDER, ReplyPreview};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::contacts::{self, ContactOptions};
use crate::delivery::DeliverySink;
use crate::directory::{Directory, DirectoryUser};
use crate::error::{MessagingError, Result};
use crate::policy;
use crate::store::{ConversationStore, NewMessage, PageOptions, PairKey, StoredMessage};

/// Longest accepted message body, in characters, after trimming.
pub const MAX_BODY_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Upper bound on every directory and store call.
    pub io_timeout: Duration,
    /// Prefix for avatar URLs; empty yields root-relative paths.
    pub public_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(5),
            public_url: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendMessage {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    pub reply_to_message_id: Option<Uuid>,
}

/// Orchestrates policy, directory and store for every messaging operation,
/// then hands the resulting message to the delivery sink for both participants.
#[derive(Clone)]
pub struct MessagingService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    directory: Arc<dyn Directory>,
    store: Arc<dyn ConversationStore>,
    outbox: mpsc::UnboundedSender<Outbound>,
    config: ServiceConfig,
}

/// A message event waiting for live delivery to both participants.
struct Outbound {
    event: GatewayEvent,
    targets: [Uuid; 2],
    message_id: Uuid,
}

impl MessagingService {
    /// Spawns the delivery worker, so this must run inside a Tokio runtime.
    pub fn new(
        directory: Arc<dyn Directory>,
        store: Arc<dyn ConversationStore>,
        sink: Arc<dyn DeliverySink>,
        config: ServiceConfig,
    ) -> Self {
        let (outbox, queue) = mpsc::unbounded_channel();
        tokio::spawn(run_delivery(sink, queue, config.io_timeout));

        Self {
            inner: Arc::new(ServiceInner {
                directory,
                store,
                outbox,
                config,
            }),
        }
    }

    /// Resolve an authenticated caller and refuse unknown or suspended accounts.
    pub async fn authenticate_caller(&self, user_id: Uuid) -> Result<DirectoryUser> {
        let user = self.lookup(user_id, "User").await?;
        if user.banned {
            return Err(MessagingError::banned("Account is suspended"));
        }
        Ok(user)
    }

    pub async fn list_contacts(
        &self,
        caller_id: Uuid,
        caller_account_type: &str,
        options: ContactOptions,
    ) -> Result<Vec<Contact>> {
        let role = policy::actor_role(caller_account_type)?;

        let users = self
            .bounded(
                "list contacts",
                contacts::resolve(self.inner.directory.as_ref(), caller_id, role, &options),
            )
            .await?;

        let unread = match self
            .bounded("unread counts", self.inner.store.unread_counts(caller_id))
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                warn!(caller = %caller_id, "unread counts unavailable: {}", e);
                Default::default()
            }
        };

        Ok(users
            .into_iter()
            .map(|user| Contact {
                unread_count: unread.get(&user.id).copied().unwrap_or(0),
                role: policy::listed_role(&user),
                avatar_url: self.avatar_url(&user),
                name: user.display_name,
                id: user.id,
            })
            .collect())
    }

    /// One page of the conversation in ascending order. Marks the contact's
    /// messages to the requester as read first.
    pub async fn list_conversation(
        &self,
        requester_id: Uuid,
        contact_id: Uuid,
        page: PageOptions,
    ) -> Result<Vec<ChatMessage>> {
        let (requester, contact) = self.resolve_pair(requester_id, contact_id, "User", "Contact").await?;
        let pair = PairKey::new(requester.id, contact.id);

        if let Err(e) = self
            .bounded("mark read", self.inner.store.mark_read(pair, requester.id))
            .await
        {
            warn!(reader = %requester.id, "read-receipt sweep failed: {}", e);
        }

        let mut rows = self
            .bounded(
                "load conversation",
                self.inner
                    .store
                    .find_for_pagination(pair, page.before, page.clamped_limit()),
            )
            .await?;
        rows.reverse();

        Ok(rows
            .into_iter()
            .map(|row| self.hydrate(row, &requester, &contact))
            .collect())
    }

    pub async fn send(&self, input: SendMessage) -> Result<ChatMessage> {
        let (sender, recipient) = self
            .resolve_pair(input.sender_id, input.recipient_id, "Sender", "Recipient")
            .await?;
        let body = validate_body(&input.body)?;
        let pair = PairKey::new(sender.id, recipient.id);

        let reply_to = match input.reply_to_message_id {
            Some(target_id) => {
                let target = self
                    .bounded("find reply target", self.inner.store.find_mutable(pair, target_id))
                    .await?
                    .ok_or_else(|| MessagingError::not_found("Reply target not found"))?;
                Some(snapshot(&target, &sender, &recipient))
            }
            None => None,
        };

        let stored = self
            .bounded(
                "append message",
                self.inner.store.append(NewMessage {
                    id: Uuid::now_v7(),
                    sender_id: sender.id,
                    recipient_id: recipient.id,
                    body,
                    reply_to,
                }),
            )
            .await?;

        let message = self.hydrate(stored, &sender, &recipient);
        debug!(message = %message.id, from = %sender.id, to = %recipient.id, "message sent");
        self.publish(GatewayEvent::MessageCreate(message.clone()), &message);
        Ok(message)
    }

    pub async fn edit_message(
        &self,
        requester_id: Uuid,
        contact_id: Uuid,
        message_id: Uuid,
        body: &str,
    ) -> Result<ChatMessage> {
        let (requester, contact) = self.resolve_pair(requester_id, contact_id, "User", "Contact").await?;
        let pair = PairKey::new(requester.id, contact.id);

        let existing = self.owned_message(pair, message_id, &requester, "edit").await?;
        if existing.is_deleted() {
            return Err(MessagingError::bad_request("Deleted messages cannot be edited"));
        }
        let body = validate_body(body)?;

        // The update re-checks deletion atomically; losing a race to a delete lands here.
        let updated = self
            .bounded("edit message", self.inner.store.update_body(pair, message_id, body))
            .await?
            .ok_or_else(|| MessagingError::bad_request("Deleted messages cannot be edited"))?;

        let message = self.hydrate(updated, &requester, &contact);
        debug!(message = %message.id, "message edited");
        self.publish(GatewayEvent::MessageUpdate(message.clone()), &message);
        Ok(message)
    }

    /// Soft-delete a message. Deleting twice succeeds and keeps the first `deletedAt`.
    pub async fn delete_message(
        &self,
        requester_id: Uuid,
        contact_id: Uuid,
        message_id: Uuid,
    ) -> Result<ChatMessage> {
        let (requester, contact) = self.resolve_pair(requester_id, contact_id, "User", "Contact").await?;
        let pair = PairKey::new(requester.id, contact.id);

        self.owned_message(pair, message_id, &requester, "delete").await?;

        let deleted = self
            .bounded("delete message", self.inner.store.soft_delete(pair, message_id))
            .await?
            .ok_or_else(|| MessagingError::not_found("Message not found"))?;

        let message = self.hydrate(deleted, &requester, &contact);
        debug!(message = %message.id, "message deleted");
        self.publish(GatewayEvent::MessageUpdate(message.clone()), &message);
        Ok(message)
    }

    async fn lookup(&self, id: Uuid, label: &str) -> Result<DirectoryUser> {
        self.bounded("directory lookup", self.inner.directory.get_user(id))
            .await?
            .ok_or_else(|| MessagingError::not_found(format!("{} not found", label)))
    }

    async fn resolve_pair(
        &self,
        actor_id: Uuid,
        other_id: Uuid,
        actor_label: &str,
        other_label: &str,
    ) -> Result<(DirectoryUser, DirectoryUser)> {
        let actor = self.lookup(actor_id, actor_label).await?;
        let other = self.lookup(other_id, other_label).await?;

        if let Err(denial) = policy::can_message(&actor, &other) {
            warn!(
                event = "messaging.authz",
                actor = %actor.id,
                target = %other.id,
                reason = %denial,
                "messaging denied"
            );
            return Err(denial.into());
        }

        Ok((actor, other))
    }

    async fn owned_message(
        &self,
        pair: PairKey,
        message_id: Uuid,
        requester: &DirectoryUser,
        action: &str,
    ) -> Result<StoredMessage> {
        let message = self
            .bounded("find message", self.inner.store.find_mutable(pair, message_id))
            .await?
            .ok_or_else(|| MessagingError::not_found("Message not found"))?;

        if message.sender_id != requester.id {
            warn!(
                event = "messaging.authz",
                actor = %requester.id,
                message = %message_id,
                reason = "not the sender",
                "{} denied",
                action
            );
            return Err(MessagingError::forbidden(format!(
                "You can only {} your own messages",
                action
            )));
        }

        Ok(message)
    }

    /// Await a collaborator call under the configured timeout.
    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let limit = self.inner.config.io_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(|e| MessagingError::Internal(e.context(format!("{} failed", what)))),
            Err(_) => Err(MessagingError::Internal(anyhow!("{} timed out after {:?}", what, limit))),
        }
    }

    /// Queue `event` for both participants without waiting on delivery.
    fn publish(&self, event: GatewayEvent, message: &ChatMessage) {
        let outbound = Outbound {
            event,
            targets: [message.sender_id, message.recipient_id],
            message_id: message.id,
        };
        if self.inner.outbox.send(outbound).is_err() {
            warn!(message = %message.id, "delivery worker stopped, live event dropped");
        }
    }

    fn hydrate(&self, row: StoredMessage, a: &DirectoryUser, b: &DirectoryUser) -> ChatMessage {
        let (sender, recipient) = if row.sender_id == a.id { (a, b) } else { (b, a) };
        let is_deleted = row.is_deleted();

        ChatMessage {
            id: row.id,
            sender_id: row.sender_id,
            sender_name: sender.display_name.clone(),
            sender_avatar_url: self.avatar_url(sender),
            recipient_id: row.recipient_id,
            recipient_name: recipient.display_name.clone(),
            recipient_avatar_url: self.avatar_url(recipient),
            body: if is_deleted { String::new() } else { row.body },
            created_at: row.created_at,
            read_at: row.read_at,
            is_edited: row.edited_at.is_some(),
            edited_at: row.edited_at,
            deleted_at: row.deleted_at,
            is_deleted,
            reply_to: row.reply_to,
        }
    }

    fn avatar_url(&self, user: &DirectoryUser) -> Option<String> {
        user.avatar_ref.as_ref().map(|_| {
            format!(
                "{}/api/v1/users/{}/profile-image",
                self.inner.config.public_url.trim_end_matches('/'),
                user.id
            )
        })
    }
}

/// Delivers queued events one at a time, so live events reach each user in
/// the same order the log recorded them. Failures are logged and skipped.
async fn run_delivery(
    sink: Arc<dyn DeliverySink>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    limit: Duration,
) {
    while let Some(out) = queue.recv().await {
        for user_id in out.targets {
            match tokio::time::timeout(limit, sink.deliver(user_id, out.event.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(user = %user_id, message = %out.message_id, "live delivery dropped: {}", e);
                }
                Err(_) => {
                    debug!(user = %user_id, message = %out.message_id, "live delivery timed out");
                }
            }
        }
    }
}

/// Trim and bound a message body.
pub fn validate_body(raw: &str) -> Result<String> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(MessagingError::bad_request("Message body is required"));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(MessagingError::bad_request("Message is too long"));
    }
    Ok(body.to_string())
}

fn snapshot(target: &StoredMessage, a: &DirectoryUser, b: &DirectoryUser) -> ReplyPreview {
    let author = if target.sender_id == a.id { a } else { b };
    ReplyPreview {
        message_id: target.id,
        sender_id: target.sender_id,
        sender_name: author.display_name.clone(),
        body: if target.is_deleted() {
            DELETED_MESSAGE_PLACEHOLDER.to_string()
        } else {
            target.body.clone()
        },
    }
}
