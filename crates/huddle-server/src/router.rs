//! Message routing between live sessions.
//!
//! Personal messages go to one contact, group messages to every other live
//! roster member, chat text to everyone. All delivery is a push onto the
//! recipient's outbox; the router never blocks on a socket.

use std::sync::Arc;

use huddle_proto::reply;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{directory::GroupDirectory, registry::ConnectionRegistry, store::RecordStore};

/// Why a message was not routed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The recipient is not in the sender's contact list
    #[error("{0} is not a contact")]
    NotInContacts(String),

    /// The recipient has no live session
    #[error("{0} is offline")]
    Offline(String),

    /// No such group
    #[error("group {0} not found")]
    GroupNotFound(String),

    /// The sender is not on the group's roster
    #[error("not a member of {0}")]
    NotAMember(String),

    /// The recipient's session refused the message
    #[error("delivery to {0} failed")]
    DeliveryFailed(String),
}

/// Routes messages through the registry and the group directory.
pub struct Router<S: RecordStore> {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<GroupDirectory<S>>,
}

impl<S: RecordStore> Clone for Router<S> {
    fn clone(&self) -> Self {
        Self { registry: Arc::clone(&self.registry), directory: Arc::clone(&self.directory) }
    }
}

impl<S: RecordStore> Router<S> {
    /// Create a router over shared state.
    pub fn new(registry: Arc<ConnectionRegistry>, directory: Arc<GroupDirectory<S>>) -> Self {
        Self { registry, directory }
    }

    /// Deliver `[PM]<sender>: <message>` to `contact`.
    ///
    /// `contacts` is the sender's own contact list; the recipient must be in
    /// it whether or not the recipient is online.
    ///
    /// # Errors
    ///
    /// - `NotInContacts` if `contact` is not in `contacts`
    /// - `Offline` if no live session is logged in as `contact`
    /// - `DeliveryFailed` if the recipient's queue refused the message
    pub fn send_personal(
        &self,
        sender: &str,
        contacts: &[String],
        contact: &str,
        message: &str,
    ) -> Result<(), RouteError> {
        if !contacts.iter().any(|c| c == contact) {
            return Err(RouteError::NotInContacts(contact.to_string()));
        }

        let recipient = self
            .registry
            .find_by_name(contact)
            .ok_or_else(|| RouteError::Offline(contact.to_string()))?;

        recipient.deliver(&reply::personal_message(sender, message)).map_err(|e| {
            warn!(from = sender, to = contact, "personal message dropped: {e}");
            RouteError::DeliveryFailed(contact.to_string())
        })?;

        debug!(from = sender, to = contact, "personal message delivered");
        Ok(())
    }

    /// Deliver `[<group>]<sender>: <message>` to every other roster member.
    ///
    /// Works on a snapshot of the roster taken under the directory lock; the
    /// fan-out itself runs outside it. Best effort: a recipient whose queue
    /// refuses the message is logged and skipped. Returns the number of
    /// members the message was queued for.
    ///
    /// # Errors
    ///
    /// - `GroupNotFound` if there is no such group
    /// - `NotAMember` if `sender` is not on the roster
    pub fn send_group(
        &self,
        sender_uid: u64,
        sender: &str,
        group: &str,
        message: &str,
    ) -> Result<usize, RouteError> {
        let roster =
            self.directory.roster(group).ok_or_else(|| RouteError::GroupNotFound(group.to_string()))?;

        if !roster.iter().any(|m| m.uid == sender_uid) {
            return Err(RouteError::NotAMember(group.to_string()));
        }

        let text = reply::group_message(group, sender, message);
        let mut delivered = 0;
        for member in roster.iter().filter(|m| m.uid != sender_uid) {
            match member.deliver(&text) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(group, to = %member.name, "group message dropped: {e}"),
            }
        }

        debug!(group, from = sender, delivered, "group message routed");
        Ok(delivered)
    }

    /// Queue `text` for every live session except `exclude_uid`.
    pub fn broadcast(&self, exclude_uid: u64, text: &str) -> usize {
        self.registry.broadcast(exclude_uid, text)
    }
}
