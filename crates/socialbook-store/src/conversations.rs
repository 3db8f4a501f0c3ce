//! Inbox view derived from the flat direct-message log.
//!
//! There is no persisted conversation table: each read groups the viewer's
//! unexpired messages by counterpart and keeps the newest one per thread.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use socialbook_shared::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Conversation, Message};

/// Group `messages` (any order) into one [`Conversation`] per counterpart of
/// `me`, sorted newest-first by last message time.
///
/// Counterparts are numbered in first-seen order and the final sort is
/// stable, so threads whose last messages share a timestamp keep the
/// relative order in which they first appeared in `messages`. Within one
/// thread a later message only replaces the current one when it is strictly
/// newer.
pub fn materialize_conversations(me: UserId, messages: &[Message]) -> Vec<Conversation> {
    let mut index: HashMap<UserId, usize> = HashMap::new();
    let mut conversations: Vec<Conversation> = Vec::new();

    for message in messages {
        let counterpart = message.counterpart(&me);
        let unread = u32::from(message.to == me && !message.read);

        match index.get(&counterpart) {
            Some(&i) => {
                let conversation = &mut conversations[i];
                if message.created_at > conversation.last_message.created_at {
                    conversation.last_message = message.clone();
                }
                conversation.unread += unread;
            }
            None => {
                index.insert(counterpart, conversations.len());
                conversations.push(Conversation {
                    counterpart,
                    user: None,
                    last_message: message.clone(),
                    unread,
                });
            }
        }
    }

    conversations.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
    conversations
}

impl Database {
    /// The inbox of `user` at `now`, with counterpart summaries attached.
    /// Reads only the durable log, so it reflects every stored message
    /// whether or not a realtime event reached the viewer.
    pub fn list_conversations(&self, user: UserId, now: DateTime<Utc>) -> Result<Vec<Conversation>> {
        let messages = self.messages_involving(user, now)?;
        let mut conversations = materialize_conversations(user, &messages);
        for conversation in &mut conversations {
            conversation.user = self.user_summary(conversation.counterpart)?;
        }
        Ok(conversations)
    }
}
