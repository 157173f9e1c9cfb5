//! Conversation store: the transcript plus change notifications.
//!
//! Every mutation bumps a revision counter and broadcasts a full snapshot, so
//! a renderer can simply redraw from the latest one it received.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::debug;

use aula_core::Message;

use crate::error::ChatError;

/// Snapshots buffered per subscriber before it starts lagging.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 256;

/// The transcript as of one revision.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSnapshot {
    pub revision: u64,
    pub messages: Vec<Message>,
}

struct StoreState {
    revision: u64,
    messages: Vec<Message>,
}

/// Ordered, in-process message list with broadcast snapshots.
pub struct ConversationStore {
    state: Mutex<StoreState>,
    updates: broadcast::Sender<ConversationSnapshot>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(StoreState {
                revision: 0,
                messages: Vec::new(),
            }),
            updates,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, ChatError> {
        self.state
            .lock()
            .map_err(|e| ChatError::Storage(format!("conversation lock poisoned: {}", e)))
    }

    /// Apply `mutate` under the lock; publish a snapshot if it reports a change.
    fn mutate<T>(
        &self,
        mutate: impl FnOnce(&mut Vec<Message>) -> (T, bool),
    ) -> Result<T, ChatError> {
        let (result, snapshot) = {
            let mut state = self.lock()?;
            let (result, changed) = mutate(&mut state.messages);
            if !changed {
                return Ok(result);
            }
            state.revision += 1;
            let snapshot = ConversationSnapshot {
                revision: state.revision,
                messages: state.messages.clone(),
            };
            (result, snapshot)
        };
        // No subscribers is fine.
        let _ = self.updates.send(snapshot);
        Ok(result)
    }

    /// Current transcript.
    pub fn snapshot(&self) -> Result<ConversationSnapshot, ChatError> {
        let state = self.lock()?;
        Ok(ConversationSnapshot {
            revision: state.revision,
            messages: state.messages.clone(),
        })
    }

    pub fn messages(&self) -> Result<Vec<Message>, ChatError> {
        Ok(self.lock()?.messages.clone())
    }

    pub fn len(&self) -> Result<usize, ChatError> {
        Ok(self.lock()?.messages.len())
    }

    pub fn is_empty(&self) -> Result<bool, ChatError> {
        Ok(self.len()? == 0)
    }

    /// Receive a snapshot after every subsequent mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationSnapshot> {
        self.updates.subscribe()
    }

    pub fn append(&self, message: Message) -> Result<(), ChatError> {
        self.mutate(|messages| {
            messages.push(message);
            ((), true)
        })
    }

    /// Modify the message with `id` in place. Returns false if it is gone.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut Message)) -> Result<bool, ChatError> {
        self.mutate(|messages| match messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                f(message);
                (true, true)
            }
            None => (false, false),
        })
    }

    pub fn replace_all(&self, new_messages: Vec<Message>) -> Result<(), ChatError> {
        self.mutate(|messages| {
            *messages = new_messages;
            ((), true)
        })
    }

    /// Replace the transcript with a single bot greeting under a fresh id.
    pub fn clear(&self, greeting: &str) -> Result<String, ChatError> {
        let message = Message::bot(greeting);
        let id = message.id.clone();
        self.replace_all(vec![message])?;
        debug!(greeting_id = %id, "Conversation cleared");
        Ok(id)
    }

    /// Empty the transcript.
    pub fn reset(&self) -> Result<(), ChatError> {
        self.replace_all(Vec::new())
    }
}
