//! UI-agnostic conversation state
//!
//! The store owns the ordered message list and the single "awaiting response"
//! flag. It is shared between the view and any in-flight dispatch, so it is a
//! cloneable handle over shared state rather than a plain struct.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Fenced code block delimiter that switches a message into Markdown mode
pub const CODE_FENCE: &str = "```";

/// The sender of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One turn in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Local>,
}

impl Message {
    pub fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            text: text.into(),
            sender,
            timestamp: Local::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Sender::User)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, Sender::Assistant)
    }

    /// Whether the message should be rendered as Markdown.
    ///
    /// Always derived from `text`; only assistant replies are ever flagged.
    pub fn contains_code(&self) -> bool {
        self.sender == Sender::Assistant && self.text.contains(CODE_FENCE)
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format("%d.%m.%Y %H:%M:%S").to_string()
    }
}

/// Whether a remote call is currently outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Awaiting,
}

#[derive(Debug)]
struct Inner {
    messages: Vec<Message>,
    request: RequestState,
}

/// Shared handle to one conversation and its request state.
///
/// The message list is append-only. Every successful append bumps the length
/// published through [`ConversationStore::subscribe`], which the view uses to
/// scroll to the newest message.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    inner: Arc<Mutex<Inner>>,
    len_tx: Arc<watch::Sender<usize>>,
}

impl ConversationStore {
    /// Create a store seeded with a single assistant greeting
    pub fn new(greeting: impl Into<String>) -> Self {
        let messages = vec![Message::assistant(greeting)];
        let (len_tx, _) = watch::channel(messages.len());
        Self {
            inner: Arc::new(Mutex::new(Inner {
                messages,
                request: RequestState::Idle,
            })),
            len_tx: Arc::new(len_tx),
        }
    }

    // No code path panics while holding the lock, but a poisoned
    // conversation is still readable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a message to the end of the conversation.
    ///
    /// Messages with empty text are dropped; returns whether anything changed.
    pub fn append(&self, message: Message) -> bool {
        if message.text.is_empty() {
            return false;
        }
        let len = {
            let mut inner = self.lock();
            inner.messages.push(message);
            inner.messages.len()
        };
        self.len_tx.send_replace(len);
        true
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn last(&self) -> Option<Message> {
        self.lock().messages.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn request_state(&self) -> RequestState {
        self.lock().request
    }

    pub fn is_awaiting(&self) -> bool {
        self.request_state() == RequestState::Awaiting
    }

    /// Receiver that observes the conversation length after every append
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.len_tx.subscribe()
    }

    /// Append the user's message and move Idle -> Awaiting in one step.
    ///
    /// Returns false without touching state if a request is already
    /// outstanding or the message is empty.
    pub(crate) fn begin_request(&self, message: Message) -> bool {
        if message.text.is_empty() {
            return false;
        }
        let len = {
            let mut inner = self.lock();
            if inner.request == RequestState::Awaiting {
                return false;
            }
            inner.messages.push(message);
            inner.request = RequestState::Awaiting;
            inner.messages.len()
        };
        self.len_tx.send_replace(len);
        true
    }

    pub(crate) fn finish_request(&self) {
        self.lock().request = RequestState::Idle;
    }
}
