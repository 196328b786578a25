//! One request/response cycle against the remote completion service

use std::sync::Arc;

use crate::ai::CompletionClient;
use crate::state::{ConversationStore, Message};

/// The assistant persona the remote model is asked to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub product: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Nora".to_string(),
            product: "NoraCloud".to_string(),
        }
    }
}

impl Persona {
    pub fn new(name: &str, product: &str) -> Self {
        Self {
            name: name.to_string(),
            product: product.to_string(),
        }
    }

    /// Seed message shown before the user has typed anything
    pub fn greeting(&self) -> String {
        format!(
            "Hi! I'm {}, your virtual assistant for {}. How can I help you today?",
            self.name, self.product
        )
    }

    /// Wrap a single user query in the role-establishing template.
    ///
    /// No conversation history is included.
    pub fn prompt(&self, query: &str) -> String {
        format!(
            "As {}, the helpful {} virtual assistant, respond to this user query: {} ",
            self.name, self.product, query
        )
    }
}

/// What a call to [`Dispatcher::send_message`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Input was empty or absent; nothing changed
    Ignored,
    /// Another request is still outstanding; nothing changed
    Busy,
    /// The assistant reply was appended
    Replied,
    /// The remote call succeeded with empty text, so no bubble was appended
    EmptyReply,
    /// The remote call failed; the error was logged and nothing was appended
    Failed,
}

/// Resets the awaiting flag on every exit path, including cancellation
struct AwaitingGuard<'a> {
    store: &'a ConversationStore,
}

impl Drop for AwaitingGuard<'_> {
    fn drop(&mut self) {
        self.store.finish_request();
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: ConversationStore,
    client: Arc<dyn CompletionClient>,
    persona: Persona,
}

impl Dispatcher {
    pub fn new(
        store: ConversationStore,
        client: Arc<dyn CompletionClient>,
        persona: Persona,
    ) -> Self {
        Self {
            store,
            client,
            persona,
        }
    }

    /// Build a fresh conversation seeded with the persona's greeting
    pub fn with_greeting(client: Arc<dyn CompletionClient>, persona: Persona) -> Self {
        let store = ConversationStore::new(persona.greeting());
        Self::new(store, client, persona)
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Send one user message and append the assistant's reply.
    ///
    /// The user message is appended before the request starts. Remote
    /// failures are logged and never appear in the conversation.
    pub async fn send_message<'a>(&self, input: impl Into<Option<&'a str>>) -> Dispatch {
        let text = match input.into() {
            Some(text) if !text.is_empty() => text,
            _ => return Dispatch::Ignored,
        };

        if !self.store.begin_request(Message::user(text)) {
            log::warn!("Ignoring message while a request is outstanding");
            return Dispatch::Busy;
        }
        let guard = AwaitingGuard { store: &self.store };

        let prompt = self.persona.prompt(text);
        log::debug!("Dispatching prompt ({} chars)", prompt.chars().count());

        match self.client.complete(&prompt).await {
            Ok(reply) => {
                let appended = self.store.append(Message::assistant(reply));
                drop(guard);
                if appended {
                    log::info!("Assistant replied; conversation has {} messages", self.store.len());
                    Dispatch::Replied
                } else {
                    log::warn!("Remote call returned an empty reply");
                    Dispatch::EmptyReply
                }
            }
            Err(err) => {
                drop(guard);
                log::error!("generateContent error: {err:#}");
                Dispatch::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RequestState, Sender};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Replies with a fixed result and records every prompt it sees
    struct StubClient {
        reply: std::result::Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubClient {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(text.to_string()), prompts: Mutex::new(Vec::new()) })
        }

        fn err(msg: &str) -> Arc<Self> {
            Arc::new(Self { reply: Err(msg.to_string()), prompts: Mutex::new(Vec::new()) })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|e| anyhow!(e))
        }
    }

    /// Records what the conversation looked like while the call was in flight
    struct ObservingClient {
        store: Mutex<Option<ConversationStore>>,
        seen: Mutex<Option<(RequestState, Option<Message>)>>,
    }

    #[async_trait]
    impl CompletionClient for ObservingClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let store = self.store.lock().unwrap().clone().unwrap();
            *self.seen.lock().unwrap() = Some((store.request_state(), store.last()));
            Err(anyhow!("observed"))
        }
    }

    /// Blocks until released, so tests can act while a request is outstanding
    struct GatedClient {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CompletionClient for GatedClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("released".to_string())
        }
    }

    fn dispatcher(client: Arc<dyn CompletionClient>) -> Dispatcher {
        Dispatcher::with_greeting(client, Persona::default())
    }

    fn summary(store: &ConversationStore) -> Vec<(String, Sender)> {
        store.messages().into_iter().map(|m| (m.text, m.sender)).collect()
    }

    #[test]
    fn test_fresh_conversation_has_greeting_only() {
        let d = dispatcher(StubClient::ok("unused"));
        let greeting = "Hi! I'm Nora, your virtual assistant for NoraCloud. How can I help you today?";
        assert_eq!(
            summary(d.store()),
            vec![(greeting.to_string(), Sender::Assistant)]
        );
        assert!(!d.store().is_awaiting());
    }

    #[test]
    fn test_prompt_template() {
        let persona = Persona::default();
        assert_eq!(
            persona.prompt("Where is my invoice?"),
            "As Nora, the helpful NoraCloud virtual assistant, respond to this user query: Where is my invoice? "
        );
        let custom = Persona::new("Ada", "Acme");
        assert!(custom.prompt("x").starts_with("As Ada, the helpful Acme virtual assistant"));
    }

    #[tokio::test]
    async fn test_send_message_appends_user_and_reply() {
        let client = StubClient::ok("Hi there");
        let d = dispatcher(client.clone());
        let greeting = d.persona().greeting();

        assert_eq!(d.send_message("Hello").await, Dispatch::Replied);

        assert_eq!(
            summary(d.store()),
            vec![
                (greeting, Sender::Assistant),
                ("Hello".to_string(), Sender::User),
                ("Hi there".to_string(), Sender::Assistant),
            ]
        );
        assert!(!d.store().last().unwrap().contains_code());
        assert!(!d.store().is_awaiting());
    }

    #[tokio::test]
    async fn test_code_reply_is_flagged() {
        let d = dispatcher(StubClient::ok("```js\nconsole.log(1)\n```"));
        assert_eq!(d.send_message("show code").await, Dispatch::Replied);

        let reply = d.store().last().unwrap();
        assert_eq!(reply.sender, Sender::Assistant);
        assert!(reply.contains_code());
    }

    #[tokio::test]
    async fn test_failure_appends_nothing_and_clears_flag() {
        let d = dispatcher(StubClient::err("quota exceeded"));
        let greeting = d.persona().greeting();

        assert_eq!(d.send_message("fail case").await, Dispatch::Failed);

        assert_eq!(
            summary(d.store()),
            vec![(greeting, Sender::Assistant), ("fail case".to_string(), Sender::User)]
        );
        assert!(!d.store().is_awaiting());
    }

    #[tokio::test]
    async fn test_empty_input_is_ignored() {
        let client = StubClient::ok("unused");
        let d = dispatcher(client.clone());
        let mut rx = d.store().subscribe();

        assert_eq!(d.send_message("").await, Dispatch::Ignored);
        assert_eq!(d.send_message(None::<&str>).await, Dispatch::Ignored);

        assert_eq!(d.store().len(), 1);
        assert!(!d.store().is_awaiting());
        assert!(!rx.has_changed().unwrap());
        assert!(client.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_appends_nothing() {
        let d = dispatcher(StubClient::ok(""));
        assert_eq!(d.send_message("anything").await, Dispatch::EmptyReply);
        assert_eq!(d.store().len(), 2);
        assert!(!d.store().is_awaiting());
    }

    #[tokio::test]
    async fn test_prompt_carries_no_history() {
        let client = StubClient::ok("ok");
        let d = dispatcher(client.clone());

        d.send_message("first question").await;
        d.send_message("second question").await;

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1], d.persona().prompt("second question"));
        assert!(!prompts[1].contains("first question"));
    }

    #[tokio::test]
    async fn test_sequential_sends_keep_call_order() {
        let d = dispatcher(StubClient::ok("reply"));
        d.send_message("one").await;
        d.send_message("two").await;

        let texts: Vec<String> = d.store().messages().into_iter().skip(1).map(|m| m.text).collect();
        assert_eq!(texts, vec!["one", "reply", "two", "reply"]);

        let stamps: Vec<_> = d.store().messages().into_iter().map(|m| m.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_awaiting_while_call_is_in_flight() {
        let client = Arc::new(ObservingClient {
            store: Mutex::new(None),
            seen: Mutex::new(None),
        });
        let d = dispatcher(client.clone());
        *client.store.lock().unwrap() = Some(d.store().clone());

        assert_eq!(d.send_message("watch me").await, Dispatch::Failed);

        let (state, last) = client.seen.lock().unwrap().clone().unwrap();
        assert_eq!(state, RequestState::Awaiting);
        let last = last.unwrap();
        assert_eq!(last.text, "watch me");
        assert_eq!(last.sender, Sender::User);
        assert!(!d.store().is_awaiting());
    }

    #[tokio::test]
    async fn test_second_send_while_awaiting_is_busy() {
        let client = Arc::new(GatedClient { entered: Notify::new(), release: Notify::new() });
        let d = dispatcher(client.clone());

        let in_flight = {
            let d = d.clone();
            tokio::spawn(async move { d.send_message("first").await })
        };
        client.entered.notified().await;
        assert!(d.store().is_awaiting());

        assert_eq!(d.send_message("second").await, Dispatch::Busy);
        assert_eq!(d.store().len(), 2);

        client.release.notify_one();
        assert_eq!(in_flight.await.unwrap(), Dispatch::Replied);
        assert!(!d.store().is_awaiting());
        assert_eq!(d.store().last().unwrap().text, "released");
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_flag() {
        let client = Arc::new(GatedClient { entered: Notify::new(), release: Notify::new() });
        let d = dispatcher(client.clone());

        let in_flight = {
            let d = d.clone();
            tokio::spawn(async move { d.send_message("abandoned").await })
        };
        client.entered.notified().await;
        assert!(d.store().is_awaiting());

        in_flight.abort();
        assert!(in_flight.await.unwrap_err().is_cancelled());
        assert!(!d.store().is_awaiting());
        assert_eq!(d.store().len(), 2);
    }
}
