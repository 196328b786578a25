pub mod ai;
pub mod config;
pub mod dispatcher;
pub mod provider;
pub mod state;

// Re-export main types for convenience
pub use ai::{CompletionClient, GeminiClient, OllamaClient};
pub use config::Config;
pub use dispatcher::{Dispatch, Dispatcher, Persona};
pub use provider::Provider;
pub use state::{ConversationStore, Message, RequestState, Sender};
