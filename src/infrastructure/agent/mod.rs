//! Agent profile lookup and the conversation model client

pub mod chat;
pub mod directory;

pub use chat::ChatCompletionAgent;
pub use directory::StaticAgentDirectory;
