use proxbot_orchestrator::{Choice, Command, InvocationContext};
use serde::{Deserialize, Serialize};

/// A slash command forwarded by the chat adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    #[serde(default)]
    pub context: InvocationContext,
    pub command: Command,
}

/// A button press on a previously issued prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptAnswer {
    #[serde(default)]
    pub context: InvocationContext,
    pub choice: Choice,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutocompleteQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub ready: bool,
    pub timestamp: String,
}
