use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export so binaries only need the `ai` side of the seam
pub use config::AiConfig;

/// Role of one message in a chat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat completion endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("chat completion response contained no choices")]
    Empty,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// A thin pass-through: one request per call, no retries, no planning.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    /// Send the full message history and return the model's reply.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, turns = messages.len(), "requesting chat completion");

        let mut request = self.http.post(&self.url).json(&CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::Empty)
    }
}

/// Ordered chat history.
///
/// Callers own the memory and pass it to whichever chain should see it;
/// nothing here is process-global.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.push(Role::System, prompt);
        conversation
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A prompt with `{name}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute placeholders. Placeholders without a matching variable
    /// are left in place.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        vars.iter().fold(
            self.template.clone(),
            |text, (name, value)| text.replace(&format!("{{{name}}}"), value),
        )
    }
}

/// One prompt template bound to a client.
///
/// Each run renders the template, appends it as a user turn to the caller's
/// conversation, completes over the whole history, and appends the reply.
#[derive(Debug, Clone)]
pub struct Chain {
    client: LlmClient,
    template: PromptTemplate,
}

impl Chain {
    pub fn new(client: LlmClient, template: PromptTemplate) -> Self {
        Self { client, template }
    }

    /// A failed run leaves the conversation untouched: the user turn is
    /// only recorded alongside the reply it produced, so the history never
    /// carries a question with no answer.
    pub async fn run(
        &self,
        memory: &mut Conversation,
        vars: &[(&str, &str)],
    ) -> Result<String, LlmError> {
        let prompt = self.template.render(vars);

        let mut messages = memory.messages().to_vec();
        messages.push(ChatMessage::new(Role::User, prompt.clone()));
        let reply = self.client.complete(&messages).await?;

        memory.push(Role::User, prompt);
        memory.push(Role::Assistant, reply.clone());
        Ok(reply)
    }
}

/// Models often wrap answers in markdown fences; return the inner text.
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    // Drop the language tag on the opening fence, if any.
    match inner.find('\n') {
        Some(pos) => inner[pos + 1..].trim(),
        None => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_every_placeholder() {
        let template = PromptTemplate::new("Visit {destination} for {days} days.");
        let rendered = template.render(&[("destination", "Kyoto"), ("days", "3")]);
        assert_eq!(rendered, "Visit Kyoto for 3 days.");
    }

    #[test]
    fn template_leaves_unknown_placeholders_alone() {
        let template = PromptTemplate::new("{schema} and {question}");
        assert_eq!(
            template.render(&[("question", "how many?")]),
            "{schema} and how many?"
        );
    }

    #[test]
    fn conversation_keeps_turn_order() {
        let mut memory = Conversation::with_system_prompt("be brief");
        memory.push(Role::User, "hello");
        memory.push(Role::Assistant, "hi");

        let roles: Vec<Role> = memory.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(memory.len(), 3);
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn completion_response_shape() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"SELECT 1"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "SELECT 1");
    }

    #[tokio::test]
    async fn failed_chain_run_leaves_memory_unchanged() {
        // Port 9 (discard) has no listener, so the request fails without
        // ever reaching a model.
        let config = AiConfig {
            model: "test".to_string(),
            url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            temperature: 0.0,
        };
        let chain = Chain::new(LlmClient::new(&config), PromptTemplate::new("about {topic}"));
        let mut memory = Conversation::with_system_prompt("be brief");

        let result = chain.run(&mut memory, &[("topic", "pools")]).await;

        assert!(result.is_err());
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.messages()[0].role, Role::System);
    }

    #[test]
    fn fences_are_stripped_with_and_without_language_tags() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
        assert_eq!(strip_code_fences("```SELECT 1```"), "SELECT 1");
    }
}
