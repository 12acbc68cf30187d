use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Generation parameters, as they appear under `request_params` in config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParams {
    // config lowercases keys read from files, hence the aliases.
    #[serde(alias = "topp")]
    pub top_p: f64,
    #[serde(alias = "topk")]
    pub top_k: u32,
    #[serde(alias = "maxtokens")]
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(
        default,
        alias = "repeatpenalty",
        skip_serializing_if = "Option::is_none"
    )]
    pub repeat_penalty: Option<f64>,
    #[serde(default, alias = "stopbefore")]
    pub stop_before: Vec<String>,
    #[serde(default, alias = "includeaifilters")]
    pub include_ai_filters: bool,
    #[serde(default)]
    pub seed: i64,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            top_p: 0.8,
            top_k: 0,
            max_tokens: 256,
            temperature: 0.5,
            repeat_penalty: None,
            stop_before: Vec::new(),
            include_ai_filters: true,
            seed: 0,
        }
    }
}

/// Body of a chat-completion call. Built fresh for every call and not
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub params: RequestParams,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, params: RequestParams) -> Self {
        Self { messages, params }
    }
}
