//! Prompt presets: message templates plus generation parameters, filled in
//! per item before each call.

use crate::schemas::completion_request::{CompletionRequest, Message, RequestParams, Role};
use serde::Deserialize;
use std::collections::HashMap;

pub const ORIGINAL_TEXT: &str = "{original_text}";
pub const GENERATED_TEXT: &str = "{generated_text}";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MessageTemplate {
    #[serde(default)]
    pub role: Option<Role>,
    pub content: String,
}

impl MessageTemplate {
    fn render(&self, default_role: Role, vars: &TemplateVars<'_>) -> Message {
        let mut content = self.content.replace(ORIGINAL_TEXT, vars.original_text);
        if let Some(generated) = vars.generated_text {
            content = content.replace(GENERATED_TEXT, generated);
        }
        Message::new(self.role.unwrap_or(default_role), content)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PresetSettings {
    pub system: MessageTemplate,
    pub user: MessageTemplate,
    /// Alternative user templates sharing the system message and
    /// parameters, e.g. `positive` / `negative`.
    #[serde(default)]
    pub variants: HashMap<String, MessageTemplate>,
    #[serde(default)]
    pub request_params: RequestParams,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateVars<'a> {
    pub original_text: &'a str,
    pub generated_text: Option<&'a str>,
}

impl<'a> TemplateVars<'a> {
    pub fn new(original_text: &'a str) -> Self {
        Self {
            original_text,
            generated_text: None,
        }
    }

    pub fn with_generated_text(mut self, generated_text: &'a str) -> Self {
        self.generated_text = Some(generated_text);
        self
    }
}

impl PresetSettings {
    /// Builds a system + user request. Placeholders without a value are
    /// left as they are.
    pub fn build_request(&self, vars: &TemplateVars<'_>) -> CompletionRequest {
        self.request_with(&self.user, vars)
    }

    /// Same as [`build_request`](Self::build_request) with the named user
    /// variant; `None` selects the default user template.
    pub fn build_variant_request(
        &self,
        variant: Option<&str>,
        vars: &TemplateVars<'_>,
    ) -> Option<CompletionRequest> {
        let user = match variant {
            Some(name) => self.variants.get(name)?,
            None => &self.user,
        };
        Some(self.request_with(user, vars))
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variants.contains_key(name)
    }

    fn request_with(&self, user: &MessageTemplate, vars: &TemplateVars<'_>) -> CompletionRequest {
        CompletionRequest::new(
            vec![
                self.system.render(Role::System, vars),
                user.render(Role::User, vars),
            ],
            self.request_params.clone(),
        )
    }
}
