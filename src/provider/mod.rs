pub mod gemini;
pub mod structured_output;

use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Shape the model is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    /// `{ "title": string }`
    Title,
    /// `{ "title": string, "content": string }`
    Node,
    /// `[{ "title": string, "content": string }, ...]`
    NodeList,
}

impl OutputSchema {
    /// Standard JSON Schema used to validate what comes back.
    pub fn json_schema(self) -> Value {
        let node = json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["title", "content"]
        });
        match self {
            Self::Title => json!({
                "type": "object",
                "properties": { "title": { "type": "string" } },
                "required": ["title"]
            }),
            Self::Node => node,
            Self::NodeList => json!({ "type": "array", "items": node }),
        }
    }

    /// Same schema in the uppercase type dialect the Gemini API expects for
    /// `generationConfig.responseSchema`.
    pub fn provider_schema(self) -> Value {
        let node = json!({
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING" },
                "content": { "type": "STRING" }
            },
            "required": ["title", "content"]
        });
        match self {
            Self::Title => json!({
                "type": "OBJECT",
                "properties": { "title": { "type": "STRING" } },
                "required": ["title"]
            }),
            Self::Node => node,
            Self::NodeList => json!({ "type": "ARRAY", "items": node }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub prompt: String,
    pub schema: OutputSchema,
}

/// A hosted model: prompt in, raw JSON text of one candidate out.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, request: &ModelRequest) -> AppResult<()> {
        if request.prompt.trim().is_empty() {
            return Err(AppError::InvalidInput("Prompt cannot be empty".to_string()));
        }
        if request.model.trim().is_empty() {
            return Err(AppError::InvalidInput("Model name cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Picks up endpoint and timeout changes from saved settings.
    fn apply_settings(&self, _settings: &AppSettings) -> AppResult<()> {
        Ok(())
    }

    async fn generate(&self, request: &ModelRequest) -> AppResult<String>;
}


#[cfg(test)]
pub(crate) mod scripted {
    use super::{ModelProvider, ModelRequest};
    use crate::errors::{AppError, AppResult};
    use crate::models::AppSettings;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses in order and records every prompt it sees.
    pub(crate) struct ScriptedProvider {
        responses: Mutex<VecDeque<AppResult<String>>>,
        prompts: Mutex<Vec<String>>,
        base_urls: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl ScriptedProvider {
        pub(crate) fn new(responses: Vec<AppResult<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
                base_urls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn replying(responses: &[&str]) -> Self {
            Self::new(responses.iter().map(|raw| Ok(raw.to_string())).collect())
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompts lock").clone()
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().expect("prompts lock").len()
        }

        /// Base URLs handed over through `apply_settings`, oldest first.
        pub(crate) fn applied_base_urls(&self) -> Vec<String> {
            self.base_urls.lock().expect("base urls lock").clone()
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn apply_settings(&self, settings: &AppSettings) -> AppResult<()> {
            self.base_urls
                .lock()
                .expect("base urls lock")
                .push(settings.api_base_url.clone());
            Ok(())
        }

        async fn generate(&self, request: &ModelRequest) -> AppResult<String> {
            self.prompts.lock().expect("prompts lock").push(request.prompt.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Provider("no scripted response left".to_string())))
        }
    }
}
