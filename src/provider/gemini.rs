//! Gemini REST client.
//!
//! Sends one `generateContent` request per call with a JSON response schema
//! and returns the text of the first candidate.

use super::{ModelProvider, ModelRequest};
use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
const KEYRING_SERVICE: &str = "ideanodes";
const KEYRING_ACCOUNT: &str = "gemini";

#[derive(Clone)]
enum ApiKeySource {
    Fixed(String),
    /// `GEMINI_API_KEY`, then the OS keyring, read on every request.
    EnvOrKeyring,
}

#[derive(Clone)]
struct Transport {
    client: Client,
    base_url: String,
}

pub struct GeminiProvider {
    key_source: ApiKeySource,
    transport: RwLock<Transport>,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        Self::build(ApiKeySource::Fixed(api_key.into()), timeout)
    }

    /// Looks the API key up per request, so a key saved after startup is
    /// picked up without rebuilding the provider.
    pub fn from_env(timeout: Duration) -> AppResult<Self> {
        Self::build(ApiKeySource::EnvOrKeyring, timeout)
    }

    fn build(key_source: ApiKeySource, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            key_source,
            transport: RwLock::new(Transport {
                client: http_client(timeout)?,
                base_url: DEFAULT_BASE_URL.to_string(),
            }),
        })
    }

    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        let base_url = normalize_base_url(&base_url.into());
        match self.transport.write() {
            Ok(mut transport) => transport.base_url = base_url,
            Err(poisoned) => poisoned.into_inner().base_url = base_url,
        }
        self
    }

    fn transport(&self) -> Transport {
        match self.transport.read() {
            Ok(transport) => transport.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn api_key(&self) -> AppResult<String> {
        match &self.key_source {
            ApiKeySource::Fixed(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            ApiKeySource::Fixed(_) => Err(missing_key()),
            ApiKeySource::EnvOrKeyring => resolve_api_key(),
        }
    }

    async fn send_request(&self, model: &str, body: &GenerateContentRequest) -> AppResult<String> {
        let api_key = self.api_key()?;
        let transport = self.transport();
        let url = format!("{}/{}:generateContent", transport.base_url, model);

        let response = transport
            .client
            .post(url)
            .query(&[("key", api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|err| AppError::Provider(format!("Gemini API request failed: {}", err.without_url())))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| AppError::Provider(format!("Failed to parse Gemini response: {}", err.without_url())))?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn apply_settings(&self, settings: &AppSettings) -> AppResult<()> {
        let next = Transport {
            client: http_client(Duration::from_secs(settings.request_timeout_secs))?,
            base_url: normalize_base_url(&settings.api_base_url),
        };
        match self.transport.write() {
            Ok(mut transport) => *transport = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        Ok(())
    }

    async fn generate(&self, request: &ModelRequest) -> AppResult<String> {
        self.validate(request)?;
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: request.schema.provider_schema(),
            },
        };
        self.send_request(&request.model, &body).await
    }
}

pub fn resolve_api_key() -> AppResult<String> {
    if let Ok(value) = std::env::var(API_KEY_ENV) {
        if !value.trim().is_empty() {
            return Ok(value.trim().to_string());
        }
    }
    match keyring_entry()?.get_password() {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) | Err(keyring::Error::NoEntry) => Err(missing_key()),
        Err(error) => Err(AppError::Io(error.to_string())),
    }
}

pub fn save_api_key(api_key: &str) -> AppResult<()> {
    if api_key.trim().is_empty() {
        return Err(AppError::InvalidInput("API key cannot be empty".to_string()));
    }
    keyring_entry()?
        .set_password(api_key.trim())
        .map_err(|error| AppError::Io(error.to_string()))
}

pub fn clear_api_key() -> AppResult<()> {
    match keyring_entry()?.delete_credential() {
        Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(error) => Err(AppError::Io(error.to_string())),
    }
}

pub fn has_api_key() -> AppResult<bool> {
    match resolve_api_key() {
        Ok(_) => Ok(true),
        Err(AppError::Provider(_)) => Ok(false),
        Err(error) => Err(error),
    }
}

fn missing_key() -> AppError {
    AppError::Provider(format!("{} is not set", API_KEY_ENV))
}

fn http_client(timeout: Duration) -> AppResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("Failed to build HTTP client: {error}")))
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

fn keyring_entry() -> AppResult<keyring::Entry> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT).map_err(|error| AppError::Io(error.to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn extract_text_response(response: GenerateContentResponse) -> AppResult<String> {
    response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AppError::InvalidOutput("No response from AI".to_string()))
}

fn map_http_error(status: StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.to_string());

    AppError::Provider(format!("Gemini API returned {}: {}", status.as_u16(), message))
}

#[cfg(test)]
mod tests {
    use super::{
        extract_text_response, map_http_error, GeminiProvider, GenerateContentRequest, GenerationConfig,
        DEFAULT_BASE_URL, DEFAULT_TIMEOUT,
    };
    use crate::errors::AppError;
    use crate::models::AppSettings;
    use crate::provider::{ModelProvider, ModelRequest, OutputSchema};
    use reqwest::StatusCode;

    #[tokio::test]
    async fn blank_key_fails_before_any_request() {
        let provider = GeminiProvider::new("  ", DEFAULT_TIMEOUT)
            .expect("provider")
            .with_base_url("http://127.0.0.1:9");
        let request = ModelRequest {
            model: "gemini-2.5-flash".to_string(),
            prompt: "hello".to_string(),
            schema: OutputSchema::Title,
        };
        let error = provider.generate(&request).await.expect_err("missing key");
        assert_eq!(error.to_string(), "PROVIDER_ERROR: GEMINI_API_KEY is not set");
    }

    #[test]
    fn settings_replace_endpoint() {
        let provider = GeminiProvider::new("key", DEFAULT_TIMEOUT).expect("provider");
        assert_eq!(provider.transport().base_url, DEFAULT_BASE_URL);

        let settings = AppSettings {
            api_base_url: "http://localhost:8080/models/".to_string(),
            request_timeout_secs: 5,
            ..AppSettings::default()
        };
        provider.apply_settings(&settings).expect("apply");
        assert_eq!(provider.transport().base_url, "http://localhost:8080/models");
    }

    #[test]
    fn extracts_first_candidate_text() {
        let parsed = serde_json::from_value(serde_json::json!({
            "candidates": [
                { "content": { "parts": [{ "text": "{\"title\":\"A\"}" }] } },
                { "content": { "parts": [{ "text": "{\"title\":\"B\"}" }] } }
            ]
        }))
        .expect("response");
        assert_eq!(extract_text_response(parsed).expect("text"), "{\"title\":\"A\"}");
    }

    #[test]
    fn missing_candidates_is_invalid_output() {
        let parsed = serde_json::from_value(serde_json::json!({ "candidates": [] })).expect("response");
        assert!(matches!(extract_text_response(parsed), Err(AppError::InvalidOutput(_))));
    }

    #[test]
    fn http_error_uses_provider_message() {
        let error = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        let text = error.to_string();
        assert!(text.contains("429"));
        assert!(text.contains("RESOURCE_EXHAUSTED: Quota exceeded"));
    }

    #[test]
    fn request_body_uses_camel_case_generation_config() {
        let body = GenerateContentRequest {
            contents: vec![],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: OutputSchema::Node.provider_schema(),
            },
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }
}
