use super::OutputSchema;
use crate::errors::{AppError, AppResult};
use crate::models::NodeDraft;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct StructuredOutputValidationResult {
    pub value: Option<Value>,
    pub error: Option<String>,
    pub errors: Vec<String>,
}

pub fn resolve_structured_output(content: Option<&str>) -> Option<Value> {
    content.and_then(parse_json_value)
}

fn parse_json_value(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    // Some responses still arrive wrapped in a ```json fence.
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))?;
    serde_json::from_str(unfenced.trim()).ok()
}

pub fn validate_structured_output(value: Option<Value>, schema: &Value) -> StructuredOutputValidationResult {
    let Some(value) = value else {
        return StructuredOutputValidationResult {
            value: None,
            error: Some("Structured output is missing or invalid JSON.".to_string()),
            errors: vec![],
        };
    };

    let compiled = match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled,
        Err(error) => {
            return StructuredOutputValidationResult {
                value: Some(value),
                error: Some(format!("Failed to validate structured output schema: {}", error)),
                errors: vec![],
            }
        }
    };

    let errors: Vec<String> = compiled
        .validate(&value)
        .err()
        .map(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if errors.is_empty() {
        StructuredOutputValidationResult {
            value: Some(value),
            error: None,
            errors,
        }
    } else {
        StructuredOutputValidationResult {
            value: Some(value),
            error: Some("Structured output did not match schema.".to_string()),
            errors,
        }
    }
}

/// Parses raw model text and checks it against `schema`.
pub fn decode(raw: &str, schema: OutputSchema) -> AppResult<Value> {
    if raw.trim().is_empty() {
        return Err(AppError::InvalidOutput("No response from AI".to_string()));
    }
    let validation = validate_structured_output(resolve_structured_output(Some(raw)), &schema.json_schema());
    match (validation.value, validation.error) {
        (Some(value), None) => Ok(value),
        (_, Some(error)) if validation.errors.is_empty() => Err(AppError::InvalidOutput(error)),
        (_, Some(error)) => Err(AppError::InvalidOutput(format!(
            "{} {}",
            error,
            validation.errors.join("; ")
        ))),
        (None, None) => Err(AppError::InvalidOutput("No response from AI".to_string())),
    }
}

pub fn node_draft(value: &Value) -> AppResult<NodeDraft> {
    serde_json::from_value(value.clone())
        .map_err(|error| AppError::InvalidOutput(format!("Model node is malformed: {}", error)))
}

pub fn node_drafts(value: &Value) -> AppResult<Vec<NodeDraft>> {
    let drafts: Vec<NodeDraft> = serde_json::from_value(value.clone())
        .map_err(|error| AppError::InvalidOutput(format!("Model node list is malformed: {}", error)))?;
    if drafts.is_empty() {
        return Err(AppError::InvalidOutput("Model returned no nodes".to_string()));
    }
    Ok(drafts)
}

pub fn title(value: &Value) -> AppResult<String> {
    value
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| AppError::InvalidOutput("Model returned an empty title".to_string()))
}

#[cfg(test)]
mod tests {
    use super::{decode, node_drafts, resolve_structured_output, title, validate_structured_output};
    use crate::errors::AppError;
    use crate::provider::OutputSchema;

    #[test]
    fn resolves_fenced_json() {
        let value = resolve_structured_output(Some("```json\n{\"a\":1}\n```"));
        assert_eq!(value, Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn validates_schema_and_reports_errors() {
        let validation = validate_structured_output(
            Some(serde_json::json!({"title": 3})),
            &OutputSchema::Node.json_schema(),
        );
        assert!(validation.error.is_some());
        assert!(!validation.errors.is_empty());
    }

    #[test]
    fn decode_rejects_empty_and_malformed_text() {
        for raw in ["", "   ", "not json", "{\"title\": \"only title\""] {
            let err = decode(raw, OutputSchema::Node).expect_err("should fail");
            assert!(matches!(err, AppError::InvalidOutput(ref message) if !message.is_empty()));
        }
    }

    #[test]
    fn decode_rejects_missing_content_field() {
        let err = decode("{\"title\":\"Solution\"}", OutputSchema::Node).expect_err("missing content");
        assert!(err.to_string().contains("did not match schema"));
    }

    #[test]
    fn empty_node_list_is_rejected() {
        let value = decode("[]", OutputSchema::NodeList).expect("valid but empty");
        assert!(node_drafts(&value).is_err());
    }

    #[test]
    fn title_is_trimmed() {
        let value = decode("{\"title\":\"  Seeds of Change \"}", OutputSchema::Title).expect("decode");
        assert_eq!(title(&value).expect("title"), "Seeds of Change");
    }
}
