use once_cell::sync::Lazy;
use regex::Regex;

/// Named credentials such as `api_key=...`, `key=...` in a query string, or
/// `"x-goog-api-key": "..."`.
static NAMED_SECRET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b((?:x-goog-)?api[_-]?key|key|token|secret|password)(["']?\s*[:=]\s*["']?)([A-Za-z0-9_\-\.]{6,})"#)
        .expect("valid regex")
});

static BARE_SECRETS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\bAIza[0-9A-Za-z_\-]{30,}").expect("valid regex"),
        Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9_\-\.=]{10,}").expect("valid regex"),
        Regex::new(r"\b[A-Fa-f0-9]{32,}\b").expect("valid regex"),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionResult {
    pub content: String,
    pub redaction_count: usize,
}

/// Scrubs credentials out of provider error text before it is stored in a job
/// record or written to the log.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    aggressive: bool,
}

impl Redactor {
    pub fn new(aggressive: bool) -> Self {
        Self { aggressive }
    }

    pub fn redact(&self, input: &str) -> RedactionResult {
        if input.is_empty() {
            return RedactionResult {
                content: String::new(),
                redaction_count: 0,
            };
        }

        let mut redaction_count = NAMED_SECRET.find_iter(input).count();
        let mut result = NAMED_SECRET
            .replace_all(input, |caps: &regex::Captures<'_>| {
                format!("{}{}[REDACTED]", &caps[1], &caps[2])
            })
            .into_owned();

        for pattern in BARE_SECRETS.iter() {
            let matches = pattern.find_iter(&result).count();
            if matches == 0 {
                continue;
            }
            redaction_count += matches;
            result = pattern.replace_all(&result, "[REDACTED]").into_owned();
        }

        if self.aggressive {
            result = result
                .split(' ')
                .map(|token| {
                    if token.len() > 48 && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                        redaction_count += 1;
                        "[REDACTED_LONG_TOKEN]"
                    } else {
                        token
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
        }

        RedactionResult {
            content: result,
            redaction_count,
        }
    }

    pub fn redact_text(&self, input: &str) -> String {
        let result = self.redact(input);
        if result.redaction_count > 0 {
            tracing::debug!(redactions = result.redaction_count, "redacted secrets from error text");
        }
        result.content
    }
}
