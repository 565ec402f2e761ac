//! Layer C: generative rescue over cropped-region text.
//!
//! The prompt is built from the cropped text alone. Callers must never pass
//! whole-page text here; the orchestrator enforces that by construction.

use std::sync::LazyLock;

use serde::Deserialize;
use tracing::debug;

use super::types::{IdentifierRescue, RescueAnswer};
use super::ExtractionError;
use crate::pipeline::llm::LlmClient;

const SYSTEM_PROMPT: &str = "You read short text fragments cut from scanned work-order \
forms and return the work-order number printed in them. Answer only with JSON matching \
the schema. If no work-order number is present, return null for identifier. Never invent \
digits that are not in the fragment.";

/// Fixed response schema passed to the model as its output format.
static RESPONSE_SCHEMA: LazyLock<serde_json::Value> = LazyLock::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {
            "identifier": { "type": ["string", "null"] },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "reason": { "type": "string" }
        },
        "required": ["identifier", "confidence", "reason"]
    })
});

/// Cropped text is already small; this bounds a pathological region.
const MAX_FRAGMENT_CHARS: usize = 2000;

pub struct LlmRescue {
    client: Box<dyn LlmClient + Send + Sync>,
    model: String,
}

impl LlmRescue {
    pub fn new(client: Box<dyn LlmClient + Send + Sync>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

/// Build the user prompt from cropped-region text and the digit hint.
pub fn build_prompt(cropped_text: &str, expected_digits: u8) -> String {
    let fragment: String = cropped_text.chars().take(MAX_FRAGMENT_CHARS).collect();
    format!(
        "The work-order number is usually {expected_digits} digits long.\n\
         Fragment:\n<<<\n{fragment}\n>>>\n\
         Return {{\"identifier\": string|null, \"confidence\": number, \"reason\": string}}."
    )
}

#[derive(Deserialize)]
struct RawAnswer {
    identifier: Option<serde_json::Value>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse the model output. Tolerates a fenced code block around the JSON
/// and numeric identifiers.
pub fn parse_answer(raw: &str) -> Result<RescueAnswer, ExtractionError> {
    let body = strip_code_fence(raw.trim());
    let parsed: RawAnswer = serde_json::from_str(body)
        .map_err(|e| ExtractionError::MalformedResponse(format!("rescue answer: {e}")))?;

    let identifier = match parsed.identifier {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            return Err(ExtractionError::MalformedResponse(format!(
                "identifier has unexpected type: {other}"
            )))
        }
    };

    Ok(RescueAnswer {
        identifier,
        confidence: parsed.confidence,
        reason: parsed.reason,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

impl IdentifierRescue for LlmRescue {
    fn rescue(
        &self,
        cropped_text: &str,
        expected_digits: u8,
    ) -> Result<RescueAnswer, ExtractionError> {
        let prompt = build_prompt(cropped_text, expected_digits);
        let raw = self
            .client
            .generate(&self.model, &prompt, SYSTEM_PROMPT, Some(&*RESPONSE_SCHEMA))?;
        debug!(model = %self.model, response_len = raw.len(), "Rescue model answered");
        parse_answer(&raw)
    }
}
