//! # Architect — LLM-backed code generation
//!
//! Stateless wrapper around an OpenAI-compatible chat completions endpoint
//! (Groq by default). Given the failure or performance context plus the
//! current worker source, it returns a complete replacement source and a
//! short human-readable rationale.
//!
//! The service is an opaque capability: nothing here inspects or executes
//! the returned code — that is the validator's job.

use std::env;
use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WatchError;

/// Default chat model. Override with `GROQ_MODEL`.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
/// OpenAI-compatible API root. Override with `GROQ_BASE_URL` (useful for tests).
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

const SYSTEM_PROMPT: &str = "You are an expert Python debugger and optimizer. \
Return ONLY valid Python code without any markdown formatting, explanations, \
or code blocks. The code must be complete and ready to execute.";

/// Why a mutation is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationIntent {
    /// The worker crashed or timed out; repair it.
    Fix,
    /// The worker is healthy but persistently slow; make it faster.
    Optimize,
}

impl std::fmt::Display for MutationIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationIntent::Fix => write!(f, "fix"),
            MutationIntent::Optimize => write!(f, "optimize"),
        }
    }
}

/// A candidate replacement source plus the note recorded as `last_mutation`.
#[derive(Debug, Clone)]
pub struct Generated {
    pub source: String,
    pub rationale: String,
}

/// Seam between the mutation protocol and the concrete generation backend.
pub trait CodeGenerator: Send + Sync {
    /// Produce a replacement for `source` given the triggering `context`.
    ///
    /// # Errors
    /// [`WatchError::Generation`] (or a transport error) when the service
    /// fails or returns unusable content. The caller treats any error as
    /// "abort this mutation attempt".
    fn generate(
        &self,
        context: &str,
        source: &str,
        intent: MutationIntent,
    ) -> impl Future<Output = Result<Generated, WatchError>> + Send;
}

// -- Chat completion wire types ---------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

// -- GroqArchitect ----------------------------------------------------------

/// [`CodeGenerator`] backed by Groq's OpenAI-compatible chat API.
pub struct GroqArchitect {
    client: Client,
    api_key: String,
    pub model: String,
    base_url: String,
}

impl GroqArchitect {
    /// Build from `GROQ_API_KEY` (required), `GROQ_MODEL` and `GROQ_BASE_URL`
    /// (optional).
    ///
    /// # Errors
    /// [`WatchError::Config`] when the API key is not set.
    pub fn from_env() -> Result<Self, WatchError> {
        let api_key = env::var("GROQ_API_KEY")
            .map_err(|_| WatchError::Config("GROQ_API_KEY not set".to_string()))?;
        Ok(Self::new(
            api_key,
            env::var("GROQ_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            env::var("GROQ_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        ))
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }
}

impl CodeGenerator for GroqArchitect {
    async fn generate(
        &self,
        context: &str,
        source: &str,
        intent: MutationIntent,
    ) -> Result<Generated, WatchError> {
        let prompt = match intent {
            MutationIntent::Fix => fix_prompt(context, source),
            MutationIntent::Optimize => optimization_prompt(context, source),
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 2000,
        };

        debug!(model = %self.model, %intent, "requesting generation");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::Generation(format!(
                "service replied HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| WatchError::Generation("service returned no content".to_string()))?;

        Ok(Generated {
            source: strip_markdown_fences(&content),
            rationale: rationale_for(context, intent),
        })
    }
}

// -- Helpers ----------------------------------------------------------------

/// Remove a surrounding ```` ```python … ``` ```` (or bare ```` ``` ````)
/// fence so the reply can be treated as raw source.
pub fn strip_markdown_fences(reply: &str) -> String {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    // Drop the opening fence line (``` or ```python), then everything after
    // the closing fence.
    let after_open = match trimmed.split_once('\n') {
        Some((_, rest)) => rest,
        None => return String::new(),
    };
    match after_open.rfind("```") {
        Some(idx) => after_open[..idx].trim().to_string(),
        None => after_open.trim().to_string(),
    }
}

/// Synthesize the short human-readable note recorded as `last_mutation`.
pub fn rationale_for(context: &str, intent: MutationIntent) -> String {
    if intent == MutationIntent::Optimize {
        let summary: String = context.chars().take(100).collect();
        return format!("Optimized code for better performance: {summary}");
    }
    if context.contains("ZeroDivisionError") {
        "Fixed: Division by zero error".to_string()
    } else if context.contains("SyntaxError") {
        "Fixed: Syntax error in code".to_string()
    } else if context.contains("NameError") {
        "Fixed: Undefined variable reference".to_string()
    } else if context.contains("IndexError") {
        "Fixed: List index out of range".to_string()
    } else if context.contains("TypeError") {
        "Fixed: Type mismatch error".to_string()
    } else if context.contains("deadline") || context.contains("timeout") {
        "Fixed: Worker exceeded execution deadline".to_string()
    } else {
        let head = context.split(':').next().unwrap_or("Code error").trim();
        if head.is_empty() {
            "Fixed: Code error".to_string()
        } else {
            format!("Fixed: {head}")
        }
    }
}

fn fix_prompt(context: &str, source: &str) -> String {
    format!(
        "The following Python code crashed with this error:\n\n\
         ERROR:\n{context}\n\n\
         CURRENT CODE:\n{source}\n\n\
         Fix the error and return the complete corrected Python code. The code should:\n\
         1. Fix the syntax or runtime error\n\
         2. Maintain the same functionality\n\
         3. Keep the same structure (imports, functions, entry point)\n\
         4. Be production-ready\n\n\
         Return ONLY the fixed Python code, nothing else."
    )
}

fn optimization_prompt(context: &str, source: &str) -> String {
    format!(
        "The following Python code is running too slowly:\n\n\
         PERFORMANCE ISSUE:\n{context}\n\n\
         CURRENT CODE:\n{source}\n\n\
         Optimize the code to run faster. Focus on:\n\
         1. Improving time complexity (e.g. replace O(n^2) with O(n log n))\n\
         2. Using efficient built-in functions\n\
         3. Maintaining the same functionality\n\
         4. Keeping the code readable\n\n\
         Return ONLY the optimized Python code, nothing else."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_strip_fences_python_block() {
        let reply = "```python\nprint('hi')\n```";
        assert_eq!(strip_markdown_fences(reply), "print('hi')");
    }

    #[test]
    fn test_strip_fences_bare_block() {
        let reply = "```\nx = 1\ny = 2\n```";
        assert_eq!(strip_markdown_fences(reply), "x = 1\ny = 2");
    }

    #[test]
    fn test_strip_fences_passthrough_without_fence() {
        assert_eq!(strip_markdown_fences("  x = 1\n"), "x = 1");
    }

    #[test]
    fn test_strip_fences_unclosed_block() {
        let reply = "```python\nx = 1";
        assert_eq!(strip_markdown_fences(reply), "x = 1");
    }

    #[rstest]
    #[case("ZeroDivisionError: division by zero", "Fixed: Division by zero error")]
    #[case("  SyntaxError: invalid syntax (line 10)", "Fixed: Syntax error in code")]
    #[case("NameError: name 'foo' is not defined", "Fixed: Undefined variable reference")]
    #[case("IndexError: list index out of range", "Fixed: List index out of range")]
    #[case("TypeError: unsupported operand", "Fixed: Type mismatch error")]
    #[case("worker exceeded the 10.0s execution deadline", "Fixed: Worker exceeded execution deadline")]
    fn test_fix_rationale_classification(#[case] context: &str, #[case] expected: &str) {
        assert_eq!(rationale_for(context, MutationIntent::Fix), expected);
    }

    #[test]
    fn test_fix_rationale_falls_back_to_error_head() {
        let r = rationale_for("RuntimeError: it broke", MutationIntent::Fix);
        assert_eq!(r, "Fixed: RuntimeError");
    }

    #[test]
    fn test_optimize_rationale_embeds_context() {
        let r = rationale_for("sustained latency above 1.0s", MutationIntent::Optimize);
        assert!(r.starts_with("Optimized code"));
        assert!(r.contains("sustained latency"));
    }

    #[test]
    fn test_intent_display() {
        assert_eq!(MutationIntent::Fix.to_string(), "fix");
        assert_eq!(MutationIntent::Optimize.to_string(), "optimize");
    }

    #[test]
    fn test_chat_request_serializes() {
        let req = ChatRequest {
            model: DEFAULT_MODEL.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            temperature: 0.3,
            max_tokens: 2000,
        };
        let json = serde_json::to_string(&req).expect("serialize");
        assert!(json.contains("llama-3.3-70b-versatile"));
        assert!(json.contains("\"max_tokens\":2000"));
    }

    #[test]
    fn test_chat_response_deserializes() {
        let json = r#"{"choices":[{"message":{"content":"x = 1"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).expect("deserialize");
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("x = 1")
        );
    }

    #[test]
    fn test_chat_response_tolerates_null_content() {
        let json = r#"{"choices":[{"message":{"content":null}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).expect("deserialize");
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn test_prompts_carry_context_and_source() {
        let fix = fix_prompt("ZeroDivisionError", "x = 1/0");
        assert!(fix.contains("ZeroDivisionError"));
        assert!(fix.contains("x = 1/0"));
        let opt = optimization_prompt("slow", "sort()");
        assert!(opt.contains("PERFORMANCE ISSUE"));
        assert!(opt.contains("sort()"));
    }
}
