//! Episode classification service client.
//!
//! Talks to an OpenAI-compatible chat completion endpoint (DeepSeek by
//! default). One request carries every filename of one show folder so the
//! model can infer a consistent title and monotonic episode numbering.
//!
//! Every call resolves to a [`CallOutcome`]; the caller decides retry and
//! fallback from the outcome kind alone.

use crate::models::config::ClassifierConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// A batch classification request for one show folder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyRequest {
    /// Show folder name, used as context.
    pub show_folder: String,
    /// Filenames in request order.
    pub filenames: Vec<String>,
}

/// One guess as returned by the service, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawGuess {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub season: Option<i64>,
    #[serde(default)]
    pub episode: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Explicit "could not determine" marker.
    #[serde(default)]
    pub undetermined: bool,
}

/// Parsed response, one guess per requested filename, in request order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClassifyResponse {
    pub guesses: Vec<RawGuess>,
}

/// Structured result of one classification call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(ClassifyResponse),
    Timeout,
    Transport(String),
    RateLimited { retry_after: Option<Duration> },
    Unauthorized(String),
    /// The service refused the request for a reason retrying will not fix.
    Unavailable(String),
    Malformed(String),
}

impl CallOutcome {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CallOutcome::Timeout | CallOutcome::Transport(_) | CallOutcome::RateLimited { .. }
        )
    }

    /// Short description for logs and reports.
    pub fn describe(&self) -> String {
        match self {
            CallOutcome::Success(resp) => format!("ok ({} guesses)", resp.guesses.len()),
            CallOutcome::Timeout => "request timed out".to_string(),
            CallOutcome::Transport(msg) => format!("transport error: {}", msg),
            CallOutcome::RateLimited { .. } => "rate limited".to_string(),
            CallOutcome::Unauthorized(msg) => format!("unauthorized: {}", msg),
            CallOutcome::Unavailable(msg) => format!("service unavailable: {}", msg),
            CallOutcome::Malformed(msg) => format!("malformed response: {}", msg),
        }
    }
}

/// Anything that can classify a batch of filenames.
///
/// Implemented by [`ClassifierClient`] for the real service and by canned
/// classifiers in tests.
pub trait Classifier: Sync {
    /// Classify one show folder's filenames.
    fn classify(&self, request: &ClassifyRequest) -> impl Future<Output = CallOutcome> + Send;
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

const SYSTEM_PROMPT: &str = r#"You label TV episode files. Reply with ONLY a JSON object:
{"guesses": [{"filename": "...", "title": "Clean series name", "year": 2023 or null, "season": 1, "episode": 1, "confidence": 0.0-1.0}]}
Rules:
- Exactly one guess per input filename, in the same order.
- title is the series name without release-group tags, resolution or codec info.
- Use season 0 for specials and OVAs; assume season 1 when no season is visible.
- Prefer absolute numbering when the folder has no season structure.
- If the episode number cannot be determined, reply {"filename": "...", "undetermined": true} for that file."#;

/// Classification service client.
pub struct ClassifierClient {
    config: ClassifierConfig,
    client: reqwest::Client,
}

impl ClassifierClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Check whether the service answers at all.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        let mut req = self.client.get(&url);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Build the user prompt for a request.
    fn generate_prompt(request: &ClassifyRequest) -> String {
        let mut prompt = format!("Show folder: {}\nFiles:\n", request.show_folder);
        for (idx, name) in request.filenames.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", idx + 1, name));
        }
        prompt
    }

    async fn send(&self, request: &ClassifyRequest) -> CallOutcome {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return CallOutcome::Unauthorized("no API key configured".to_string());
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::generate_prompt(request),
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
            temperature: 0.0,
        };

        let resp = match self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return CallOutcome::Timeout,
            Err(e) => return CallOutcome::Transport(e.to_string()),
        };

        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        if let Some(outcome) = outcome_for_status(resp.status(), retry_after) {
            return outcome;
        }

        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) if e.is_timeout() => return CallOutcome::Timeout,
            Err(e) => return CallOutcome::Transport(e.to_string()),
        };

        let chat: ChatResponse = match serde_json::from_str(&text) {
            Ok(chat) => chat,
            Err(e) => return CallOutcome::Malformed(format!("invalid completion body: {}", e)),
        };
        let Some(choice) = chat.choices.into_iter().next() else {
            return CallOutcome::Malformed("completion has no choices".to_string());
        };

        tracing::debug!("Classifier response for {}: {}", request.show_folder, choice.message.content);

        match parse_guesses(&choice.message.content, request) {
            Ok(parsed) => CallOutcome::Success(parsed),
            Err(reason) => CallOutcome::Malformed(reason),
        }
    }
}

impl Classifier for ClassifierClient {
    fn classify(&self, request: &ClassifyRequest) -> impl Future<Output = CallOutcome> + Send {
        self.send(request)
    }
}

/// Parse the model's JSON content into guesses and check it answers `request`.
///
/// Tolerates a Markdown code fence around the JSON. Fails when the JSON is
/// invalid or the number of guesses differs from the number of filenames.
pub fn parse_guesses(content: &str, request: &ClassifyRequest) -> std::result::Result<ClassifyResponse, String> {
    let trimmed = strip_code_fence(content);
    let parsed: ClassifyResponse =
        serde_json::from_str(trimmed).map_err(|e| format!("invalid guesses JSON: {}", e))?;

    if parsed.guesses.len() != request.filenames.len() {
        return Err(format!(
            "expected {} guesses, got {}",
            request.filenames.len(),
            parsed.guesses.len()
        ));
    }

    for (idx, (guess, expected)) in parsed.guesses.iter().zip(&request.filenames).enumerate() {
        if let Some(name) = &guess.filename {
            if name != expected {
                return Err(format!(
                    "guess {} is for '{}' but request position holds '{}'",
                    idx + 1,
                    name,
                    expected
                ));
            }
        }
    }

    Ok(parsed)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Outcome of a non-success HTTP status; `None` for success.
fn outcome_for_status(
    status: reqwest::StatusCode,
    retry_after: Option<Duration>,
) -> Option<CallOutcome> {
    use reqwest::StatusCode;

    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => CallOutcome::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CallOutcome::Unauthorized(format!("HTTP {}", status))
        }
        s if s.is_server_error() => CallOutcome::Transport(format!("HTTP {}", status)),
        _ => CallOutcome::Unavailable(format!("HTTP {}", status)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ClassifyRequest {
        ClassifyRequest {
            show_folder: "[SubsPlease] Sousou no Frieren".to_string(),
            filenames: vec![
                "Sousou_no_Frieren_[01].mkv".to_string(),
                "Sousou_no_Frieren_[02].mkv".to_string(),
            ],
        }
    }

    #[test]
    fn test_outcome_for_status() {
        use reqwest::StatusCode;

        assert_eq!(outcome_for_status(StatusCode::OK, None), None);
        let wait = Some(Duration::from_secs(3));
        assert_eq!(
            outcome_for_status(StatusCode::TOO_MANY_REQUESTS, wait),
            Some(CallOutcome::RateLimited { retry_after: wait })
        );
        assert!(matches!(
            outcome_for_status(StatusCode::FORBIDDEN, None),
            Some(CallOutcome::Unauthorized(_))
        ));
        assert!(matches!(
            outcome_for_status(StatusCode::BAD_GATEWAY, None),
            Some(CallOutcome::Transport(_))
        ));

        let not_found = outcome_for_status(StatusCode::NOT_FOUND, None).unwrap();
        assert_eq!(not_found, CallOutcome::Unavailable("HTTP 404 Not Found".to_string()));
        assert!(!not_found.is_retryable());
        assert!(matches!(
            outcome_for_status(StatusCode::BAD_REQUEST, None),
            Some(CallOutcome::Unavailable(_))
        ));
    }

    #[test]
    fn test_parse_guesses_valid() {
        let content = r#"{"guesses": [
            {"filename": "Sousou_no_Frieren_[01].mkv", "title": "Sousou no Frieren", "year": 2023, "season": 1, "episode": 1, "confidence": 0.95},
            {"filename": "Sousou_no_Frieren_[02].mkv", "undetermined": true}
        ]}"#;
        let parsed = parse_guesses(content, &request()).unwrap();
        assert_eq!(parsed.guesses.len(), 2);
        assert_eq!(parsed.guesses[0].episode, Some(1));
        assert!(parsed.guesses[1].undetermined);
    }

    #[test]
    fn test_parse_guesses_code_fence() {
        let content = "```json\n{\"guesses\": [{\"episode\": 1}, {\"episode\": 2}]}\n```";
        let parsed = parse_guesses(content, &request()).unwrap();
        assert_eq!(parsed.guesses[1].episode, Some(2));
    }

    #[test]
    fn test_parse_guesses_wrong_count() {
        let content = r#"{"guesses": [{"episode": 1}]}"#;
        let err = parse_guesses(content, &request()).unwrap_err();
        assert!(err.contains("expected 2 guesses"));
    }

    #[test]
    fn test_parse_guesses_reordered() {
        let content = r#"{"guesses": [
            {"filename": "Sousou_no_Frieren_[02].mkv", "episode": 2},
            {"filename": "Sousou_no_Frieren_[01].mkv", "episode": 1}
        ]}"#;
        assert!(parse_guesses(content, &request()).is_err());
    }

    #[test]
    fn test_parse_guesses_not_json() {
        assert!(parse_guesses("Sure! Here are your episodes.", &request()).is_err());
    }

    #[test]
    fn test_outcome_retryable() {
        assert!(CallOutcome::Timeout.is_retryable());
        assert!(CallOutcome::Transport("reset".into()).is_retryable());
        assert!(CallOutcome::RateLimited { retry_after: None }.is_retryable());
        assert!(!CallOutcome::Unauthorized("401".into()).is_retryable());
        assert!(!CallOutcome::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn test_generate_prompt_lists_files_in_order() {
        let prompt = ClassifierClient::generate_prompt(&request());
        let first = prompt.find("[01]").unwrap();
        let second = prompt.find("[02]").unwrap();
        assert!(prompt.contains("Show folder: [SubsPlease] Sousou no Frieren"));
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unauthorized() {
        let client = ClassifierClient::new(ClassifierConfig::default()).unwrap();
        let outcome = client.classify(&request()).await;
        assert!(matches!(outcome, CallOutcome::Unauthorized(_)));
    }
}
