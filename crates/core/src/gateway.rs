//! Request/result types and the trait every model backend implements.
//!
//! The pipeline only ever talks to a [`ModelGateway`]; the HTTP client lives in
//! the adapters crate so this crate stays free of network code.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidRequest {
    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,
    #[error("temperature must be within [0, 1], got {0}")]
    Temperature(f32),
    #[error("model identifier must not be empty")]
    EmptyModel,
}

/// One downstream call. Fields are private so a built request cannot change.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    id: Uuid,
    prompt: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Self, InvalidRequest> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(InvalidRequest::EmptyModel);
        }
        if max_tokens == 0 {
            return Err(InvalidRequest::ZeroMaxTokens);
        }
        if !(0.0..=1.0).contains(&temperature) {
            return Err(InvalidRequest::Temperature(temperature));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            model,
            max_tokens,
            temperature,
            stream: false,
        })
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn stream(&self) -> bool {
        self.stream
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationResult {
    pub request_id: Uuid,
    pub model: String,
    pub text: String,
    pub elapsed: Duration,
    pub char_count: usize,
}

impl GenerationResult {
    pub fn new(request: &GenerationRequest, text: String, elapsed: Duration) -> Self {
        Self {
            request_id: request.id(),
            model: request.model().to_string(),
            char_count: text.chars().count(),
            text,
            elapsed,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("model service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("failed to decode model response: {0}")]
    Decode(String),
    #[error("model service reported an error: {0}")]
    Stream(String),
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),
}

/// Single-pass sequence of text fragments for one streamed request.
pub type FragmentStream = Box<dyn Iterator<Item = Result<String, GatewayError>> + Send>;

pub enum Generation {
    Complete(GenerationResult),
    Streaming(FragmentStream),
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Complete(result) => f.debug_tuple("Complete").field(result).finish(),
            Generation::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

pub trait ModelGateway: Send + Sync {
    fn complete(&self, request: &GenerationRequest) -> Result<GenerationResult, GatewayError>;

    fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, GatewayError>;

    /// Best effort: implementations return an empty list instead of failing.
    fn list_models(&self) -> Vec<String>;

    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GatewayError> {
        if request.stream() {
            self.stream(request).map(Generation::Streaming)
        } else {
            self.complete(request).map(Generation::Complete)
        }
    }
}

/// Drains a stream, stopping at the first error.
pub fn collect_fragments<I>(
    request: &GenerationRequest,
    fragments: I,
) -> Result<GenerationResult, GatewayError>
where
    I: IntoIterator<Item = Result<String, GatewayError>>,
{
    let started = Instant::now();
    let mut text = String::new();
    for fragment in fragments {
        text.push_str(&fragment?);
    }
    Ok(GenerationResult::new(request, text, started.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_parameters() {
        assert_eq!(
            GenerationRequest::new("p", "mistral", 0, 0.5).unwrap_err(),
            InvalidRequest::ZeroMaxTokens
        );
        assert_eq!(
            GenerationRequest::new("p", "mistral", 10, 1.5).unwrap_err(),
            InvalidRequest::Temperature(1.5)
        );
        assert!(GenerationRequest::new("p", "mistral", 10, f32::NAN).is_err());
        assert_eq!(
            GenerationRequest::new("p", " ", 10, 0.5).unwrap_err(),
            InvalidRequest::EmptyModel
        );
    }

    #[test]
    fn result_counts_characters_not_bytes() {
        let request = GenerationRequest::new("p", "mistral", 10, 0.5).unwrap();
        let result = GenerationResult::new(&request, "héllo".into(), Duration::ZERO);
        assert_eq!(result.char_count, 5);
        assert_eq!(result.request_id, request.id());
        assert_eq!(result.model, "mistral");
    }

    #[test]
    fn collect_concatenates_and_stops_on_error() {
        let request = GenerationRequest::new("p", "mistral", 10, 0.5)
            .unwrap()
            .streaming();
        assert!(request.stream());

        let ok: FragmentStream = Box::new(vec![Ok("Hel".to_string()), Ok("lo".into())].into_iter());
        assert_eq!(collect_fragments(&request, ok).unwrap().text, "Hello");

        let failing: FragmentStream = Box::new(
            vec![
                Ok("Hel".to_string()),
                Err(GatewayError::Stream("boom".into())),
                Ok("lo".into()),
            ]
            .into_iter(),
        );
        assert_eq!(
            collect_fragments(&request, failing).unwrap_err(),
            GatewayError::Stream("boom".into())
        );
    }
}
