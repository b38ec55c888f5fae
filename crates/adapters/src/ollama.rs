use std::io::{BufRead, BufReader, Read};
use std::time::{Duration, Instant};

use alexandrea_core::{
    FragmentStream, GatewayConfig, GatewayError, GenerationRequest, GenerationResult,
    ModelGateway,
};
use log::{debug, info, warn};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::base_url::{normalize_base_url, validate_base_url};
use crate::error::{read_error, AdapterError};

/// Blocking client for the native Ollama HTTP API.
pub struct OllamaGateway {
    client: Client,
    base_url: String,
    version: String,
}

impl OllamaGateway {
    /// Builds the client and probes `/api/version`. Fails when the service
    /// cannot be reached.
    pub fn connect(config: &GatewayConfig) -> Result<Self, AdapterError> {
        let base_url = normalize_base_url(&config.base_url);
        validate_base_url(&base_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .build()?;

        let version = probe_version(&client, &base_url)
            .map_err(|err| AdapterError::unreachable(base_url.clone(), err))?;
        info!("connected to model service at {base_url} (version {version})");

        Ok(Self {
            client,
            base_url,
            version,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send_generate(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<Response, AdapterError> {
        let body = GenerateRequest {
            model: request.model(),
            prompt: request.prompt(),
            stream,
            options: GenerateOptions {
                num_predict: request.max_tokens(),
                temperature: request.temperature(),
            },
        };
        debug!(
            "POST /api/generate request={} model={} stream={stream}",
            request.id(),
            request.model()
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()?;
        ensure_success(response)
    }

    fn fetch_models(&self) -> Result<Vec<String>, AdapterError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()?;
        let tags: TagsResponse = serde_json::from_str(&ensure_success(response)?.text()?)?;
        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }
}

impl ModelGateway for OllamaGateway {
    fn complete(&self, request: &GenerationRequest) -> Result<GenerationResult, GatewayError> {
        let started = Instant::now();
        let response = self.send_generate(request, false)?;
        let parsed: GenerateResponse =
            serde_json::from_str(&response.text().map_err(AdapterError::from)?)
                .map_err(AdapterError::from)?;

        if let Some(error) = parsed.error {
            return Err(GatewayError::Stream(error));
        }
        let text = parsed
            .response
            .ok_or(AdapterError::MissingField("response"))?;
        Ok(GenerationResult::new(request, text, started.elapsed()))
    }

    fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, GatewayError> {
        let response = self.send_generate(request, true)?;
        Ok(Box::new(NdjsonFragments::new(response)))
    }

    fn list_models(&self) -> Vec<String> {
        match self.fetch_models() {
            Ok(models) => models,
            Err(err) => {
                warn!("failed to list models from {}: {err}", self.base_url);
                Vec::new()
            }
        }
    }
}

fn probe_version(client: &Client, base_url: &str) -> Result<String, AdapterError> {
    let response = client.get(format!("{base_url}/api/version")).send()?;
    let parsed: VersionResponse = serde_json::from_str(&ensure_success(response)?.text()?)?;
    Ok(parsed.version)
}

fn ensure_success(response: Response) -> Result<Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(AdapterError::HttpStatus { status, body })
}

/// One fragment per newline-delimited JSON object of a streamed body. Lines
/// are decoded from raw bytes, so invalid UTF-8 is skipped like any other
/// undecodable line.
struct NdjsonFragments<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    finished: bool,
}

impl<R: Read> NdjsonFragments<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
            finished: false,
        }
    }
}

impl<R: Read> Iterator for NdjsonFragments<R> {
    type Item = Result<String, GatewayError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    self.finished = true;
                    return Some(Err(read_error(err)));
                }
            }
            if self.line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let chunk: StreamChunk = match serde_json::from_slice(&self.line) {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!("skipping undecodable stream line: {err}");
                    continue;
                }
            };

            if let Some(error) = chunk.error {
                self.finished = true;
                return Some(Err(GatewayError::Stream(error)));
            }
            if chunk.done {
                self.finished = true;
            }
            if !chunk.response.is_empty() {
                return Some(Ok(chunk.response));
            }
            if self.finished {
                return None;
            }
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fragments(body: &str) -> Vec<Result<String, GatewayError>> {
        NdjsonFragments::new(Cursor::new(body.to_string())).collect()
    }

    fn fragments_from_bytes(body: &[u8]) -> Vec<Result<String, GatewayError>> {
        NdjsonFragments::new(Cursor::new(body.to_vec())).collect()
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let body = concat!(
            "{\"response\":\"Hel\",\"done\":false}\n",
            "\n",
            "not json at all\n",
            "{\"response\":\"lo\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
        );
        let collected: Vec<String> = fragments(body).into_iter().map(Result::unwrap).collect();
        assert_eq!(collected, vec!["Hel", "lo"]);
    }

    #[test]
    fn invalid_utf8_line_is_skipped_not_fatal() {
        let body = b"{\"response\":\"a\"}\n\xff\xfe garbage\n{\"response\":\"b\",\"done\":true}\n";
        assert_eq!(
            fragments_from_bytes(body),
            vec![Ok("a".to_string()), Ok("b".to_string())]
        );
    }

    #[test]
    fn stops_at_done_even_if_more_lines_follow() {
        let body = concat!(
            "{\"response\":\"a\",\"done\":true}\n",
            "{\"response\":\"b\",\"done\":false}\n",
        );
        assert_eq!(fragments(body), vec![Ok("a".to_string())]);
    }

    #[test]
    fn error_line_ends_the_stream() {
        let body = concat!(
            "{\"response\":\"a\",\"done\":false}\n",
            "{\"error\":\"model crashed\"}\n",
            "{\"response\":\"b\",\"done\":false}\n",
        );
        assert_eq!(
            fragments(body),
            vec![
                Ok("a".to_string()),
                Err(GatewayError::Stream("model crashed".into()))
            ]
        );
    }

    #[test]
    fn ends_when_connection_closes_without_done() {
        let body = "{\"response\":\"partial\",\"done\":false}";
        assert_eq!(fragments(body), vec![Ok("partial".to_string())]);
    }
}
