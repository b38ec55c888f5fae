use std::time::Duration;

use alexandrea_adapters::{AdapterError, OllamaGateway};
use alexandrea_core::{collect_fragments, GatewayConfig, GatewayError, GenerationRequest, ModelGateway};
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    runtime: Runtime,
}

impl Harness {
    fn start() -> Self {
        let runtime = Runtime::new().expect("tokio runtime");
        let server = runtime.block_on(MockServer::start());
        let harness = Self { server, runtime };
        harness.mount(
            Mock::given(method("GET"))
                .and(path("/api/version"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "0.3.12"}))),
        );
        harness
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: format!("{}/v1", self.server.uri()),
            ..GatewayConfig::default()
        }
    }
}

fn request(stream: bool) -> GenerationRequest {
    let request = GenerationRequest::new("Tell me about scrolls", "mistral", 64, 0.2).unwrap();
    if stream {
        request.streaming()
    } else {
        request
    }
}

#[test]
fn connect_reports_version_and_normalises_base_url() {
    let harness = Harness::start();
    let gateway = OllamaGateway::connect(&harness.config()).unwrap();
    assert_eq!(gateway.version(), "0.3.12");
    assert_eq!(gateway.base_url(), harness.server.uri());
}

#[test]
fn connect_fails_fast_when_service_is_down() {
    let config = GatewayConfig {
        base_url: "http://127.0.0.1:1".into(),
        connect_timeout_secs: 1,
        ..GatewayConfig::default()
    };
    let err = OllamaGateway::connect(&config).err().expect("connect should fail");
    assert!(matches!(err, AdapterError::Unreachable { ref url, .. } if url == "http://127.0.0.1:1"));
}

#[test]
fn complete_sends_wire_body_and_returns_text() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "mistral",
                "prompt": "Tell me about scrolls",
                "stream": false,
                "options": {"num_predict": 64}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"model": "mistral", "response": "Papyrus.", "done": true})),
            )
            .expect(1),
    );

    let gateway = OllamaGateway::connect(&harness.config()).unwrap();
    let request = request(false);
    let result = gateway.complete(&request).unwrap();
    assert_eq!(result.text, "Papyrus.");
    assert_eq!(result.char_count, 8);
    assert_eq!(result.request_id, request.id());
}

#[test]
fn non_success_status_carries_raw_body() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"error\":\"model not found\"}")),
    );

    let gateway = OllamaGateway::connect(&harness.config()).unwrap();
    assert_eq!(
        gateway.complete(&request(false)).unwrap_err(),
        GatewayError::Status {
            status: 404,
            body: "{\"error\":\"model not found\"}".into()
        }
    );
}

#[test]
fn missing_response_field_is_a_decode_error() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true}))),
    );

    let gateway = OllamaGateway::connect(&harness.config()).unwrap();
    assert!(matches!(
        gateway.complete(&request(false)).unwrap_err(),
        GatewayError::Decode(_)
    ));
}

#[test]
fn streamed_fragments_concatenate_to_full_text() {
    let harness = Harness::start();
    let body = concat!(
        "{\"response\":\"Pap\",\"done\":false}\n",
        "garbage line\n",
        "{\"response\":\"yrus.\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":true}\n",
    );
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(body)),
    );

    let gateway = OllamaGateway::connect(&harness.config()).unwrap();
    let request = request(true);
    let fragments = gateway.stream(&request).unwrap();
    let result = collect_fragments(&request, fragments).unwrap();
    assert_eq!(result.text, "Papyrus.");
}

#[test]
fn generate_dispatches_on_stream_flag() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"response\":\"s\",\"done\":true}\n")),
    );
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "c"}))),
    );

    let gateway = OllamaGateway::connect(&harness.config()).unwrap();
    assert!(matches!(
        gateway.generate(&request(true)).unwrap(),
        alexandrea_core::Generation::Streaming(_)
    ));
    match gateway.generate(&request(false)).unwrap() {
        alexandrea_core::Generation::Complete(result) => assert_eq!(result.text, "c"),
        other => panic!("expected complete result, got {other:?}"),
    }
}

#[test]
fn list_models_reads_tags_and_degrades_to_empty() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "llama3:8b"}, {"name": "mistral:latest"}]
            })))
            .up_to_n_times(1),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(500)),
    );

    let gateway = OllamaGateway::connect(&harness.config()).unwrap();
    assert_eq!(gateway.list_models(), vec!["llama3:8b", "mistral:latest"]);
    assert!(gateway.list_models().is_empty());
}

#[test]
fn slow_responses_time_out() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "late"}))
                    .set_delay(Duration::from_secs(3)),
            ),
    );

    let config = GatewayConfig {
        timeout_secs: 1,
        ..harness.config()
    };
    let gateway = OllamaGateway::connect(&config).unwrap();
    assert_eq!(gateway.complete(&request(false)).unwrap_err(), GatewayError::Timeout);
}
