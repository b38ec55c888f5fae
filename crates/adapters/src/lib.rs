mod base_url;
mod error;
mod ollama;

pub use base_url::normalize_base_url;
pub use error::AdapterError;
pub use ollama::OllamaGateway;
