pub mod ollama;

pub use ollama::OllamaModule;
