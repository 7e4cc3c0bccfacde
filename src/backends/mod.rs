//! Concrete adapters behind the `ports` traits.

pub mod fs_store;
pub mod http_ocr;
pub mod ollama;
pub mod stub;

pub use fs_store::FsObjectStore;
pub use http_ocr::HttpOcrClient;
pub use ollama::OllamaClient;
