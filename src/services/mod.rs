pub mod llm_service;
pub mod ocr_service;
pub mod prompt;

pub use llm_service::LlmService;
pub use ocr_service::OcrService;
pub use prompt::PromptTemplate;
