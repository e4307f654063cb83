pub mod llm_client;
pub mod ocr_client;

pub use llm_client::{GenerativeModel, ModelRequest, OpenAiModel};
pub use ocr_client::{MathOcr, MathpixClient, StubOcr};
