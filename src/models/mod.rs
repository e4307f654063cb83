pub mod chat;
pub mod data_uri;
pub mod problem;

pub use chat::{ChatRole, ChatTurn};
pub use data_uri::DataUri;
pub use problem::{FollowUpRequest, FollowUpResult, OcrResult, ProblemRequest, SolutionResult};
