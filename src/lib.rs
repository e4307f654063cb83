//! # MathVision
//!
//! 拍照或输入数学题，返回分步讲解，并支持围绕解答继续追问。
//!
//! ## 架构设计
//!
//! ### ① 外部服务层（Clients）
//! - `clients/` - 生成式模型与 OCR 提供方，只暴露"发一次请求"的能力
//! - `GenerativeModel` / `OpenAiModel` - 模型调用
//! - `MathOcr` / `StubOcr` / `MathpixClient` - 图片公式识别
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `prompt` - 提示词模板注册表、渲染与输出解析
//! - `LlmService` - 模板 + 输入 → 结构化输出
//! - `OcrService` - data URI 校验 + 识别
//!
//! ### ③ 流程层（Workflow）
//! - `ProblemSolver` - 文本/图片 → 题目 → 解答
//! - `FollowUpAnswerer` - 追问 + 上一次解答 → 回答
//!
//! ### ④ 展示层（Session / Server）
//! - `session/` - 会话状态机与会话表
//! - `server/` - HTTP 接口与单页表单
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod session;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use models::{ChatRole, ChatTurn, FollowUpRequest, FollowUpResult, ProblemRequest, SolutionResult};
pub use server::{router, App, AppState};
pub use session::{SessionPhase, SessionState, SessionStore};
pub use workflow::{FollowUpAnswerer, ProblemSolver};
