//! 追问流程 - 流程层
//!
//! 追问 + 上一次解答 → 导师模板 → 模型 → `{ answer }`

use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::{FollowUpRequest, FollowUpResult};
use crate::services::{prompt, LlmService};
use crate::utils::logging::truncate_text;

/// 追问流程
///
/// 不校验 `previous_solution` 是否为空，空上下文照常转发给模型
#[derive(Clone)]
pub struct FollowUpAnswerer {
    llm: LlmService,
}

impl FollowUpAnswerer {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(LlmService::from_config(config))
    }

    /// 回答追问
    pub async fn answer(&self, request: &FollowUpRequest) -> AppResult<FollowUpResult> {
        if request.previous_solution.is_empty() {
            warn!("⚠️ 追问时没有上一次的解答，模型将在空上下文中回答");
        }

        info!("💬 追问: {}", truncate_text(&request.question, 80));

        let result: FollowUpResult = self
            .llm
            .run(prompt::ANSWER_FOLLOW_UP.id, request)
            .await?;

        info!("✓ 追问回答完成，长度: {} 字符", result.answer.len());

        Ok(result)
    }
}
