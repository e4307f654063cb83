//! 解题流程 - 流程层
//!
//! 流程顺序：
//! 1. 有非空文本 → 直接作为题目
//! 2. 否则有图片 → OCR 识别结果作为题目
//! 3. 都没有 → MissingProblem
//! 4. 题目填入解题模板 → 模型 → `{ solution }`

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppResult, InputError};
use crate::models::{ProblemRequest, SolutionResult};
use crate::services::{prompt, LlmService, OcrService};
use crate::utils::logging::truncate_text;

/// 解题模板的输入
#[derive(Debug, Serialize)]
struct SolvePromptInput<'a> {
    problem: &'a str,
}

/// 题目来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemSource {
    Text,
    Image,
}

/// 解题流程
///
/// - 不重试，不做后处理
/// - 不持有任何会话状态
#[derive(Clone)]
pub struct ProblemSolver {
    ocr: OcrService,
    llm: LlmService,
}

impl ProblemSolver {
    pub fn new(ocr: OcrService, llm: LlmService) -> Self {
        Self { ocr, llm }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(OcrService::from_config(config), LlmService::from_config(config))
    }

    /// 把请求归一为一条题目文本
    ///
    /// 文本原样使用（不做 trim）；只有在没有文本时才调用 OCR
    pub async fn resolve_problem(
        &self,
        request: &ProblemRequest,
    ) -> AppResult<(String, ProblemSource)> {
        if let Some(text) = request.text() {
            if request.image().is_some() {
                debug!("同时提供了文本和图片，忽略图片");
            }
            return Ok((text.to_string(), ProblemSource::Text));
        }

        let image = request.image().ok_or(InputError::MissingProblem)?;

        info!("🖼️ 题目来自图片，调用 OCR ({})", self.ocr.provider_name());
        let ocr = self.ocr.extract(image).await?;
        if ocr.latex.is_empty() {
            return Err(InputError::MissingProblem.into());
        }

        Ok((ocr.latex, ProblemSource::Image))
    }

    /// 解题
    pub async fn solve(&self, request: &ProblemRequest) -> AppResult<SolutionResult> {
        let (problem, source) = self.resolve_problem(request).await?;

        info!(
            "🧮 开始解题 (来源: {:?}, 模型: {}): {}",
            source,
            self.llm.model_name(),
            truncate_text(&problem, 80)
        );

        let result: SolutionResult = self
            .llm
            .run(
                prompt::SOLVE_MATH_PROBLEM.id,
                &SolvePromptInput { problem: &problem },
            )
            .await?;

        info!("✓ 解题完成，解答长度: {} 字符", result.solution.len());

        Ok(result)
    }
}
