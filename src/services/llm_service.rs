//! LLM 服务 - 业务能力层
//!
//! 只负责"模板 + 输入 → 结构化输出"，不关心流程。
//! 具体模型由 `GenerativeModel` 提供，可替换为任意兼容实现。

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::clients::{GenerativeModel, ModelRequest, OpenAiModel};
use crate::config::Config;
use crate::error::{AppResult, LlmError};
use crate::services::prompt;

/// LLM 服务
///
/// 职责：
/// - 按模板 ID 渲染提示词
/// - 附带输出结构说明调用模型
/// - 把原始输出解析为调用方声明的类型
/// - 单次调用受超时约束，不重试
#[derive(Clone)]
pub struct LlmService {
    model: Arc<dyn GenerativeModel>,
    timeout: Duration,
}

impl LlmService {
    pub fn new(model: Arc<dyn GenerativeModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// 使用 OpenAI 兼容客户端创建
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(OpenAiModel::new(config)), config.llm_timeout())
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// 执行一个模板
    ///
    /// # 参数
    /// - `template_id`: 模板 ID
    /// - `input`: 输入结构体，字段名对应模板插槽
    ///
    /// # 返回
    /// 解析后的输出结构体
    pub async fn run<I, O>(&self, template_id: &str, input: &I) -> AppResult<O>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        let template = prompt::lookup(template_id)?;

        let request = ModelRequest {
            template_id: template.id.to_string(),
            system: template.output_instruction(),
            prompt: template.render(input)?,
        };

        debug!(
            "执行模板 {}，模型: {}，提示词长度: {} 字符",
            template.id,
            self.model.model_name(),
            request.prompt.len()
        );

        let raw = tokio::time::timeout(self.timeout, self.model.generate(&request))
            .await
            .map_err(|_| {
                warn!(
                    "模板 {} 调用超时 ({} 秒)",
                    template.id,
                    self.timeout.as_secs()
                );
                LlmError::Timeout {
                    model: self.model.model_name().to_string(),
                    secs: self.timeout.as_secs(),
                }
            })??;

        template.parse_output(&raw).map_err(|e| {
            warn!("模板 {} 输出无法解析: {}", template.id, e);
            e
        })
    }
}
