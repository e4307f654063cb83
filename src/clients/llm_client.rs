//! 生成式模型客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};

/// 发给模型的一次请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// 模板 ID（仅用于日志和错误信息）
    pub template_id: String,
    /// 系统消息：输出结构说明
    pub system: String,
    /// 用户消息：渲染后的提示词
    pub prompt: String,
}

/// 生成式模型
///
/// 只负责"发一次请求、拿回原始文本"，不关心模板与输出结构
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, request: &ModelRequest) -> AppResult<String>;
}

/// OpenAI 兼容的模型客户端
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiModel {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }
}

#[async_trait]
impl GenerativeModel for OpenAiModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, request: &ModelRequest) -> AppResult<String> {
        debug!(
            "调用 LLM API，模型: {}，模板: {}",
            self.model_name, request.template_id
        );
        debug!("用户消息长度: {} 字符", request.prompt.len());

        let model = self.model_name.as_str();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system.as_str())
            .build()
            .map_err(|e| AppError::llm_api_failed(model, e))?;

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.as_str())
            .build()
            .map_err(|e| AppError::llm_api_failed(model, e))?;

        let messages = vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| AppError::llm_api_failed(model, e))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(model, e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::EmptyResponse {
                model: self.model_name.clone(),
            })?;

        Ok(content)
    }
}
