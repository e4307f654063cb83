use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误
    #[error("输入错误: {0}")]
    Input(#[from] InputError),
    /// OCR 服务错误
    #[error("OCR错误: {0}")]
    Ocr(#[from] OcrError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 会话状态错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 输入校验错误
#[derive(Debug, Error)]
pub enum InputError {
    /// 既没有文本也没有图片
    #[error("no math problem provided")]
    MissingProblem,
    /// 图片 data URI 格式错误
    #[error("图片格式无效: {reason}")]
    InvalidImage { reason: String },
    /// 追问内容为空
    #[error("追问内容不能为空")]
    EmptyQuestion,
}

/// OCR 服务错误
#[derive(Debug, Error)]
pub enum OcrError {
    /// 网络请求失败
    #[error("OCR请求失败 ({provider}): {source}")]
    RequestFailed {
        provider: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 服务返回错误响应
    #[error("OCR返回错误响应 ({provider}): status={status:?}, message={message}")]
    BadResponse {
        provider: String,
        status: Option<u16>,
        message: String,
    },
    /// 请求超时
    #[error("OCR请求超时 ({provider}): 超过 {secs} 秒")]
    Timeout { provider: String, secs: u64 },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 返回内容不符合输出结构
    #[error("无法解析LLM输出 (模板: {template}, 响应: {response}): {source}")]
    OutputParseFailed {
        template: String,
        response: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求超时
    #[error("LLM请求超时 (模型: {model}): 超过 {secs} 秒")]
    Timeout { model: String, secs: u64 },
    /// 模板渲染失败
    #[error("模板 {template} 渲染失败: 缺少字段 {field}")]
    TemplateRender { template: String, field: String },
    /// 模板不存在
    #[error("模板不存在: {template}")]
    UnknownTemplate { template: String },
}

/// 会话状态错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 已有请求在处理中
    #[error("会话 {session_id} 正在处理另一个请求")]
    Busy { session_id: String },
    /// 尚未解题，不能追问
    #[error("Solve a problem first before asking a follow-up.")]
    NoSolution,
    /// 会话不存在
    #[error("会话不存在: {session_id}")]
    NotFound { session_id: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置项缺失
    #[error("缺少配置项 {name} (OCR 提供方: {provider})")]
    MissingValue { name: String, provider: String },
    /// 配置项取值非法
    #[error("配置项 {name} 取值非法: {value}")]
    InvalidValue { name: String, value: String },
}

/// 对外暴露的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    InvalidInput,
    ModelOutput,
    ModelTimeout,
    OcrTimeout,
    Provider,
    SessionConflict,
    NotFound,
    Config,
}

impl AppError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Input(InputError::MissingProblem) => ErrorKind::MissingInput,
            AppError::Input(InputError::InvalidImage { .. } | InputError::EmptyQuestion) => {
                ErrorKind::InvalidInput
            }
            AppError::Ocr(OcrError::Timeout { .. }) => ErrorKind::OcrTimeout,
            AppError::Ocr(_) => ErrorKind::Provider,
            AppError::Llm(LlmError::EmptyResponse { .. } | LlmError::OutputParseFailed { .. }) => {
                ErrorKind::ModelOutput
            }
            AppError::Llm(LlmError::Timeout { .. }) => ErrorKind::ModelTimeout,
            AppError::Llm(_) => ErrorKind::Provider,
            AppError::Session(SessionError::NotFound { .. }) => ErrorKind::NotFound,
            AppError::Session(_) => ErrorKind::SessionConflict,
            AppError::Config(_) => ErrorKind::Config,
        }
    }

    /// 面向用户的提示信息
    ///
    /// 输入与会话类错误直接展示，外部服务错误只给出概要
    pub fn user_message(&self) -> String {
        match self {
            AppError::Input(e) => e.to_string(),
            AppError::Session(e) => e.to_string(),
            AppError::Llm(LlmError::Timeout { .. }) | AppError::Ocr(OcrError::Timeout { .. }) => {
                "The request timed out. Please try again.".to_string()
            }
            AppError::Llm(LlmError::EmptyResponse { .. } | LlmError::OutputParseFailed { .. }) => {
                "The model did not return a usable answer.".to_string()
            }
            AppError::Ocr(_) => "Failed to read the math problem from the image.".to_string(),
            AppError::Llm(_) => "Failed to reach the model service.".to_string(),
            AppError::Config(e) => e.to_string(),
        }
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建图片格式错误
    pub fn invalid_image(reason: impl Into<String>) -> Self {
        AppError::Input(InputError::InvalidImage {
            reason: reason.into(),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建OCR请求失败错误
    pub fn ocr_request_failed(
        provider: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Ocr(OcrError::RequestFailed {
            provider: provider.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
