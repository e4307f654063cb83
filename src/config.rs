use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// OCR 提供方
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrProvider {
    /// 固定返回占位结果，不发起网络请求
    Stub,
    /// Mathpix 识别服务
    Mathpix,
}

impl OcrProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            OcrProvider::Stub => "stub",
            OcrProvider::Mathpix => "mathpix",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stub" => Some(OcrProvider::Stub),
            "mathpix" => Some(OcrProvider::Mathpix),
            _ => None,
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 监听地址
    pub server_host: String,
    /// 监听端口
    pub server_port: u16,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    /// 单次模型调用超时（秒）
    pub llm_timeout_secs: u64,
    // --- OCR 配置 ---
    pub ocr_provider: OcrProvider,
    pub mathpix_app_id: String,
    pub mathpix_app_key: String,
    pub mathpix_api_base_url: String,
    /// 单次 OCR 调用超时（秒）
    pub ocr_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 9002,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.3,
            llm_max_tokens: 2048,
            llm_timeout_secs: 60,
            ocr_provider: OcrProvider::Stub,
            mathpix_app_id: String::new(),
            mathpix_app_key: String::new(),
            mathpix_api_base_url: "https://api.mathpix.com/v3".to_string(),
            ocr_timeout_secs: 30,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// 仅从环境变量加载（未设置的项使用默认值）
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 先读取可选的 TOML 配置文件，再叠加环境变量
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 解析 TOML 配置文件
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    fn from_toml_str(content: &str, path: &str) -> AppResult<Self> {
        let config = toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_string(),
            source,
        })?;
        Ok(config)
    }

    fn with_env_overrides(self) -> Self {
        Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or(self.server_host),
            server_port: env_parse("SERVER_PORT").unwrap_or(self.server_port),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE").unwrap_or(self.llm_temperature),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(self.llm_max_tokens),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or(self.llm_timeout_secs),
            ocr_provider: std::env::var("OCR_PROVIDER")
                .ok()
                .and_then(|v| OcrProvider::parse(&v))
                .unwrap_or(self.ocr_provider),
            mathpix_app_id: std::env::var("MATHPIX_APP_ID").unwrap_or(self.mathpix_app_id),
            mathpix_app_key: std::env::var("MATHPIX_APP_KEY").unwrap_or(self.mathpix_app_key),
            mathpix_api_base_url: std::env::var("MATHPIX_API_BASE_URL")
                .unwrap_or(self.mathpix_api_base_url),
            ocr_timeout_secs: env_parse("OCR_TIMEOUT_SECS").unwrap_or(self.ocr_timeout_secs),
        }
    }

    /// 校验配置项之间的约束
    pub fn validate(&self) -> AppResult<()> {
        if self.ocr_provider == OcrProvider::Mathpix {
            for (name, value) in [
                ("mathpix_app_id", &self.mathpix_app_id),
                ("mathpix_app_key", &self.mathpix_app_key),
            ] {
                if value.is_empty() {
                    return Err(ConfigError::MissingValue {
                        name: name.to_string(),
                        provider: self.ocr_provider.as_str().to_string(),
                    }
                    .into());
                }
            }
        }
        for (name, secs) in [
            ("llm_timeout_secs", self.llm_timeout_secs),
            ("ocr_timeout_secs", self.ocr_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    value: secs.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    /// 监听地址，形如 `127.0.0.1:9002`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
