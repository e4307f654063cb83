//! 图片 data URI 解析
//!
//! 形如 `data:image/png;base64,iVBORw0KGgo...`

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;

use crate::error::{AppError, AppResult};

const DATA_URI_PATTERN: &str =
    r"(?s)^data:([A-Za-z0-9!#_.+-]+/[A-Za-z0-9!#_.+-]+)((?:;[^;,]*)*?);base64,(.*)$";

/// 已校验的图片 data URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime_type: String,
    payload: String,
    byte_len: usize,
}

impl DataUri {
    /// 解析并校验 data URI
    ///
    /// 要求带 MIME 类型（且为 `image/*`）、`;base64` 标记以及非空的合法 base64 内容
    pub fn parse(input: &str) -> AppResult<Self> {
        let re = Regex::new(DATA_URI_PATTERN).map_err(|e| AppError::invalid_image(e.to_string()))?;

        let caps = re
            .captures(input.trim())
            .ok_or_else(|| AppError::invalid_image("不是 base64 编码的 data URI"))?;

        let mime_type = caps[1].to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(AppError::invalid_image(format!(
                "MIME 类型不是图片: {}",
                mime_type
            )));
        }

        let payload: String = caps[3].chars().filter(|c| !c.is_whitespace()).collect();
        if payload.is_empty() {
            return Err(AppError::invalid_image("图片内容为空"));
        }

        let bytes = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| AppError::invalid_image(format!("base64 解码失败: {}", e)))?;

        Ok(Self {
            mime_type,
            payload,
            byte_len: bytes.len(),
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// 解码后的字节数
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// 规范化后的 data URI 字符串
    pub fn to_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.payload)
    }
}
