use serde::{Deserialize, Serialize};

/// 解题请求
///
/// 文本与图片二选一；同时提供时以文本为准
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_text: Option<String>,
    /// `data:<mimetype>;base64,<encoded_data>` 形式的图片
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_image: Option<String>,
}

impl ProblemRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            problem_text: Some(text.into()),
            problem_image: None,
        }
    }

    pub fn from_image(data_uri: impl Into<String>) -> Self {
        Self {
            problem_text: None,
            problem_image: Some(data_uri.into()),
        }
    }

    /// 非空白的题目文本
    ///
    /// 比"非空"更严格：只含空白的文本也视为未提供（不会把 `"  "` 发给模型，
    /// 有图片时改走 OCR）。返回的文本本身不做 trim。
    pub fn text(&self) -> Option<&str> {
        self.problem_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    /// 非空的图片 data URI
    pub fn image(&self) -> Option<&str> {
        self.problem_image.as_deref().filter(|i| !i.is_empty())
    }

    /// 是否至少提供了一种题目来源
    pub fn has_input(&self) -> bool {
        self.text().is_some() || self.image().is_some()
    }
}

/// 解题结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionResult {
    pub solution: String,
}

/// 追问请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    pub question: String,
    /// 最近一次的解题结果
    pub previous_solution: String,
}

/// 追问结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpResult {
    pub answer: String,
}

/// OCR 识别结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResult {
    pub latex: String,
}
