//! 图片公式识别（OCR）客户端

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, OcrError};
use crate::models::{DataUri, OcrResult};

/// 占位识别结果
pub const STUB_LATEX: &str = "\\frac{1}{2}x + 3 = 5";

/// 公式识别能力
#[async_trait]
pub trait MathOcr: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn recognize(&self, image: &DataUri) -> AppResult<OcrResult>;
}

/// 占位实现：不发起网络请求，总是返回固定公式
#[derive(Debug, Default)]
pub struct StubOcr;

#[async_trait]
impl MathOcr for StubOcr {
    fn provider_name(&self) -> &str {
        "stub"
    }

    async fn recognize(&self, image: &DataUri) -> AppResult<OcrResult> {
        warn!(
            "⚠️ 使用占位 OCR，忽略图片内容 ({}，{} 字节)",
            image.mime_type(),
            image.byte_len()
        );
        Ok(OcrResult {
            latex: STUB_LATEX.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct MathpixRequest<'a> {
    src: &'a str,
    formats: [&'a str; 2],
}

#[derive(Debug, Default, Deserialize)]
struct MathpixResponse {
    #[serde(default)]
    latex_styled: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Mathpix 识别服务客户端
pub struct MathpixClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_key: String,
}

impl MathpixClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.mathpix_api_base_url.trim_end_matches('/').to_string(),
            app_id: config.mathpix_app_id.clone(),
            app_key: config.mathpix_app_key.clone(),
        }
    }

    /// 把 Mathpix 响应映射为识别结果
    fn map_response(&self, status: u16, body: MathpixResponse) -> AppResult<OcrResult> {
        if let Some(message) = body.error {
            return Err(OcrError::BadResponse {
                provider: self.provider_name().to_string(),
                status: Some(status),
                message,
            }
            .into());
        }

        body.latex_styled
            .filter(|l| !l.trim().is_empty())
            .or(body.text)
            .map(|latex| OcrResult { latex })
            .ok_or_else(|| {
                OcrError::BadResponse {
                    provider: self.provider_name().to_string(),
                    status: Some(status),
                    message: "响应中没有识别结果".to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl MathOcr for MathpixClient {
    fn provider_name(&self) -> &str {
        "mathpix"
    }

    async fn recognize(&self, image: &DataUri) -> AppResult<OcrResult> {
        let endpoint = format!("{}/text", self.base_url);
        debug!("调用 Mathpix: {} ({} 字节)", endpoint, image.byte_len());

        let src = image.to_uri();
        let response = self
            .http
            .post(&endpoint)
            .header("app_id", &self.app_id)
            .header("app_key", &self.app_key)
            .json(&MathpixRequest {
                src: &src,
                formats: ["text", "latex_styled"],
            })
            .send()
            .await
            .map_err(|e| AppError::ocr_request_failed(self.provider_name(), e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Mathpix 返回错误状态 {}: {}", status, message);
            return Err(OcrError::BadResponse {
                provider: self.provider_name().to_string(),
                status: Some(status.as_u16()),
                message,
            }
            .into());
        }

        let body: MathpixResponse = response
            .json()
            .await
            .map_err(|e| AppError::ocr_request_failed(self.provider_name(), e))?;

        self.map_response(status.as_u16(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn client() -> MathpixClient {
        MathpixClient::new(&Config::default())
    }

    #[tokio::test]
    async fn test_stub_returns_placeholder() {
        let image = DataUri::parse("data:image/png;base64,AAA=").unwrap();
        let result = StubOcr.recognize(&image).await.unwrap();
        assert_eq!(result.latex, "\\frac{1}{2}x + 3 = 5");
    }

    #[test]
    fn test_map_prefers_latex_styled() {
        let body: MathpixResponse = serde_json::from_str(
            r#"{"text": "\\( x^2 \\)", "latex_styled": "x^{2}", "confidence": 0.99}"#,
        )
        .unwrap();
        let result = client().map_response(200, body).unwrap();
        assert_eq!(result.latex, "x^{2}");
    }

    #[test]
    fn test_map_falls_back_to_text() {
        let body: MathpixResponse = serde_json::from_str(r#"{"text": "y = 2x"}"#).unwrap();
        assert_eq!(client().map_response(200, body).unwrap().latex, "y = 2x");
    }

    #[test]
    fn test_map_error_field() {
        let body: MathpixResponse =
            serde_json::from_str(r#"{"error": "Invalid credentials"}"#).unwrap();
        let err = client().map_response(200, body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[test]
    fn test_map_empty_body() {
        let err = client()
            .map_response(200, MathpixResponse::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Ocr(OcrError::BadResponse { .. })));
    }
}
