//! OCR 服务 - 业务能力层
//!
//! 只负责"图片 → 公式文本"能力，不关心流程

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clients::{MathOcr, MathpixClient, StubOcr};
use crate::config::{Config, OcrProvider};
use crate::error::{AppResult, OcrError};
use crate::models::{DataUri, OcrResult};

/// OCR 服务
///
/// 职责：
/// - 校验图片 data URI（格式错误时不发起任何请求）
/// - 在超时约束下调用识别提供方
#[derive(Clone)]
pub struct OcrService {
    provider: Arc<dyn MathOcr>,
    timeout: Duration,
}

impl OcrService {
    pub fn new(provider: Arc<dyn MathOcr>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// 按配置选择识别提供方
    pub fn from_config(config: &Config) -> Self {
        let provider: Arc<dyn MathOcr> = match config.ocr_provider {
            OcrProvider::Mathpix => Arc::new(MathpixClient::new(config)),
            OcrProvider::Stub => {
                warn!("⚠️ OCR 使用占位实现，图片题目将得到固定公式");
                Arc::new(StubOcr)
            }
        };
        Self::new(provider, config.ocr_timeout())
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// 从图片中提取数学公式
    ///
    /// # 参数
    /// - `image`: `data:<mimetype>;base64,<encoded_data>` 形式的图片
    pub async fn extract(&self, image: &str) -> AppResult<OcrResult> {
        let data_uri = DataUri::parse(image)?;
        debug!(
            "图片校验通过: {}，{} 字节",
            data_uri.mime_type(),
            data_uri.byte_len()
        );

        let result = tokio::time::timeout(self.timeout, self.provider.recognize(&data_uri))
            .await
            .map_err(|_| OcrError::Timeout {
                provider: self.provider.provider_name().to_string(),
                secs: self.timeout.as_secs(),
            })??;

        info!(
            "✓ OCR 识别完成 ({}): {}",
            self.provider.provider_name(),
            crate::utils::logging::truncate_text(&result.latex, 80)
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowOcr {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MathOcr for SlowOcr {
        fn provider_name(&self) -> &str {
            "slow"
        }

        async fn recognize(&self, _image: &DataUri) -> AppResult<OcrResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(OcrResult {
                latex: "x".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_extract_with_stub() {
        let service = OcrService::new(Arc::new(StubOcr), Duration::from_secs(5));
        let result = service.extract("data:image/png;base64,AAA=").await.unwrap();
        assert_eq!(result.latex, "\\frac{1}{2}x + 3 = 5");
    }

    #[tokio::test]
    async fn test_malformed_uri_skips_provider() {
        let provider = Arc::new(SlowOcr {
            calls: AtomicUsize::new(0),
        });
        let service = OcrService::new(provider.clone(), Duration::from_secs(5));

        let err = service.extract("not-a-data-uri").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout() {
        let provider = Arc::new(SlowOcr {
            calls: AtomicUsize::new(0),
        });
        let service = OcrService::new(provider, Duration::from_secs(2));

        let err = service
            .extract("data:image/png;base64,AAA=")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OcrTimeout);
    }

    #[test]
    fn test_from_config_selects_provider() {
        let stub = OcrService::from_config(&Config::default());
        assert_eq!(stub.provider_name(), "stub");

        let mathpix = OcrService::from_config(&Config {
            ocr_provider: OcrProvider::Mathpix,
            mathpix_app_id: "id".to_string(),
            mathpix_app_key: "key".to_string(),
            ..Config::default()
        });
        assert_eq!(mathpix.provider_name(), "mathpix");
    }
}
