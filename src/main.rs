use std::path::PathBuf;

use anyhow::Result;
use math_vision::utils::logging;
use math_vision::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 可选的配置文件：第一个命令行参数，或 MATH_VISION_CONFIG
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MATH_VISION_CONFIG").ok())
        .map(PathBuf::from);

    // 加载配置
    let config = Config::load(config_path.as_deref())?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
