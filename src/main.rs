use anyhow::Result;
use paraphrase_rewrite::utils::logging;
use paraphrase_rewrite::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(&config.log_level);

    // 初始化并运行应用
    App::initialize(config)?.run().await?;

    Ok(())
}
