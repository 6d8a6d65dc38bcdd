/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`，未设置时使用传入的默认级别。重复调用是安全的。
///
/// # 参数
/// - `default_level`: 默认日志级别（如 "info"）
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_tasks`: 同时处理的任务数
/// - `max_fragments`: 单任务内同时在途的片段数
pub fn log_startup(max_tasks: usize, max_fragments: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 片段改写模式");
    info!("📊 任务并发数: {} | 片段并发数: {}", max_tasks, max_fragments);
    info!("{}", "=".repeat(60));
}

/// 记录任务文件加载信息
///
/// # 参数
/// - `total`: 任务总数
pub fn log_jobs_loaded(total: usize) {
    info!("✓ 找到 {} 个待处理的任务文件", total);
}

/// 打印最终统计信息
///
/// # 参数
/// - `completed`: 完成数量
/// - `paused`: 因配额暂停的数量
/// - `failed`: 失败数量
/// - `total`: 总数
pub fn print_final_stats(completed: usize, paused: usize, failed: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 完成: {}/{}", completed, total);
    info!("⏸️ 配额暂停: {}", paused);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
