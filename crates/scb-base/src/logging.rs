//! 日志初始化
//!
//! 库本身只通过 `tracing` 宏输出日志，是否安装订阅者由应用决定。
//! 测试和示例可以调用 [`init_logging`] 安装一个读取 `RUST_LOG` 的 fmt 订阅者。

use tracing_subscriber::EnvFilter;

/// 默认日志级别（`RUST_LOG` 未设置时）
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// 安装 fmt 订阅者
///
/// 级别来自 `RUST_LOG`，未设置时为 [`DEFAULT_LOG_DIRECTIVE`]。
/// 已经安装过订阅者时返回 `false`（不会 panic）。
pub fn init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}

/// 测试用订阅者：输出交给测试框架捕获
pub fn init_test_logging() -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}
