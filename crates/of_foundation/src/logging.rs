// crates/of_foundation/src/logging.rs

//! 日志初始化
//!
//! 库代码只通过 `log` 门面输出日志，由应用或测试在入口处调用
//! [`init_logging`] 安装 `env_logger` 后端。

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// 解析日志级别
///
/// 优先使用显式传入的级别，其次是 `RUST_LOG` 环境变量，最后回退到 `Info`。
pub fn resolve_level(level: Option<&str>) -> LevelFilter {
    level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|v| v.parse::<LevelFilter>().ok())
        })
        .unwrap_or(LevelFilter::Info)
}

/// 初始化日志系统
///
/// 重复调用是安全的：已有全局 logger 时返回 `false`，不会 panic。
///
/// # 参数
/// - `level`: 日志级别字符串（如 "info", "debug", "trace"），None 则使用环境变量
///
/// # 示例
///
/// ```
/// use of_foundation::logging::init_logging;
///
/// init_logging(Some("debug"));
/// ```
pub fn init_logging(level: Option<&str>) -> bool {
    let log_level = resolve_level(level);

    let installed = Builder::new()
        .filter_level(log_level)
        .target(Target::Stdout)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}:{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record
                    .file()
                    .unwrap_or("unknown")
                    .rsplit('/')
                    .next()
                    .unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init()
        .is_ok();

    if installed {
        log::info!(
            "日志系统初始化完成 (Level: {})",
            log_level.to_string().to_uppercase()
        );
    }
    installed
}

/// 测试用日志初始化（输出交给测试框架捕获）
pub fn init_test_logging() {
    let _ = Builder::new()
        .filter_level(resolve_level(None))
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_explicit_level() {
        assert_eq!(resolve_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(resolve_level(Some("TRACE")), LevelFilter::Trace);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_test_logging();
        // 已存在全局 logger，第二次安装失败但不 panic
        assert!(!init_logging(Some("warn")));
    }
}
