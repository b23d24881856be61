//! 数据准备与推理辅助工具依赖的通用组件.

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 以 `Info` 级别初始化日志. 可被 `$RUST_LOG` 覆盖.
pub fn init_logger() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;
    Ok(())
}
