use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{self, EnvFilter};

use devmem::{run_blocking, Args};

fn main() -> Result<()> {
    // 初始化日志，默认只输出警告，RUST_LOG 可覆盖
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_target(false) // 不显示目标模块
        .with_file(true) // 显示文件名
        .with_line_number(true) // 显示行号
        .init();

    // 参数错误也不返回非零退出码
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return Ok(());
        }
    };

    run_blocking(args)
}
