//! 物理内存与 PCI BAR 寄存器读写工具库

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::info;

use crate::const_values::DevmemConfig;
use crate::oneshot::UnitType;

pub mod backend;
pub mod command;
pub mod const_values;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod oneshot;
pub mod pci;
pub mod region;
pub mod repl;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::DevmemError;

/// Read or write physical memory and PCI BAR registers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Read from the address
    #[arg(short = 'r')]
    pub read: bool,

    /// Write the value to the address
    #[arg(short = 'w')]
    pub write: bool,

    /// Physical address (0x prefix for hex)
    #[arg(short = 'a')]
    pub address: Option<String>,

    /// Number of units to read
    #[arg(short = 'n', default_value_t = 1)]
    pub number: usize,

    /// Value to write (0x prefix for hex)
    #[arg(short = 'v')]
    pub value: Option<String>,

    /// Unit type
    #[arg(short = 't', value_enum, default_value_t = UnitType::W)]
    pub access_type: UnitType,

    /// Start the interactive shell
    #[arg(short, long)]
    pub interactive: bool,

    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// 按参数运行一次
///
/// 操作错误打印到标准输出后正常返回，进程总是以 0 退出。
pub fn run_blocking(args: Args) -> Result<()> {
    let config = match DevmemConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report(&e);
            return Ok(());
        }
    };
    info!(mem_device = %config.paths.mem_device.display(), interactive = args.interactive, "启动");

    let result = if args.interactive {
        repl::run_interactive(&config)
    } else {
        oneshot::run_oneshot(&args, &config, &mut std::io::stdout())
    };
    if let Err(e) = result {
        report(&e);
    }
    Ok(())
}

fn report(e: &anyhow::Error) {
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{}", format!("{:#}", e).red());
}
