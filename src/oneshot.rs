//! 单次命令行模式：`-r`/`-w` 对物理内存做一次读写后退出

use std::io::Write;

use access_trait::AccessWidth;
use clap::{CommandFactory, ValueEnum};
use tracing::debug;

use crate::backend::{Backend, LocalMemoryBackend};
use crate::command::{parse_number, parse_value};
use crate::const_values::DevmemConfig;
use crate::error::DevmemError;
use crate::Args;

/// `-t` 的单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum UnitType {
    /// 8-bit byte
    B,
    /// 16-bit half word
    H,
    /// 32-bit word
    #[default]
    W,
    /// 64-bit double word
    D,
}

impl From<UnitType> for AccessWidth {
    fn from(t: UnitType) -> Self {
        match t {
            UnitType::B => AccessWidth::W8,
            UnitType::H => AccessWidth::W16,
            UnitType::W => AccessWidth::W32,
            UnitType::D => AccessWidth::W64,
        }
    }
}

/// 执行单次读写，提示信息和结果写到 `out`
///
/// 缺少地址或值时只打印提示，不算错误。
pub fn run_oneshot(args: &Args, config: &DevmemConfig, out: &mut dyn Write) -> anyhow::Result<()> {
    if !args.read && !args.write {
        writeln!(out, "{}", Args::command().render_usage())?;
        return Ok(());
    }
    let Some(address) = args.address.as_deref() else {
        writeln!(out, "specify address.")?;
        return Ok(());
    };
    let address = parse_number(address, "address")?;
    let width = AccessWidth::from(args.access_type);
    if args.number == 0 {
        return Err(DevmemError::usage("count must be at least 1").into());
    }
    // 参数全部检查完才访问设备
    let value = match (args.write, args.value.as_deref()) {
        (false, _) => None,
        (true, None) => {
            writeln!(out, "specify value.")?;
            return Ok(());
        }
        (true, Some(value)) => Some(parse_value(value, width)?),
    };

    let mut backend = LocalMemoryBackend::new(&config.paths.mem_device);
    debug!(address, %width, count = args.number, "单次访问");

    if args.read {
        let report = backend.read(width, address, args.number)?;
        writeln!(out, "{}", report)?;
    }

    if let Some(value) = value {
        let report = backend.write(width, address, value)?;
        writeln!(out, "{}", report)?;
    }

    backend.close();
    Ok(())
}
