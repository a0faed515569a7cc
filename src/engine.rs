//! 位宽分发与结果格式化
//!
//! 两个后端共用同一套读写流程，后端只需提供 [`RegisterAccess`]。

use std::fmt;

use access_trait::{AccessError, AccessWidth, RegisterAccess};
use tracing::debug;

/// 每行显示的单元数
pub const UNITS_PER_LINE: usize = 4;

/// 一次连续读取的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReport {
    /// 第一个单元的硬件地址（用于显示）
    pub base: u64,
    pub width: AccessWidth,
    pub values: Vec<u64>,
}

impl ReadReport {
    /// 按行返回 (行首地址, 该行的值)
    pub fn lines(&self) -> impl Iterator<Item = (u64, &[u64])> + '_ {
        let stride = (UNITS_PER_LINE * self.width.bytes()) as u64;
        self.values
            .chunks(UNITS_PER_LINE)
            .enumerate()
            .map(move |(k, chunk)| (self.base.wrapping_add(k as u64 * stride), chunk))
    }
}

impl fmt::Display for ReadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.width.hex_digits();
        for (k, (label, chunk)) in self.lines().enumerate() {
            if k > 0 {
                writeln!(f)?;
            }
            write!(f, "0x{:x}:", label)?;
            for value in chunk {
                write!(f, "    0x{:0digits$x}", value, digits = digits)?;
            }
        }
        Ok(())
    }
}

/// 一次写入（含回读）的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub address: u64,
    pub width: AccessWidth,
    pub written: u64,
    pub read_back: u64,
}

impl WriteReport {
    /// 回读值与写入值不一致（寄存器只读位、自清零位等）
    pub fn mismatch(&self) -> bool {
        self.written != self.read_back
    }
}

impl fmt::Display for WriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.width.hex_digits();
        write!(
            f,
            "0x{:x}: 0x{:0digits$x}, (0x{:0digits$x})",
            self.address,
            self.written,
            self.read_back,
            digits = digits
        )
    }
}

/// 访问引擎
pub struct AccessEngine;

impl AccessEngine {
    /// 从窗口偏移 `offset` 开始连续读取 `count` 个 `width` 位单元
    ///
    /// 整段范围先做边界与对齐检查，检查失败时不会发生任何访问。
    pub fn read(
        target: &mut dyn RegisterAccess,
        offset: usize,
        display_base: u64,
        width: AccessWidth,
        count: usize,
    ) -> Result<ReadReport, AccessError> {
        target.check_span(offset, width, count)?;
        debug!(window = target.name(), offset, width = width.bits(), count, "读取");

        let step = width.bytes();
        let values = (0..count)
            .map(|i| target.load_unit(offset + i * step, width))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReadReport { base: display_base, width, values })
    }

    /// 在窗口偏移 `offset` 处写入一个单元，刷新后以相同位宽回读
    ///
    /// `value` 超出位宽的高位会被截断，调用方应在解析时拒绝这种值。
    pub fn write(
        target: &mut dyn RegisterAccess,
        offset: usize,
        display_address: u64,
        width: AccessWidth,
        value: u64,
    ) -> Result<WriteReport, AccessError> {
        target.check_span(offset, width, 1)?;
        debug!(window = target.name(), offset, width = width.bits(), value, "写入");

        target.store_unit(offset, width, value)?;
        target.flush(offset, width.bytes())?;
        let read_back = target.load_unit(offset, width)?;

        Ok(WriteReport { address: display_address, width, written: value, read_back })
    }
}
