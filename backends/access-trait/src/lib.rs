//! 寄存器访问能力 trait 定义
//!
//! 两种后端（/dev/mem 页映射与 PCI BAR 映射）都只通过这里的接口被驱动，
//! 位宽分发逻辑因此只需要写一次。

use std::fmt;

use thiserror::Error;

/// 访问错误类型
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("invalid access width {0}, expected one of 8, 16, 32, 64")]
    InvalidWidth(u32),
    #[error("access of {len} byte(s) at offset {offset:#x} is outside the {limit:#x}-byte window")]
    OutOfBounds { offset: usize, len: usize, limit: usize },
    #[error("offset {offset:#x} is not aligned to the {width}-bit access width")]
    Misaligned { offset: usize, width: AccessWidth },
    #[error("flush failed: {0}")]
    Flush(String),
}

/// 访问位宽
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessWidth {
    W8,
    W16,
    #[default]
    W32,
    W64,
}

impl AccessWidth {
    pub const ALL: [AccessWidth; 4] = [Self::W8, Self::W16, Self::W32, Self::W64];

    /// 位数
    pub const fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    /// 每个单元的字节数
    pub const fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// 十六进制显示时补零到的位数
    pub const fn hex_digits(self) -> usize {
        self.bytes() * 2
    }

    /// 该位宽能表示的最大值
    pub const fn max_value(self) -> u64 {
        match self {
            Self::W64 => u64::MAX,
            _ => (1u64 << self.bits()) - 1,
        }
    }

    /// 值是否能无损放进该位宽
    pub const fn fits(self, value: u64) -> bool {
        value <= self.max_value()
    }
}

impl TryFrom<u32> for AccessWidth {
    type Error = AccessError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(Self::W8),
            16 => Ok(Self::W16),
            32 => Ok(Self::W32),
            64 => Ok(Self::W64),
            other => Err(AccessError::InvalidWidth(other)),
        }
    }
}

impl fmt::Display for AccessWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// 寄存器访问能力
///
/// 偏移量都是相对于实现者自身窗口起点的字节偏移。实现者必须保证
/// 每次 `load_unit`/`store_unit` 恰好产生一次 `width` 位的访问。
pub trait RegisterAccess {
    /// 以指定位宽读取一个单元，结果零扩展到 u64
    fn load_unit(&mut self, offset: usize, width: AccessWidth) -> Result<u64, AccessError>;

    /// 以指定位宽写入一个单元，`value` 的高位被截断
    fn store_unit(&mut self, offset: usize, width: AccessWidth, value: u64)
        -> Result<(), AccessError>;

    /// 窗口大小（字节）
    fn window_len(&self) -> usize;

    /// 将 `[offset, offset + len)` 的写入同步到底层设备（可选）
    fn flush(&mut self, _offset: usize, _len: usize) -> Result<(), AccessError> {
        Ok(())
    }

    /// 名称（用于日志）
    fn name(&self) -> &str {
        "unknown"
    }

    /// 检查一段连续访问是否完全落在窗口内且按位宽对齐
    fn check_span(&self, offset: usize, width: AccessWidth, count: usize) -> Result<(), AccessError> {
        let limit = self.window_len();
        let len = count.saturating_mul(width.bytes());
        let end = offset.checked_add(len).ok_or(AccessError::OutOfBounds { offset, len, limit })?;
        if end > limit {
            return Err(AccessError::OutOfBounds { offset, len, limit });
        }
        if offset % width.bytes() != 0 {
            return Err(AccessError::Misaligned { offset, width });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flat {
        data: Vec<u8>,
    }

    impl RegisterAccess for Flat {
        fn load_unit(&mut self, offset: usize, width: AccessWidth) -> Result<u64, AccessError> {
            self.check_span(offset, width, 1)?;
            let mut buf = [0u8; 8];
            buf[..width.bytes()].copy_from_slice(&self.data[offset..offset + width.bytes()]);
            Ok(u64::from_le_bytes(buf))
        }

        fn store_unit(&mut self, offset: usize, width: AccessWidth, value: u64) -> Result<(), AccessError> {
            self.check_span(offset, width, 1)?;
            let n = width.bytes();
            self.data[offset..offset + n].copy_from_slice(&value.to_le_bytes()[..n]);
            Ok(())
        }

        fn window_len(&self) -> usize {
            self.data.len()
        }
    }

    #[test]
    fn test_width_from_bits() {
        assert_eq!(AccessWidth::try_from(8), Ok(AccessWidth::W8));
        assert_eq!(AccessWidth::try_from(64), Ok(AccessWidth::W64));
        assert_eq!(AccessWidth::try_from(12), Err(AccessError::InvalidWidth(12)));
        assert_eq!(AccessWidth::try_from(0), Err(AccessError::InvalidWidth(0)));
    }

    #[test]
    fn test_width_geometry() {
        let digits: Vec<usize> = AccessWidth::ALL.iter().map(|w| w.hex_digits()).collect();
        assert_eq!(digits, vec![2, 4, 8, 16]);
        assert_eq!(AccessWidth::W16.max_value(), 0xffff);
        assert!(AccessWidth::W64.fits(u64::MAX));
        assert!(!AccessWidth::W8.fits(0x100));
    }

    #[test]
    fn test_check_span() {
        let flat = Flat { data: vec![0; 16] };
        assert!(flat.check_span(0, AccessWidth::W32, 4).is_ok());
        assert!(matches!(
            flat.check_span(8, AccessWidth::W64, 2),
            Err(AccessError::OutOfBounds { offset: 8, len: 16, limit: 16 })
        ));
        assert!(matches!(
            flat.check_span(2, AccessWidth::W32, 1),
            Err(AccessError::Misaligned { offset: 2, .. })
        ));
    }

    #[test]
    fn test_store_truncates_to_width() {
        let mut flat = Flat { data: vec![0; 8] };
        flat.store_unit(0, AccessWidth::W16, 0x1234_5678).unwrap();
        assert_eq!(flat.load_unit(0, AccessWidth::W32).unwrap(), 0x5678);
        assert_eq!(flat.name(), "unknown");
    }
}
