//! PCI BAR 发现
//!
//! 通过 sysfs 的 `config` 与 `resource<N>` 文件解析 BAR 的物理基址和大小。

use std::fmt;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use crate::command::unsigned;
use crate::const_values::{PCI_BAR0_OFFSET, PCI_BAR_COUNT};
use crate::error::DevmemError;
use crate::mapper::align;

/// BAR 寄存器位定义
const BAR_IO_SPACE: u32 = 0x1;
const BAR_TYPE_MASK: u32 = 0x6;
const BAR_TYPE_64: u32 = 0x4;
const BAR_PREFETCHABLE: u32 = 0x8;
const BAR_MEM_ADDR_MASK: u32 = 0xffff_fff0;

/// PCI 设备地址 `dddd:bb:ss.f`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub slot: u8,
    pub function: u8,
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:02x}:{:02x}.{:x}", self.domain, self.bus, self.slot, self.function)
    }
}

impl FromStr for PciAddress {
    type Err = DevmemError;

    /// 接受 `bb:ss.f` 或 `dddd:bb:ss.f`（十六进制）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || DevmemError::parse("PCI address", s);

        let (head, function) = s.rsplit_once('.').ok_or_else(bad)?;
        let parts: Vec<&str> = head.split(':').collect();
        let (domain, bus, slot) = match parts.as_slice() {
            [bus, slot] => ("0", *bus, *slot),
            [domain, bus, slot] => (*domain, *bus, *slot),
            _ => return Err(bad()),
        };
        if [domain, bus, slot, function].iter().any(|part| unsigned(part).is_none()) {
            return Err(bad());
        }

        let domain = u16::from_str_radix(domain, 16).map_err(|_| bad())?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| bad())?;
        let slot = u8::from_str_radix(slot, 16).map_err(|_| bad())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| bad())?;
        if slot > 0x1f || function > 0x7 {
            return Err(bad());
        }
        Ok(Self { domain, bus, slot, function })
    }
}

/// 已解析的 BAR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarDescriptor {
    pub address: PciAddress,
    pub bar: u8,
    /// BAR 的物理基址（低 4 位标志已去除）
    pub base: u64,
    /// resource 文件大小
    pub size: u64,
    /// 基址的页内偏移，后续访问都相对于它
    pub offset: usize,
    pub is_64bit: bool,
    pub prefetchable: bool,
}

impl fmt::Display for BarDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} BAR{}: base {:#x}, size {:#x}, {}-bit{}",
            self.address,
            self.bar,
            self.base,
            self.size,
            if self.is_64bit { 64 } else { 32 },
            if self.prefetchable { ", prefetchable" } else { "" }
        )
    }
}

/// 配置空间解析器
#[derive(Debug, Clone)]
pub struct PciConfigResolver {
    root: PathBuf,
}

impl PciConfigResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn device_dir(&self, address: PciAddress) -> PathBuf {
        self.root.join(address.to_string())
    }

    pub fn resource_path(&self, address: PciAddress, bar: u8) -> PathBuf {
        self.device_dir(address).join(format!("resource{}", bar))
    }

    pub fn config_path(&self, address: PciAddress) -> PathBuf {
        self.device_dir(address).join("config")
    }

    /// 解析 `address` 的第 `bar` 个 BAR
    pub fn resolve(&self, address: PciAddress, bar: u8) -> Result<BarDescriptor, DevmemError> {
        if bar >= PCI_BAR_COUNT {
            return Err(DevmemError::ConfigSpace(format!(
                "BAR index {} out of range 0..={}",
                bar,
                PCI_BAR_COUNT - 1
            )));
        }

        let resource_path = self.resource_path(address, bar);
        let size = File::open(&resource_path)
            .and_then(|f| f.metadata())
            .map_err(|e| {
                DevmemError::ConfigSpace(format!("cannot open {}: {}", resource_path.display(), e))
            })?
            .len();

        let config_path = self.config_path(address);
        let config = File::open(&config_path).map_err(|e| {
            DevmemError::ConfigSpace(format!("cannot open {}: {}", config_path.display(), e))
        })?;

        let reg_offset = PCI_BAR0_OFFSET + 4 * bar as u64;
        let low = read_config_u32(&config, &config_path, reg_offset)?;
        debug!(device = %address, bar, raw = low, "读取 BAR 寄存器");

        if low & BAR_IO_SPACE != 0 {
            return Err(DevmemError::UnsupportedBar { device: address.to_string(), bar });
        }

        let is_64bit = low & BAR_TYPE_MASK == BAR_TYPE_64;
        let high = if is_64bit {
            if bar + 1 >= PCI_BAR_COUNT {
                return Err(DevmemError::ConfigSpace(format!(
                    "64-bit BAR{} has no upper half",
                    bar
                )));
            }
            read_config_u32(&config, &config_path, reg_offset + 4)?
        } else {
            0
        };

        if size == 0 {
            return Err(DevmemError::ConfigSpace(format!(
                "{} is empty, BAR{} is not implemented or the device is disabled",
                resource_path.display(),
                bar
            )));
        }

        let base = ((high as u64) << 32) | (low & BAR_MEM_ADDR_MASK) as u64;
        let descriptor = BarDescriptor {
            address,
            bar,
            base,
            size,
            offset: align(base).in_page_offset,
            is_64bit,
            prefetchable: low & BAR_PREFETCHABLE != 0,
        };
        info!(%descriptor, "解析 BAR");
        Ok(descriptor)
    }
}

/// 读取配置空间中 `offset` 处的小端 32 位寄存器
fn read_config_u32(config: &File, path: &Path, offset: u64) -> Result<u32, DevmemError> {
    let mut buf = [0u8; 4];
    config.read_exact_at(&mut buf, offset).map_err(|e| {
        DevmemError::ConfigSpace(format!(
            "cannot read 4 bytes at {:#x} of {}: {}",
            offset,
            path.display(),
            e
        ))
    })?;
    Ok(u32::from_le_bytes(buf))
}
