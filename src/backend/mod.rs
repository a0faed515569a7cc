//! 访问后端
//!
//! 后端负责把用户给出的地址解析成某个映射窗口内的偏移，
//! 具体的按位宽读写由 [`AccessEngine`] 统一完成。

mod local;
mod pci_bar;

use access_trait::{AccessWidth, RegisterAccess};

use crate::engine::{AccessEngine, ReadReport, WriteReport};
use crate::error::DevmemError;

pub use local::LocalMemoryBackend;
pub use pci_bar::PciBarBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Pci,
}

/// 后端 trait
pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// 将 `address` 解析为 (窗口, 窗口内偏移)，需要时建立映射
    fn window(&mut self, address: u64) -> Result<(&mut dyn RegisterAccess, usize), DevmemError>;

    /// 当前是否持有映射
    fn is_mapped(&self) -> bool;

    /// 释放映射与文件描述符
    fn close(&mut self);

    /// 从 `address` 起读取 `count` 个单元
    fn read(&mut self, width: AccessWidth, address: u64, count: usize) -> Result<ReadReport, DevmemError> {
        let (target, offset) = self.window(address)?;
        Ok(AccessEngine::read(target, offset, address, width, count)?)
    }

    /// 向 `address` 写入一个单元并回读
    fn write(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<WriteReport, DevmemError> {
        let (target, offset) = self.window(address)?;
        Ok(AccessEngine::write(target, offset, address, width, value)?)
    }
}

/// 会话中当前生效的后端
#[derive(Debug)]
pub enum ActiveBackend {
    Local(LocalMemoryBackend),
    Pci(PciBarBackend),
}

impl ActiveBackend {
    pub fn as_backend(&mut self) -> &mut dyn Backend {
        match self {
            Self::Local(b) => b,
            Self::Pci(b) => b,
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Local(b) => b.kind(),
            Self::Pci(b) => b.kind(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        match self {
            Self::Local(b) => b.is_mapped(),
            Self::Pci(b) => b.is_mapped(),
        }
    }
}
