//! PCI BAR 映射后端

use access_trait::{AccessError, RegisterAccess};
use tracing::info;

use super::{Backend, BackendKind};
use crate::error::DevmemError;
use crate::pci::{BarDescriptor, PciConfigResolver};
use crate::region::{open_device, MappedRegion};

/// 映射整个 `resource<N>` 文件，访问地址相对于 BAR 基址
#[derive(Debug)]
pub struct PciBarBackend {
    descriptor: BarDescriptor,
    region: Option<MappedRegion>,
}

impl PciBarBackend {
    /// 映射 `descriptor` 描述的 BAR
    ///
    /// 映射失败视为 BAR 不可映射（I/O 端口 BAR）。
    pub fn open(resolver: &PciConfigResolver, descriptor: BarDescriptor) -> Result<Self, DevmemError> {
        let path = resolver.resource_path(descriptor.address, descriptor.bar);
        let unsupported = || DevmemError::UnsupportedBar {
            device: descriptor.address.to_string(),
            bar: descriptor.bar,
        };

        let file = open_device(&path)?;
        let len = usize::try_from(descriptor.size).map_err(|_| unsupported())?;
        let region = MappedRegion::map(file, &path, 0, len, true).map_err(|e| match e {
            DevmemError::Map { .. } => unsupported(),
            other => other,
        })?;

        info!(device = %descriptor.address, bar = descriptor.bar, size = len, "映射 BAR");
        Ok(Self { descriptor, region: Some(region) })
    }

    pub fn descriptor(&self) -> &BarDescriptor {
        &self.descriptor
    }
}

impl Backend for PciBarBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Pci
    }

    fn window(&mut self, address: u64) -> Result<(&mut dyn RegisterAccess, usize), DevmemError> {
        let region = self
            .region
            .as_mut()
            .ok_or_else(|| DevmemError::usage(format!("BAR{} mapping is closed", self.descriptor.bar)))?;

        let limit = region.window_len();
        let offset = usize::try_from(address)
            .ok()
            .and_then(|a| a.checked_add(self.descriptor.offset))
            .ok_or(AccessError::OutOfBounds { offset: usize::MAX, len: 0, limit })?;
        let region: &mut dyn RegisterAccess = region;
        Ok((region, offset))
    }

    fn is_mapped(&self) -> bool {
        self.region.is_some()
    }

    fn close(&mut self) {
        if self.region.take().is_some() {
            info!(device = %self.descriptor.address, bar = self.descriptor.bar, "关闭 BAR 映射");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pci::PciAddress;
    use crate::testing::{pattern, FakeSysfs};
    use access_trait::AccessWidth;

    const DEV: PciAddress = PciAddress { domain: 0, bus: 0x03, slot: 0x00, function: 1 };

    fn open_bar(sysfs: &FakeSysfs, raw_bar: u32, len: usize) -> PciBarBackend {
        sysfs.add_device(DEV, &[(0, raw_bar)], len);
        let resolver = PciConfigResolver::new(sysfs.root());
        let descriptor = resolver.resolve(DEV, 0).unwrap();
        PciBarBackend::open(&resolver, descriptor).unwrap()
    }

    #[test]
    fn test_read_relative_to_bar_offset() {
        let sysfs = FakeSysfs::new();
        let mut backend = open_bar(&sysfs, 0xfebf_0040, 0x1000);
        assert_eq!(backend.descriptor().offset, 0x40);

        let report = backend.read(AccessWidth::W8, 0x10, 2).unwrap();
        let expect = pattern(0x1000);
        assert_eq!(report.values, vec![expect[0x50] as u64, expect[0x51] as u64]);
        // 显示地址是用户给出的 BAR 内地址
        assert_eq!(report.base, 0x10);
    }

    #[test]
    fn test_write_is_synced_to_resource() {
        let sysfs = FakeSysfs::new();
        let mut backend = open_bar(&sysfs, 0xfebf_0000, 0x2000);
        let report = backend.write(AccessWidth::W32, 0x1004, 0xa5a5_5a5a).unwrap();
        assert_eq!(report.read_back, 0xa5a5_5a5a);
        assert!(!report.mismatch());

        let bytes = sysfs.read_resource(DEV, 0);
        assert_eq!(&bytes[0x1004..0x1008], &0xa5a5_5a5au32.to_ne_bytes());
    }

    #[test]
    fn test_access_beyond_bar_is_rejected() {
        let sysfs = FakeSysfs::new();
        let mut backend = open_bar(&sysfs, 0xfebf_0000, 0x1000);
        let err = backend.read(AccessWidth::W32, 0x1000, 1).unwrap_err();
        assert!(matches!(err, DevmemError::Access(AccessError::OutOfBounds { .. })));
        let err = backend.read(AccessWidth::W32, u64::MAX, 1).unwrap_err();
        assert!(matches!(err, DevmemError::Access(AccessError::OutOfBounds { .. })));
    }

    #[test]
    fn test_closed_backend_refuses_access() {
        let sysfs = FakeSysfs::new();
        let mut backend = open_bar(&sysfs, 0xfebf_0000, 0x1000);
        backend.close();
        assert!(!backend.is_mapped());
        assert!(matches!(
            backend.read(AccessWidth::W8, 0, 1),
            Err(DevmemError::Usage(_))
        ));
    }
}
