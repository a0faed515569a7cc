//! /dev/mem 页映射后端

use std::path::PathBuf;

use access_trait::RegisterAccess;
use tracing::info;

use super::{Backend, BackendKind};
use crate::error::DevmemError;
use crate::mapper::{align, PAGE_SIZE};
use crate::region::{open_device, MappedRegion};

/// 每次只映射目标地址所在的一页
#[derive(Debug)]
pub struct LocalMemoryBackend {
    device: PathBuf,
    region: Option<MappedRegion>,
}

impl LocalMemoryBackend {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self { device: device.into(), region: None }
    }

    /// 当前映射页的物理基址
    pub fn mapped_page(&self) -> Option<u64> {
        self.region.as_ref().map(|r| r.file_offset())
    }

    /// 确保 `address` 所在页已映射，返回映射和页内偏移
    ///
    /// 目标页变化时先释放旧映射再建立新映射。
    pub fn open(&mut self, address: u64) -> Result<(&mut MappedRegion, usize), DevmemError> {
        let page = align(address);
        let region = match self.region.take() {
            Some(region) if region.covers(page.page_base) => region,
            stale => {
                drop(stale);
                let file = open_device(&self.device)?;
                let region = MappedRegion::map(file, &self.device, page.page_base, PAGE_SIZE as usize, false)?;
                info!(device = %self.device.display(), page = page.page_base, "映射物理页");
                region
            }
        };
        Ok((self.region.insert(region), page.in_page_offset))
    }
}

impl Backend for LocalMemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn window(&mut self, address: u64) -> Result<(&mut dyn RegisterAccess, usize), DevmemError> {
        let (region, offset) = self.open(address)?;
        let region: &mut dyn RegisterAccess = region;
        Ok((region, offset))
    }

    fn is_mapped(&self) -> bool {
        self.region.is_some()
    }

    fn close(&mut self) {
        if self.region.take().is_some() {
            info!(device = %self.device.display(), "关闭物理内存映射");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_mem_device, pattern};
    use access_trait::{AccessError, AccessWidth};

    #[test]
    fn test_read_maps_page_of_address() {
        let mem = fake_mem_device(0x3000);
        let mut backend = LocalMemoryBackend::new(mem.path());
        assert!(!backend.is_mapped());

        let report = backend.read(AccessWidth::W8, 0x1004, 2).unwrap();
        let expect = pattern(0x3000);
        assert_eq!(report.values, vec![expect[0x1004] as u64, expect[0x1005] as u64]);
        assert_eq!(report.base, 0x1004);
        assert_eq!(backend.mapped_page(), Some(0x1000));
    }

    #[test]
    fn test_remap_on_page_change() {
        let mem = fake_mem_device(0x3000);
        let mut backend = LocalMemoryBackend::new(mem.path());
        backend.read(AccessWidth::W32, 0x1000, 1).unwrap();
        backend.read(AccessWidth::W32, 0x1ffc, 1).unwrap();
        assert_eq!(backend.mapped_page(), Some(0x1000));
        backend.read(AccessWidth::W32, 0x2000, 1).unwrap();
        assert_eq!(backend.mapped_page(), Some(0x2000));
    }

    #[test]
    fn test_write_reads_back() {
        let mem = fake_mem_device(0x2000);
        let mut backend = LocalMemoryBackend::new(mem.path());
        for (i, width) in AccessWidth::ALL.into_iter().enumerate() {
            let address = 0x1000 + (i as u64) * 8;
            let value = 0x8877_6655_4433_2211 & width.max_value();
            let report = backend.write(width, address, value).unwrap();
            assert_eq!(report.written, value);
            assert_eq!(report.read_back, value);
            assert_eq!(backend.read(width, address, 1).unwrap().values, vec![value]);
        }
    }

    #[test]
    fn test_read_past_page_is_rejected() {
        let mem = fake_mem_device(0x2000);
        let mut backend = LocalMemoryBackend::new(mem.path());
        let err = backend.read(AccessWidth::W64, 0xff8, 2).unwrap_err();
        assert!(matches!(err, DevmemError::Access(AccessError::OutOfBounds { .. })));
    }

    #[test]
    fn test_missing_device_is_open_error() {
        let mut backend = LocalMemoryBackend::new("/nonexistent/mem");
        let err = backend.read(AccessWidth::W32, 0, 1).unwrap_err();
        assert!(matches!(err, DevmemError::Open { .. }));
        assert!(!backend.is_mapped());
    }

    #[test]
    fn test_close_releases_mapping() {
        let mem = fake_mem_device(0x1000);
        let mut backend = LocalMemoryBackend::new(mem.path());
        backend.read(AccessWidth::W8, 0, 1).unwrap();
        assert!(backend.is_mapped());
        backend.close();
        assert!(!backend.is_mapped());
        assert_eq!(backend.mapped_page(), None);
    }
}
