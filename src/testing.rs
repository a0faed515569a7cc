//! 测试辅助：用临时文件模拟 /dev/mem 与 sysfs

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};

use crate::pci::PciAddress;

/// 第 i 个字节为 `i % 251` 的可辨认内容
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// 预填充内容的“物理内存设备”
pub fn fake_mem_device(len: usize) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(&pattern(len)).unwrap();
    f.flush().unwrap();
    f
}

/// 模拟的 /sys/bus/pci/devices
pub struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    pub fn new() -> Self {
        Self { dir: TempDir::new().unwrap() }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    fn device_dir(&self, address: PciAddress) -> PathBuf {
        self.dir.path().join(address.to_string())
    }

    /// 创建设备目录：256 字节配置空间（写入给定 BAR 寄存器），
    /// 以及每个出现的 BAR 对应的 `resource_len` 字节 resource 文件
    pub fn add_device(&self, address: PciAddress, bars: &[(u8, u32)], resource_len: usize) {
        let dir = self.device_dir(address);
        fs::create_dir_all(&dir).unwrap();

        let mut config = vec![0u8; 256];
        for &(bar, raw) in bars {
            let off = 0x10 + 4 * bar as usize;
            config[off..off + 4].copy_from_slice(&raw.to_le_bytes());
        }
        fs::write(dir.join("config"), &config).unwrap();

        let resources: Vec<u8> = if bars.is_empty() { vec![0] } else { bars.iter().map(|b| b.0).collect() };
        for bar in resources {
            fs::write(dir.join(format!("resource{}", bar)), pattern(resource_len)).unwrap();
        }
    }

    pub fn truncate_config(&self, address: PciAddress, len: u64) {
        let f = OpenOptions::new()
            .write(true)
            .open(self.device_dir(address).join("config"))
            .unwrap();
        f.set_len(len).unwrap();
    }

    pub fn read_resource(&self, address: PciAddress, bar: u8) -> Vec<u8> {
        fs::read(self.device_dir(address).join(format!("resource{}", bar))).unwrap()
    }
}
