use access_trait::AccessWidth;
use anyhow::{self, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 物理内存设备节点
pub const DEFAULT_MEM_DEVICE: &str = "/dev/mem";
/// PCI 设备的 sysfs 目录
pub const DEFAULT_PCI_DEVICES_ROOT: &str = "/sys/bus/pci/devices";
/// BAR0 在配置空间中的偏移
pub const PCI_BAR0_OFFSET: u64 = 0x10;
/// 标准头部中的 BAR 个数
pub const PCI_BAR_COUNT: u8 = 6;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub mem_device: PathBuf,
    pub pci_devices_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            mem_device: PathBuf::from(DEFAULT_MEM_DEVICE),
            pci_devices_root: PathBuf::from(DEFAULT_PCI_DEVICES_ROOT),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ReplConfig {
    pub prompt: String,
    pub history_size: usize,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "devmem> ".to_string(),
            history_size: 1000,
        }
    }
}

/// 交互模式下 `x`/`w` 不带后缀时使用的默认值
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DefaultsConfig {
    pub width: u32,
    pub count: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { width: 32, count: 1 }
    }
}

/// 工具配置（可选的 TOML 文件，缺省项取默认值）
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DevmemConfig {
    pub paths: PathsConfig,
    pub repl: ReplConfig,
    pub defaults: DefaultsConfig,
}

impl DevmemConfig {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<DevmemConfig> {
        let toml_str = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read config file {:?}", path.as_ref().as_os_str()))?;
        Self::from_toml(&toml_str)
            .with_context(|| format!("cannot parse config file {:?}", path.as_ref().as_os_str()))
    }

    /// 没有给出配置文件时使用内置默认值
    pub fn load(path: Option<&Path>) -> anyhow::Result<DevmemConfig> {
        match path {
            Some(path) => Self::new(path),
            None => anyhow::Ok(Self::default()),
        }
    }

    pub fn from_toml(toml_str: &str) -> anyhow::Result<DevmemConfig> {
        let config: DevmemConfig = toml::from_str(toml_str)?;
        config.default_width()?;
        anyhow::ensure!(config.defaults.count > 0, "defaults.count must be at least 1");
        anyhow::Ok(config)
    }

    pub fn default_width(&self) -> anyhow::Result<AccessWidth> {
        AccessWidth::try_from(self.defaults.width).context("invalid defaults.width")
    }
}
