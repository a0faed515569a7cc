//! 交互会话：当前后端的选择与命令执行

use std::path::PathBuf;

use tracing::{debug, info};

use crate::backend::{ActiveBackend, Backend, BackendKind, LocalMemoryBackend, PciBarBackend};
use crate::command::{Command, CommandDefaults, Verb};
use crate::const_values::DevmemConfig;
use crate::engine::{ReadReport, WriteReport};
use crate::error::DevmemError;
use crate::pci::{PciAddress, PciConfigResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// 尚未选择后端
    #[default]
    Idle,
    LocalActive,
    PciActive,
    Terminated,
}

/// 命令执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Nothing,
    Selected(String),
    Read(ReadReport),
    Write(WriteReport),
    Help(&'static str),
    Quit,
}

/// 各类映射的存活数量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MappingCount {
    pub local: usize,
    pub pci: usize,
}

/// 一次交互会话，同一时刻只持有一个后端
#[derive(Debug)]
pub struct Session {
    mem_device: PathBuf,
    resolver: PciConfigResolver,
    defaults: CommandDefaults,
    active: Option<ActiveBackend>,
    state: SessionState,
}

impl Session {
    pub fn new(config: &DevmemConfig) -> anyhow::Result<Self> {
        let defaults = CommandDefaults {
            width: config.default_width()?,
            count: config.defaults.count,
        };
        Ok(Self::with_paths(
            config.paths.mem_device.clone(),
            config.paths.pci_devices_root.clone(),
            defaults,
        ))
    }

    pub fn with_paths(
        mem_device: impl Into<PathBuf>,
        pci_devices_root: impl Into<PathBuf>,
        defaults: CommandDefaults,
    ) -> Self {
        Self {
            mem_device: mem_device.into(),
            resolver: PciConfigResolver::new(pci_devices_root),
            defaults,
            active: None,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_kind(&self) -> Option<BackendKind> {
        self.active.as_ref().map(|b| b.kind())
    }

    pub fn mappings(&self) -> MappingCount {
        let mut count = MappingCount::default();
        match &self.active {
            Some(b @ ActiveBackend::Local(_)) if b.is_mapped() => count.local += 1,
            Some(b @ ActiveBackend::Pci(_)) if b.is_mapped() => count.pci += 1,
            _ => {}
        }
        count
    }

    /// 解析并执行一行输入
    pub fn execute_line(&mut self, line: &str) -> Result<Outcome, DevmemError> {
        match Command::parse(line, &self.defaults)? {
            Some(command) => self.execute(command),
            None => Ok(Outcome::Nothing),
        }
    }

    pub fn execute(&mut self, command: Command) -> Result<Outcome, DevmemError> {
        if self.state == SessionState::Terminated {
            return Err(DevmemError::usage("session has ended"));
        }
        debug!(?command, state = ?self.state, "执行命令");

        match command {
            Command::SelectLocal => {
                self.select_local();
                Ok(Outcome::Nothing)
            }
            Command::SelectPci { address, bar } => self.select_pci(address, bar),
            Command::Read { address, width, count } => {
                let report = self.backend()?.read(width, address, count)?;
                Ok(Outcome::Read(report))
            }
            Command::Write { address, width, value } => {
                let report = self.backend()?.write(width, address, value)?;
                Ok(Outcome::Write(report))
            }
            Command::Help => Ok(Outcome::Help(Verb::help_msg())),
            Command::Quit => {
                self.close_all();
                self.state = SessionState::Terminated;
                Ok(Outcome::Quit)
            }
        }
    }

    /// 关闭当前后端
    pub fn close_all(&mut self) {
        if let Some(mut backend) = self.active.take() {
            backend.as_backend().close();
        }
    }

    fn backend(&mut self) -> Result<&mut dyn Backend, DevmemError> {
        self.active
            .as_mut()
            .map(ActiveBackend::as_backend)
            .ok_or_else(|| DevmemError::usage("no backend selected, use 'use mem' or 'use pci ...' first"))
    }

    fn select_local(&mut self) {
        if self.active_kind() != Some(BackendKind::Local) {
            self.close_all();
            self.active = Some(ActiveBackend::Local(LocalMemoryBackend::new(&self.mem_device)));
            info!(device = %self.mem_device.display(), "选择物理内存后端");
        }
        self.state = SessionState::LocalActive;
    }

    /// 解析失败时保持原状态；解析成功后先释放旧的 BAR 映射再映射新的
    fn select_pci(&mut self, address: PciAddress, bar: u8) -> Result<Outcome, DevmemError> {
        let descriptor = self.resolver.resolve(address, bar)?;

        if self.active_kind() == Some(BackendKind::Pci) {
            self.close_all();
            self.state = SessionState::Idle;
        }
        let backend = PciBarBackend::open(&self.resolver, descriptor)?;
        let summary = backend.descriptor().to_string();

        self.close_all();
        self.active = Some(ActiveBackend::Pci(backend));
        self.state = SessionState::PciActive;
        Ok(Outcome::Selected(summary))
    }
}
