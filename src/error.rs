//! 错误类型

use std::io;
use std::path::PathBuf;

use access_trait::AccessError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevmemError {
    #[error("cannot open {path}: {source} (raw hardware access usually needs root)")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("mmap of {path} at {offset:#x} ({len:#x} bytes) failed: {source}")]
    Map {
        path: PathBuf,
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error("PCI configuration space: {0}")]
    ConfigSpace(String),

    #[error("BAR{bar} of {device} is not memory-mappable; I/O port BARs are not supported")]
    UnsupportedBar { device: String, bar: u8 },

    #[error("invalid access width '{0}', expected 8, 16, 32 or 64")]
    InvalidWidth(String),

    #[error("cannot parse {what} '{token}'")]
    Parse { what: &'static str, token: String },

    #[error("{0}")]
    Usage(String),

    #[error("no matching command '{0}', try 'help'")]
    UnknownCommand(String),

    #[error(transparent)]
    Access(#[from] AccessError),
}

impl DevmemError {
    pub(crate) fn parse(what: &'static str, token: &str) -> Self {
        Self::Parse { what, token: token.to_string() }
    }

    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }
}
