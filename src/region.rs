//! mmap 窗口管理

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use access_trait::{AccessError, AccessWidth, RegisterAccess};
use tracing::{debug, warn};

use crate::error::DevmemError;
use crate::mapper::PAGE_MASK;

/// 以读写 + O_SYNC 打开设备或资源文件
pub fn open_device(path: &Path) -> Result<File, DevmemError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(path)
        .map_err(|source| DevmemError::Open { path: path.to_path_buf(), source })
}

/// 一段共享读写映射
///
/// 映射起点总是页对齐的（由内核保证），释放发生且只发生在 drop 时。
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
    /// 映射期间保持打开
    file: File,
    path: PathBuf,
    /// 映射在文件中的起始偏移
    file_offset: u64,
    /// 写入后是否 msync
    sync_writes: bool,
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("path", &self.path)
            .field("fd", &self.file.as_raw_fd())
            .field("file_offset", &format_args!("{:#x}", self.file_offset))
            .field("len", &format_args!("{:#x}", self.len))
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl MappedRegion {
    /// 将 `file` 中 `[file_offset, file_offset + len)` 映射进进程地址空间
    ///
    /// `file_offset` 必须页对齐。
    pub fn map(
        file: File,
        path: &Path,
        file_offset: u64,
        len: usize,
        sync_writes: bool,
    ) -> Result<Self, DevmemError> {
        debug_assert_eq!(file_offset & PAGE_MASK, 0);
        let map_err = |source: io::Error| DevmemError::Map {
            path: path.to_path_buf(),
            offset: file_offset,
            len,
            source,
        };
        if len == 0 {
            return Err(map_err(io::Error::from_raw_os_error(libc::EINVAL)));
        }
        let offset = libc::off_t::try_from(file_offset)
            .map_err(|_| map_err(io::Error::from_raw_os_error(libc::EOVERFLOW)))?;

        // SAFETY: fd 有效且在 MappedRegion 生命周期内保持打开；返回值在下面检查。
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(map_err(io::Error::last_os_error()));
        }
        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| map_err(io::Error::from_raw_os_error(libc::EFAULT)))?;

        debug!(path = %path.display(), file_offset, len, "建立映射");
        Ok(Self {
            ptr,
            len,
            file,
            path: path.to_path_buf(),
            file_offset,
            sync_writes,
        })
    }

    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// 映射是否覆盖文件偏移 `file_offset` 处的页
    pub fn covers(&self, file_offset: u64) -> bool {
        file_offset >= self.file_offset && file_offset - self.file_offset < self.len as u64
    }
}

impl RegisterAccess for MappedRegion {
    fn load_unit(&mut self, offset: usize, width: AccessWidth) -> Result<u64, AccessError> {
        self.check_span(offset, width, 1)?;
        // SAFETY: check_span 保证 [offset, offset + width) 在映射内且按位宽对齐；
        // 映射起点页对齐，所以指针对齐。每个分支恰好一次 width 位的 volatile 读。
        let value = unsafe {
            let p = self.ptr.as_ptr().add(offset);
            match width {
                AccessWidth::W8 => ptr::read_volatile(p) as u64,
                AccessWidth::W16 => ptr::read_volatile(p.cast::<u16>()) as u64,
                AccessWidth::W32 => ptr::read_volatile(p.cast::<u32>()) as u64,
                AccessWidth::W64 => ptr::read_volatile(p.cast::<u64>()),
            }
        };
        Ok(value)
    }

    fn store_unit(&mut self, offset: usize, width: AccessWidth, value: u64) -> Result<(), AccessError> {
        self.check_span(offset, width, 1)?;
        // SAFETY: 同 load_unit。
        unsafe {
            let p = self.ptr.as_ptr().add(offset);
            match width {
                AccessWidth::W8 => ptr::write_volatile(p, value as u8),
                AccessWidth::W16 => ptr::write_volatile(p.cast::<u16>(), value as u16),
                AccessWidth::W32 => ptr::write_volatile(p.cast::<u32>(), value as u32),
                AccessWidth::W64 => ptr::write_volatile(p.cast::<u64>(), value),
            }
        }
        Ok(())
    }

    fn window_len(&self) -> usize {
        self.len
    }

    fn flush(&mut self, offset: usize, len: usize) -> Result<(), AccessError> {
        if !self.sync_writes || len == 0 {
            return Ok(());
        }
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.len)
            .ok_or(AccessError::OutOfBounds { offset, len, limit: self.len })?;
        // msync 要求起点页对齐
        let start = offset & !(PAGE_MASK as usize);
        // SAFETY: [start, end) 位于映射内。
        let rc = unsafe {
            libc::msync(
                self.ptr.as_ptr().add(start).cast::<libc::c_void>(),
                end - start,
                libc::MS_SYNC | libc::MS_INVALIDATE,
            )
        };
        if rc != 0 {
            return Err(AccessError::Flush(io::Error::last_os_error().to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        self.path.to_str().unwrap_or("<non-utf8 path>")
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len 来自成功的 mmap，且只在这里释放一次。
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.len) };
        if rc != 0 {
            warn!(
                path = %self.path.display(),
                error = %io::Error::last_os_error(),
                "解除映射失败"
            );
        } else {
            debug!(path = %self.path.display(), "解除映射");
        }
    }
}
