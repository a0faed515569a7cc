//! 地址到页映射的换算

/// 映射粒度（字节）
pub const PAGE_SIZE: u64 = 4096;
/// 页内偏移掩码
pub const PAGE_MASK: u64 = PAGE_SIZE - 1;

/// 页对齐结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAlign {
    /// 页对齐后的映射起点
    pub page_base: u64,
    /// 目标地址在页内的偏移
    pub in_page_offset: usize,
}

/// 将物理/总线地址拆分为页基址与页内偏移
#[inline]
pub const fn align(address: u64) -> PageAlign {
    PageAlign {
        page_base: address & !PAGE_MASK,
        in_page_offset: (address & PAGE_MASK) as usize,
    }
}
