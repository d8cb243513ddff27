//! 内存抽象层
//!
//! 本模块定义了线程级访存的统一接口 `Memory` trait，
//! 以及两种实现：
//! - `FlatMemory`: 所有线程共享的 16-bit 字寻址线性内存
//! - `LaneIdMemory`: 参考测试桩，读数据恒为 `lane + base`

use thiserror::Error;

/// 单个线程在一个周期内发出的访存请求
///
/// 非活动线程的 `addr` / `wdata` 无意义，但 `we` 一定为 false。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemRequest {
    /// 地址
    pub addr: u16,
    /// 写数据
    pub wdata: u16,
    /// 写使能
    pub we: bool,
}

impl MemRequest {
    pub fn read(addr: u16) -> Self {
        Self {
            addr,
            wdata: 0,
            we: false,
        }
    }

    pub fn write(addr: u16, wdata: u16) -> Self {
        Self {
            addr,
            wdata,
            we: true,
        }
    }
}

/// 连接阶段检测到的配置错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WiringError {
    #[error("memory is wired for {memory} lanes but the warp has {warp}")]
    LaneMismatch { warp: usize, memory: usize },
}

/// 线程级访存接口
///
/// 每个执行周期内，执行核心对每个线程调用一次 `access`，
/// 并在同一周期内得到读数据（零延迟同步存储器）。
pub trait Memory {
    /// 内存实现固定服务的线程数；`None` 表示任意线程数
    fn lanes(&self) -> Option<usize> {
        None
    }

    /// 处理线程 `lane` 的一次请求，返回读数据
    ///
    /// 写请求在返回前生效，返回值可以是写入前的旧值，核心不会使用它。
    fn access(&mut self, lane: usize, req: MemRequest) -> u16;
}

impl<M: Memory + ?Sized> Memory for Box<M> {
    fn lanes(&self) -> Option<usize> {
        (**self).lanes()
    }

    fn access(&mut self, lane: usize, req: MemRequest) -> u16 {
        (**self).access(lane, req)
    }
}

impl<M: Memory + ?Sized> Memory for &mut M {
    fn lanes(&self) -> Option<usize> {
        (**self).lanes()
    }

    fn access(&mut self, lane: usize, req: MemRequest) -> u16 {
        (**self).access(lane, req)
    }
}

/// 检查内存与 warp 的线程数是否匹配
pub fn check_wiring(warp_lanes: usize, mem: &dyn Memory) -> Result<(), WiringError> {
    match mem.lanes() {
        Some(memory) if memory != warp_lanes => Err(WiringError::LaneMismatch {
            warp: warp_lanes,
            memory,
        }),
        _ => Ok(()),
    }
}

/// 地址空间大小（16-bit 字）
pub const ADDRESS_SPACE: usize = 1 << 16;

/// 简单线性内存实现
///
/// 覆盖完整的 16-bit 地址空间，所以任何地址都合法；
/// 所有线程共享同一份数据。
#[derive(Clone)]
pub struct FlatMemory {
    data: Vec<u16>,
    stores: u64,
}

impl FlatMemory {
    /// 创建全零内存
    ///
    /// ```
    /// use warp_sim::memory::{FlatMemory, MemRequest, Memory};
    ///
    /// let mut mem = FlatMemory::new();
    /// mem.access(0, MemRequest::write(0x40, 7));
    /// assert_eq!(mem.load(0x40), 7);
    /// ```
    pub fn new() -> Self {
        FlatMemory {
            data: vec![0; ADDRESS_SPACE],
            stores: 0,
        }
    }

    #[inline]
    pub fn load(&self, addr: u16) -> u16 {
        self.data[addr as usize]
    }

    #[inline]
    pub fn store(&mut self, addr: u16, value: u16) {
        self.data[addr as usize] = value;
    }

    /// 批量写入，超出地址空间的部分回绕到 0
    pub fn write_words(&mut self, addr: u16, words: &[u16]) {
        for (i, &w) in words.iter().enumerate() {
            self.store(addr.wrapping_add(i as u16), w);
        }
    }

    /// 批量读取
    pub fn read_words(&self, addr: u16, len: usize) -> Vec<u16> {
        (0..len).map(|i| self.load(addr.wrapping_add(i as u16))).collect()
    }

    /// 经由 `access` 完成的写操作次数
    pub fn store_count(&self) -> u64 {
        self.stores
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlatMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatMemory")
            .field("words", &self.data.len())
            .field("stores", &self.stores)
            .finish()
    }
}

impl Memory for FlatMemory {
    fn access(&mut self, _lane: usize, req: MemRequest) -> u16 {
        let old = self.load(req.addr);
        if req.we {
            self.store(req.addr, req.wdata);
            self.stores += 1;
        }
        old
    }
}

/// 参考测试桩：读数据 = 线程号 + base，写操作被丢弃
#[derive(Debug, Clone)]
pub struct LaneIdMemory {
    lanes: usize,
    base: u16,
    dropped_writes: u64,
}

impl LaneIdMemory {
    pub const DEFAULT_BASE: u16 = 10;

    pub fn new(lanes: usize) -> Self {
        Self::with_base(lanes, Self::DEFAULT_BASE)
    }

    pub fn with_base(lanes: usize, base: u16) -> Self {
        Self {
            lanes,
            base,
            dropped_writes: 0,
        }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    /// 收到的写使能次数
    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes
    }
}

impl Memory for LaneIdMemory {
    fn lanes(&self) -> Option<usize> {
        Some(self.lanes)
    }

    fn access(&mut self, lane: usize, req: MemRequest) -> u16 {
        if req.we {
            self.dropped_writes += 1;
        }
        self.base.wrapping_add(lane as u16)
    }
}
