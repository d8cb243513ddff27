//! Warp 配置器
//!
//! 统一配置执行核心的线程数和寄存器位宽。
//!
//! # 示例
//!
//! ```
//! use warp_sim::warp::WarpBuilder;
//!
//! let warp = WarpBuilder::new()
//!     .with_lanes(8)
//!     .with_reg_width(12)
//!     .build()
//!     .expect("配置合法");
//! assert_eq!(warp.lanes(), 8);
//! ```

use thiserror::Error;

use super::WarpCore;
use super::mask::MAX_LANES;
use super::status::RegWidth;

/// 默认 warp 宽度
pub const DEFAULT_LANES: usize = 4;

/// 配置错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("a warp needs at least one lane")]
    NoLanes,

    #[error("warp width {lanes} exceeds the maximum of {max} lanes")]
    TooManyLanes { lanes: usize, max: usize },

    #[error("register width {0} bits is outside 1..=16")]
    InvalidRegWidth(u32),
}

/// Warp 构建器
#[derive(Debug, Clone)]
pub struct WarpBuilder {
    lanes: usize,
    reg_width: u32,
}

impl WarpBuilder {
    /// 默认 4 线程、16-bit 寄存器
    pub fn new() -> Self {
        Self {
            lanes: DEFAULT_LANES,
            reg_width: RegWidth::MAX_BITS,
        }
    }

    /// 设置线程数
    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes;
        self
    }

    /// 设置寄存器位宽（bit）
    pub fn with_reg_width(mut self, bits: u32) -> Self {
        self.reg_width = bits;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<RegWidth, ConfigError> {
        if self.lanes == 0 {
            return Err(ConfigError::NoLanes);
        }
        if self.lanes > MAX_LANES {
            return Err(ConfigError::TooManyLanes {
                lanes: self.lanes,
                max: MAX_LANES,
            });
        }
        RegWidth::new(self.reg_width).ok_or(ConfigError::InvalidRegWidth(self.reg_width))
    }

    /// 构建处于复位状态的执行核心
    pub fn build(self) -> Result<WarpCore, ConfigError> {
        let width = self.validate()?;
        Ok(WarpCore::with_config(self.lanes, width))
    }
}

impl Default for WarpBuilder {
    fn default() -> Self {
        Self::new()
    }
}
