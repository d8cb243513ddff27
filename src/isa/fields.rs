//! 指令字段提取辅助函数
//!
//! 32-bit 指令字布局：
//!
//! ```text
//!  31            16 15   12 11    8 7     4 3      0
//! +----------------+-------+-------+-------+--------+
//! |      imm       |  rs2  |  rs1  |  rd   | opcode |
//! +----------------+-------+-------+-------+--------+
//! ```

/// 提取 opcode 字段 [3:0]
#[inline]
pub fn opcode(raw: u32) -> u8 {
    (raw & 0xF) as u8
}

/// 提取 rd 字段 [7:4]
#[inline]
pub fn rd(raw: u32) -> u8 {
    ((raw >> 4) & 0xF) as u8
}

/// 提取 rs1 字段 [11:8]
#[inline]
pub fn rs1(raw: u32) -> u8 {
    ((raw >> 8) & 0xF) as u8
}

/// 提取 rs2 字段 [15:12]
#[inline]
pub fn rs2(raw: u32) -> u8 {
    ((raw >> 12) & 0xF) as u8
}

/// 提取立即数 / 跳转目标 [31:16]
#[inline]
pub fn imm(raw: u32) -> u16 {
    (raw >> 16) as u16
}

/// 按字段拼装指令字，寄存器号只保留低 4 位
#[inline]
pub const fn pack(opcode: u8, rd: u8, rs1: u8, rs2: u8, imm: u16) -> u32 {
    ((imm as u32) << 16)
        | (((rs2 & 0xF) as u32) << 12)
        | (((rs1 & 0xF) as u32) << 8)
        | (((rd & 0xF) as u32) << 4)
        | ((opcode & 0xF) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_positions() {
        // BEQ r1, r2, 3
        let raw = 0x0003_2106;
        assert_eq!(opcode(raw), 6);
        assert_eq!(rd(raw), 0);
        assert_eq!(rs1(raw), 1);
        assert_eq!(rs2(raw), 2);
        assert_eq!(imm(raw), 3);
    }

    #[test]
    fn test_pack() {
        assert_eq!(pack(3, 2, 0, 0, 11), 0x000B_0023);
        assert_eq!(pack(0xF, 0xF, 0xF, 0xF, 0xFFFF), 0xFFFF_FFFF);
    }
}
