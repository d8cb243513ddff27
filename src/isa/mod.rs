//! SIMT ISA 抽象与编解码
//!
//! 本模块提供：
//! - `Opcode`: 封闭的 8 个操作码
//! - `Instruction`: 构造时校验的不可变指令
//! - `encode` / `decode`: 32-bit 指令字与 `Instruction` 的互相转换

mod fields;
mod instr;

pub use fields::*;
pub use instr::{InstrError, Instruction, NUM_REGS, Opcode, RegField};

/// 将指令编码为 32-bit 指令字
pub fn encode(instr: &Instruction) -> u32 {
    pack(
        instr.opcode().into(),
        instr.rd(),
        instr.rs1(),
        instr.rs2(),
        instr.imm(),
    )
}

/// 解码 32-bit 指令字
///
/// 寄存器字段只有 4 位，因此只有 opcode 字段可能非法。
pub fn decode(raw: u32) -> Result<Instruction, InstrError> {
    let op = opcode(raw);
    let op = Opcode::try_from(op).map_err(|_| InstrError::InvalidOpcode(op))?;
    Instruction::new(op, rd(raw), rs1(raw), rs2(raw), imm(raw))
}
