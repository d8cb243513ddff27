//! 指令的语义表示，用于取指、执行阶段以及跟踪输出

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// 每个线程的寄存器数量
pub const NUM_REGS: usize = 16;

/// 操作码
///
/// 操作码集合是封闭的，执行阶段通过穷尽 `match` 分派，
/// 新增操作码时编译器会指出所有需要补充的位置。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum Opcode {
    /// 空操作
    #[default]
    Nop = 0x0,
    /// rd = rs1 + rs2（按寄存器位宽回绕）
    Add = 0x1,
    /// rd = rs1 - rs2（按寄存器位宽回绕）
    Sub = 0x2,
    /// rd = imm（截断到寄存器位宽）
    Mov = 0x3,
    /// rd = mem[rs1]
    Ldr = 0x4,
    /// mem[rs1] = rs2
    Str = 0x5,
    /// 逐线程比较 rs1 与 rs2，不相等的线程被移出活动掩码；PC = imm
    Beq = 0x6,
    /// 重新汇聚：全部线程恢复活动；PC = imm
    Jmp = 0x7,
}

impl Opcode {
    pub const ALL: [Opcode; 8] = [
        Opcode::Nop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mov,
        Opcode::Ldr,
        Opcode::Str,
        Opcode::Beq,
        Opcode::Jmp,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mov => "MOV",
            Opcode::Ldr => "LDR",
            Opcode::Str => "STR",
            Opcode::Beq => "BEQ",
            Opcode::Jmp => "JMP",
        }
    }

    /// 是否改写 PC（以及活动掩码）
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Beq | Opcode::Jmp)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// 寄存器字段名，用于错误报告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegField {
    Rd,
    Rs1,
    Rs2,
}

impl fmt::Display for RegField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegField::Rd => f.write_str("rd"),
            RegField::Rs1 => f.write_str("rs1"),
            RegField::Rs2 => f.write_str("rs2"),
        }
    }
}

/// 构造或解码指令时的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InstrError {
    #[error("register index {index} out of range for {field} (expected < {NUM_REGS})")]
    RegisterOutOfRange { field: RegField, index: u8 },

    #[error("invalid opcode encoding 0x{0:x}")]
    InvalidOpcode(u8),
}

/// 一条指令
///
/// 字段在构造时校验，之后不可变；取指阶段每个周期产生一条，
/// 执行阶段只读。
///
/// ```
/// use warp_sim::isa::{Instruction, Opcode};
///
/// let add = Instruction::add(3, 1, 2).unwrap();
/// assert_eq!(add.opcode(), Opcode::Add);
/// assert!(Instruction::add(16, 1, 2).is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Instruction {
    opcode: Opcode,
    rd: u8,
    rs1: u8,
    rs2: u8,
    imm: u16,
}

impl Instruction {
    /// 校验所有寄存器字段后构造指令
    ///
    /// 未被该操作码使用的字段同样要求合法，编码中不允许出现越界的寄存器号。
    pub fn new(opcode: Opcode, rd: u8, rs1: u8, rs2: u8, imm: u16) -> Result<Self, InstrError> {
        check_reg(RegField::Rd, rd)?;
        check_reg(RegField::Rs1, rs1)?;
        check_reg(RegField::Rs2, rs2)?;
        Ok(Self {
            opcode,
            rd,
            rs1,
            rs2,
            imm,
        })
    }

    pub const fn nop() -> Self {
        Self {
            opcode: Opcode::Nop,
            rd: 0,
            rs1: 0,
            rs2: 0,
            imm: 0,
        }
    }

    pub fn add(rd: u8, rs1: u8, rs2: u8) -> Result<Self, InstrError> {
        Self::new(Opcode::Add, rd, rs1, rs2, 0)
    }

    pub fn sub(rd: u8, rs1: u8, rs2: u8) -> Result<Self, InstrError> {
        Self::new(Opcode::Sub, rd, rs1, rs2, 0)
    }

    pub fn mov(rd: u8, imm: u16) -> Result<Self, InstrError> {
        Self::new(Opcode::Mov, rd, 0, 0, imm)
    }

    /// rd = mem[rs1]
    pub fn ldr(rd: u8, rs1: u8) -> Result<Self, InstrError> {
        Self::new(Opcode::Ldr, rd, rs1, 0, 0)
    }

    /// mem[rs1] = rs2
    pub fn str(rs1: u8, rs2: u8) -> Result<Self, InstrError> {
        Self::new(Opcode::Str, 0, rs1, rs2, 0)
    }

    pub fn beq(rs1: u8, rs2: u8, target: u16) -> Result<Self, InstrError> {
        Self::new(Opcode::Beq, 0, rs1, rs2, target)
    }

    pub const fn jmp(target: u16) -> Self {
        Self {
            opcode: Opcode::Jmp,
            rd: 0,
            rs1: 0,
            rs2: 0,
            imm: target,
        }
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[inline]
    pub fn rd(&self) -> u8 {
        self.rd
    }

    #[inline]
    pub fn rs1(&self) -> u8 {
        self.rs1
    }

    #[inline]
    pub fn rs2(&self) -> u8 {
        self.rs2
    }

    /// 立即数，或控制流指令的跳转目标
    #[inline]
    pub fn imm(&self) -> u16 {
        self.imm
    }
}

fn check_reg(field: RegField, index: u8) -> Result<(), InstrError> {
    if (index as usize) < NUM_REGS {
        Ok(())
    } else {
        Err(InstrError::RegisterOutOfRange { field, index })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode.mnemonic();
        match self.opcode {
            Opcode::Nop => f.write_str(op),
            Opcode::Add | Opcode::Sub => {
                write!(f, "{} r{}, r{}, r{}", op, self.rd, self.rs1, self.rs2)
            }
            Opcode::Mov => write!(f, "{} r{}, #{}", op, self.rd, self.imm),
            Opcode::Ldr => write!(f, "{} r{}, [r{}]", op, self.rd, self.rs1),
            Opcode::Str => write!(f, "{} r{}, [r{}]", op, self.rs2, self.rs1),
            Opcode::Beq => write!(f, "{} r{}, r{}, {}", op, self.rs1, self.rs2, self.imm),
            Opcode::Jmp => write!(f, "{} {}", op, self.imm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_range_checked() {
        assert!(Instruction::add(15, 15, 15).is_ok());

        let err = Instruction::add(16, 0, 0).unwrap_err();
        assert_eq!(err, InstrError::RegisterOutOfRange { field: RegField::Rd, index: 16 });

        let err = Instruction::ldr(1, 200).unwrap_err();
        assert_eq!(err, InstrError::RegisterOutOfRange { field: RegField::Rs1, index: 200 });

        let err = Instruction::str(0, 31).unwrap_err();
        assert_eq!(err, InstrError::RegisterOutOfRange { field: RegField::Rs2, index: 31 });
    }

    #[test]
    fn test_opcode_try_from() {
        assert_eq!(Opcode::try_from(6u8).unwrap(), Opcode::Beq);
        assert!(Opcode::try_from(8u8).is_err());
        let raw: u8 = Opcode::Jmp.into();
        assert_eq!(raw, 7);
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::ldr(1, 0).unwrap().to_string(), "LDR r1, [r0]");
        assert_eq!(Instruction::mov(2, 11).unwrap().to_string(), "MOV r2, #11");
        assert_eq!(Instruction::beq(1, 2, 3).unwrap().to_string(), "BEQ r1, r2, 3");
        assert_eq!(Instruction::add(3, 1, 2).unwrap().to_string(), "ADD r3, r1, r2");
        assert_eq!(Instruction::str(4, 5).unwrap().to_string(), "STR r5, [r4]");
        assert_eq!(Instruction::jmp(5).to_string(), "JMP 5");
        assert_eq!(Instruction::nop().to_string(), "NOP");
    }

    #[test]
    fn test_opcode_classes() {
        let control: Vec<Opcode> = Opcode::ALL.into_iter().filter(|op| op.is_control()).collect();
        assert_eq!(control, vec![Opcode::Beq, Opcode::Jmp]);
    }
}
