//! 特权指令解码器
//!
//! 定义 MRET、WFI 两条 M-mode 特权指令（本模型不实现 S-mode，
//! SRET 编码落入保留路径并触发非法指令异常）

use crate::isa::fields::OP_SYSTEM;
use crate::isa::instr::RvInstr;
use crate::isa::instr_def::{InstrDef, TableDrivenDecoder, EXACT_MASK};

// ========== 特权指令编码 ==========

/// MRET 指令编码: 0011000 00010 00000 000 00000 1110011
pub const MRET_ENCODING: u32 = 0x30200073;

/// WFI 指令编码: 0001000 00101 00000 000 00000 1110011
pub const WFI_ENCODING: u32 = 0x10500073;

// ========== 特权指令定义表 ==========

/// 特权指令定义表
pub static PRIV_INSTRS: &[InstrDef] = &[
    InstrDef::new("MRET", EXACT_MASK, MRET_ENCODING, |_| RvInstr::Mret),
    InstrDef::new("WFI", EXACT_MASK, WFI_ENCODING, |_| RvInstr::Wfi),
];

/// 特权指令使用的 opcode
pub static PRIV_OPCODES: [u32; 1] = [OP_SYSTEM];

// ========== 解码器实例 ==========

/// 特权指令解码器
///
/// allow_overlap 为 true：SYSTEM opcode (0x73) 已被 RV32I 的
/// ECALL/EBREAK 使用，特权指令需要与其共存
pub static PRIV_DECODER: TableDrivenDecoder =
    TableDrivenDecoder::new("Priv", PRIV_INSTRS, Some(&PRIV_OPCODES), true);
