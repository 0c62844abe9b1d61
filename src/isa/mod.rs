//! RISC-V ISA 抽象与解码框架
//!
//! 本模块提供可扩展的指令解码系统：
//! - `RvInstr`: 指令的语义表示（解码即展开为带操作数的枚举变体）
//! - `InstrDecoder` / `DecoderRegistry`: 按 opcode 分桶的插件式解码
//! - `InstrDef`: 统一的指令定义，同时用于解码和冲突检测
//! - `IsaConfig`: ISA 配置构建器，扩展选择 + 冲突检测
//! - `rv32c`: 压缩指令到规范形式的展开
//! - `disasm`: 运行时反汇编

mod config;
mod decoder;
mod fields;
mod instr;
mod instr_def;
mod priv_instr;
mod rv32f;
mod rv32i;
mod rv32m;
mod zicsr;

pub mod disasm;
pub mod rv32c;

pub use config::{ConflictInfo, InstrSignature, IsaConfig, IsaExtension};
pub use decoder::{DecoderRegistry, InstrDecoder};
pub use fields::*;
pub use instr::{DecodedInstr, RvInstr};
pub use instr_def::{InstrDef, TableDrivenDecoder};
pub use priv_instr::{MRET_ENCODING, PRIV_DECODER, PRIV_INSTRS, WFI_ENCODING};
pub use rv32f::{RoundingMode, RV32F_DECODER, RV32F_INSTRS, RV32F_OPCODES};
pub use rv32i::{RV32I_DECODER, RV32I_INSTRS, RV32I_OPCODES};
pub use rv32m::{RV32M_DECODER, RV32M_INSTRS, RV32M_OPCODES};
pub use zicsr::{ZICSR_DECODER, ZICSR_INSTRS, ZICSR_OPCODES};

/// 便捷函数：使用默认 RV32I 解码器解码 32-bit 指令字
pub fn decode(raw: u32) -> DecodedInstr {
    RV32I_DECODER.decode(raw).unwrap_or(DecodedInstr {
        raw,
        instr: RvInstr::Illegal { raw },
    })
}

#[cfg(test)]
mod tests;
