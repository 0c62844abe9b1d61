//! Zicsr 扩展（CSR 操作指令）解码器
//!
//! 包含 6 条 CSR 操作指令：
//! - CSRRW, CSRRS, CSRRC (寄存器版本)
//! - CSRRWI, CSRRSI, CSRRCI (立即数版本)
//!
//! CSR 指令编码格式（I-type 变体，SYSTEM opcode = 0x73）：
//! ```text
//! 31       20 19    15 14  12 11   7 6      0
//! ┌──────────┬────────┬──────┬──────┬────────┐
//! │   csr    │rs1/zimm│funct3│  rd  │ opcode │
//! └──────────┴────────┴──────┴──────┴────────┘
//! ```

use crate::isa::fields::*;
use crate::isa::instr::RvInstr;
use crate::isa::instr_def::{i_match, InstrDef, TableDrivenDecoder, I_TYPE_MASK};

// ========== Zicsr 指令定义表 ==========

/// Zicsr 指令定义表
pub static ZICSR_INSTRS: &[InstrDef] = &[
    // CSRRW: funct3 = 001
    InstrDef::new("CSRRW", I_TYPE_MASK, i_match(0b001, OP_SYSTEM), |raw| RvInstr::Csrrw {
        rd: rd(raw),
        rs1: rs1(raw),
        csr: csr_addr(raw),
    }),
    // CSRRS: funct3 = 010
    InstrDef::new("CSRRS", I_TYPE_MASK, i_match(0b010, OP_SYSTEM), |raw| RvInstr::Csrrs {
        rd: rd(raw),
        rs1: rs1(raw),
        csr: csr_addr(raw),
    }),
    // CSRRC: funct3 = 011
    InstrDef::new("CSRRC", I_TYPE_MASK, i_match(0b011, OP_SYSTEM), |raw| RvInstr::Csrrc {
        rd: rd(raw),
        rs1: rs1(raw),
        csr: csr_addr(raw),
    }),
    // CSRRWI: funct3 = 101，zimm 复用 rs1 字段
    InstrDef::new("CSRRWI", I_TYPE_MASK, i_match(0b101, OP_SYSTEM), |raw| RvInstr::Csrrwi {
        rd: rd(raw),
        zimm: csr_zimm(raw),
        csr: csr_addr(raw),
    }),
    // CSRRSI: funct3 = 110
    InstrDef::new("CSRRSI", I_TYPE_MASK, i_match(0b110, OP_SYSTEM), |raw| RvInstr::Csrrsi {
        rd: rd(raw),
        zimm: csr_zimm(raw),
        csr: csr_addr(raw),
    }),
    // CSRRCI: funct3 = 111
    InstrDef::new("CSRRCI", I_TYPE_MASK, i_match(0b111, OP_SYSTEM), |raw| RvInstr::Csrrci {
        rd: rd(raw),
        zimm: csr_zimm(raw),
        csr: csr_addr(raw),
    }),
];

/// Zicsr 扩展的 opcode 列表
pub static ZICSR_OPCODES: [u32; 1] = [OP_SYSTEM];

// ========== 解码器实例 ==========

/// Zicsr 解码器
///
/// allow_overlap 为 true：SYSTEM opcode 已被 RV32I 的 ECALL/EBREAK
/// 和特权指令使用，Zicsr 通过 funct3 != 000 与它们区分
pub static ZICSR_DECODER: TableDrivenDecoder =
    TableDrivenDecoder::new("Zicsr", ZICSR_INSTRS, Some(&ZICSR_OPCODES), true);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::InstrDecoder;

    #[test]
    fn test_decode_csrrw() {
        // csrrw x2, mscratch, x1 (mscratch = 0x340)
        let decoded = ZICSR_DECODER.decode(0x34009173).unwrap();
        assert_eq!(decoded.instr, RvInstr::Csrrw { rd: 2, rs1: 1, csr: 0x340 });
    }

    #[test]
    fn test_decode_csrrs_read_only_form() {
        // csrrs x3, mscratch, x0
        let decoded = ZICSR_DECODER.decode(0x340021F3).unwrap();
        assert_eq!(decoded.instr, RvInstr::Csrrs { rd: 3, rs1: 0, csr: 0x340 });
    }

    #[test]
    fn test_decode_csrrwi() {
        // csrrwi x10, mscratch, 0x1F
        let decoded = ZICSR_DECODER.decode(0x340FD573).unwrap();
        assert_eq!(decoded.instr, RvInstr::Csrrwi { rd: 10, zimm: 0x1F, csr: 0x340 });
    }

    #[test]
    fn test_ecall_not_matched() {
        // ECALL 的 funct3 = 000，不属于 Zicsr
        assert!(ZICSR_DECODER.decode(0x00000073).is_none());
    }
}
