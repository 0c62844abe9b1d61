//! ISA 模块测试

use super::*;

#[test]
fn test_decode_addi() {
    let raw = 0x02A00093; // addi x1, x0, 42
    let decoded = decode(raw);
    assert_eq!(decoded.instr, RvInstr::Addi { rd: 1, rs1: 0, imm: 42 });
}

#[test]
fn test_decode_addi_negative() {
    let raw = 0xFFF00113; // addi x2, x0, -1
    let decoded = decode(raw);
    assert_eq!(decoded.instr, RvInstr::Addi { rd: 2, rs1: 0, imm: -1 });
}

#[test]
fn test_decode_add_sub() {
    let decoded = decode(0x002081B3); // add x3, x1, x2
    assert_eq!(decoded.instr, RvInstr::Add { rd: 3, rs1: 1, rs2: 2 });

    let decoded = decode(0x402081B3); // sub x3, x1, x2
    assert_eq!(decoded.instr, RvInstr::Sub { rd: 3, rs1: 1, rs2: 2 });
}

#[test]
fn test_decode_lw_sw() {
    let decoded = decode(0x00412083); // lw x1, 4(x2)
    assert_eq!(decoded.instr, RvInstr::Lw { rd: 1, rs1: 2, offset: 4 });

    let decoded = decode(0x00112423); // sw x1, 8(x2)
    assert_eq!(decoded.instr, RvInstr::Sw { rs1: 2, rs2: 1, offset: 8 });
}

#[test]
fn test_decode_beq() {
    let decoded = decode(0x00208463); // beq x1, x2, 8
    assert_eq!(decoded.instr, RvInstr::Beq { rs1: 1, rs2: 2, offset: 8 });
}

#[test]
fn test_decode_jal() {
    let decoded = decode(0x000000EF); // jal x1, 0
    assert_eq!(decoded.instr, RvInstr::Jal { rd: 1, offset: 0 });
}

#[test]
fn test_decode_lui() {
    let decoded = decode(0x123450B7); // lui x1, 0x12345
    assert_eq!(
        decoded.instr,
        RvInstr::Lui {
            rd: 1,
            imm: 0x12345000_u32 as i32
        }
    );
}

#[test]
fn test_decode_ecall_ebreak() {
    assert_eq!(decode(0x00000073).instr, RvInstr::Ecall);
    assert_eq!(decode(0x00100073).instr, RvInstr::Ebreak);
}

#[test]
fn test_decode_illegal() {
    let decoded = decode(0x00000000);
    assert!(matches!(decoded.instr, RvInstr::Illegal { raw: 0 }));
}

#[test]
fn test_registry_full_isa() {
    // 全扩展注册表：每个扩展的代表指令都应正确解码
    let registry = IsaConfig::new()
        .with_m_extension()
        .with_f_extension()
        .with_zicsr_extension()
        .with_priv_extension()
        .build()
        .expect("配置无冲突");

    // RV32I
    assert!(matches!(registry.decode(0x02A00093).instr, RvInstr::Addi { .. }));
    // RV32M（与 RV32I 共享 OP opcode）
    assert!(matches!(registry.decode(0x022080B3).instr, RvInstr::Mul { .. }));
    // RV32F
    assert!(matches!(registry.decode(0x003100D3).instr, RvInstr::FaddS { .. }));
    // Zicsr（与 ECALL/EBREAK 共享 SYSTEM opcode）
    assert!(matches!(registry.decode(0x34009173).instr, RvInstr::Csrrw { .. }));
    // Priv
    assert_eq!(registry.decode(MRET_ENCODING).instr, RvInstr::Mret);
    // ECALL 仍然正确
    assert_eq!(registry.decode(0x00000073).instr, RvInstr::Ecall);
}

#[test]
fn test_registry_without_extension_rejects() {
    // 未启用 F 时，FP 指令应落入保留路径
    let registry = IsaConfig::new().with_m_extension().build().unwrap();
    assert!(matches!(registry.decode(0x003100D3).instr, RvInstr::Illegal { .. }));
}

#[test]
fn test_reserved_encoding_is_illegal() {
    let registry = IsaConfig::new()
        .with_m_extension()
        .with_f_extension()
        .with_zicsr_extension()
        .with_priv_extension()
        .build()
        .unwrap();

    // OP opcode 下不存在的 funct7
    assert!(matches!(registry.decode(0x0A2081B3).instr, RvInstr::Illegal { .. }));
    // SYSTEM opcode 下不存在的 funct12
    assert!(matches!(registry.decode(0x7FF00073).instr, RvInstr::Illegal { .. }));
}
