//! RV32C 扩展（压缩指令）展开
//!
//! 16-bit 编码（bits [1:0] != 11）在取指阶段展开为等价的 32 位规范
//! 形式（`RvInstr`），之后与普通指令走完全相同的执行路径；执行核只
//! 需要知道本条指令长度为 2 以便正确推进 PC 和计算返回地址。
//!
//! 三个象限按 inst[1:0] 区分，象限内按 funct3 = inst[15:13] 细分。
//! F 存在时包含 C.FLW/C.FSW/C.FLWSP/C.FSWSP；D 扩展的槽位
//! （C.FLD/C.FSD 等）在 RV32F 配置下为保留编码。

use crate::isa::instr::RvInstr;

/// 判断一个取指低半字是否为压缩编码
#[inline]
pub fn is_compressed(lo: u32) -> bool {
    (lo & 0b11) != 0b11
}

// ========== 字段提取 ==========

/// 压缩格式的 3-bit 寄存器字段映射到 x8..x15
#[inline]
fn creg(field: u16) -> u8 {
    8 + (field & 0x7) as u8
}

/// rd/rs1 全宽字段 [11:7]
#[inline]
fn rd_full(raw: u16) -> u8 {
    ((raw >> 7) & 0x1F) as u8
}

/// rs2 全宽字段 [6:2]
#[inline]
fn rs2_full(raw: u16) -> u8 {
    ((raw >> 2) & 0x1F) as u8
}

/// rd'/rs2' 压缩字段 [4:2]
#[inline]
fn rd_c(raw: u16) -> u8 {
    creg(raw >> 2)
}

/// rs1' 压缩字段 [9:7]
#[inline]
fn rs1_c(raw: u16) -> u8 {
    creg(raw >> 7)
}

/// CI 格式 6-bit 立即数（[12|6:2]）符号扩展
#[inline]
fn imm_ci(raw: u16) -> i32 {
    let imm = (((raw >> 12) & 0x1) << 5) | ((raw >> 2) & 0x1F);
    ((imm as i32) << 26) >> 26
}

/// C.LW/C.SW 的字偏移：uimm[6|5:3|2] = inst[5|12:10|6]
#[inline]
fn uimm_w(raw: u16) -> i32 {
    let uimm = (((raw >> 5) & 0x1) << 6) | (((raw >> 10) & 0x7) << 3) | (((raw >> 6) & 0x1) << 2);
    uimm as i32
}

/// C.LWSP 的栈偏移：uimm[7:6|5|4:2] = inst[3:2|12|6:4]
#[inline]
fn uimm_lwsp(raw: u16) -> i32 {
    let uimm =
        (((raw >> 2) & 0x3) << 6) | (((raw >> 12) & 0x1) << 5) | (((raw >> 4) & 0x7) << 2);
    uimm as i32
}

/// C.SWSP 的栈偏移：uimm[7:6|5:2] = inst[8:7|12:9]
#[inline]
fn uimm_swsp(raw: u16) -> i32 {
    let uimm = (((raw >> 7) & 0x3) << 6) | (((raw >> 9) & 0xF) << 2);
    uimm as i32
}

/// CJ 格式跳转偏移（C.J/C.JAL）：
/// offset[11|10|9:8|7|6|5|4|3:1] = inst[12|8|10:9|6|7|2|11|5:3]
#[inline]
fn imm_cj(raw: u16) -> i32 {
    let raw = raw as u32;
    let imm = (((raw >> 12) & 0x1) << 11)
        | (((raw >> 8) & 0x1) << 10)
        | (((raw >> 9) & 0x3) << 8)
        | (((raw >> 6) & 0x1) << 7)
        | (((raw >> 7) & 0x1) << 6)
        | (((raw >> 2) & 0x1) << 5)
        | (((raw >> 11) & 0x1) << 4)
        | (((raw >> 3) & 0x7) << 1);
    ((imm as i32) << 20) >> 20
}

/// CB 格式分支偏移（C.BEQZ/C.BNEZ）：
/// offset[8|7:6|5|4:3|2:1] = inst[12|6:5|2|11:10|4:3]
#[inline]
fn imm_cb(raw: u16) -> i32 {
    let raw = raw as u32;
    let imm = (((raw >> 12) & 0x1) << 8)
        | (((raw >> 5) & 0x3) << 6)
        | (((raw >> 2) & 0x1) << 5)
        | (((raw >> 10) & 0x3) << 3)
        | (((raw >> 3) & 0x3) << 1);
    ((imm as i32) << 23) >> 23
}

/// C.ADDI4SPN 的零扩展偏移：
/// nzuimm[9:6|5:4|3|2] = inst[10:7|12:11|5|6]
#[inline]
fn uimm_addi4spn(raw: u16) -> i32 {
    let uimm = (((raw >> 7) & 0xF) << 6)
        | (((raw >> 11) & 0x3) << 4)
        | (((raw >> 5) & 0x1) << 3)
        | (((raw >> 6) & 0x1) << 2);
    uimm as i32
}

/// C.ADDI16SP 的符号扩展偏移：
/// nzimm[9|8:7|6|5|4] = inst[12|4:3|5|2|6]
#[inline]
fn imm_addi16sp(raw: u16) -> i32 {
    let raw = raw as u32;
    let imm = (((raw >> 12) & 0x1) << 9)
        | (((raw >> 3) & 0x3) << 7)
        | (((raw >> 5) & 0x1) << 6)
        | (((raw >> 2) & 0x1) << 5)
        | (((raw >> 6) & 0x1) << 4);
    ((imm as i32) << 22) >> 22
}

// ========== 展开 ==========

/// 将 16-bit 压缩编码展开为规范形式
///
/// 返回 `None` 表示保留编码（含全零字），调用方应走非法指令路径。
/// `has_f` 控制 C.FLW 族是否合法（F 扩展未启用时为保留编码）。
pub fn expand(raw: u16, has_f: bool) -> Option<RvInstr> {
    // 全零为永久非法编码
    if raw == 0 {
        return None;
    }

    let funct3 = (raw >> 13) & 0x7;

    match raw & 0b11 {
        // ========== 象限 0 ==========
        0b00 => match funct3 {
            // C.ADDI4SPN -> addi rd', x2, nzuimm
            0b000 => {
                let nzuimm = uimm_addi4spn(raw);
                if nzuimm == 0 {
                    return None; // nzuimm = 0 保留
                }
                Some(RvInstr::Addi { rd: rd_c(raw), rs1: 2, imm: nzuimm })
            }
            // C.LW -> lw rd', uimm(rs1')
            0b010 => Some(RvInstr::Lw {
                rd: rd_c(raw),
                rs1: rs1_c(raw),
                offset: uimm_w(raw),
            }),
            // C.FLW -> flw frd', uimm(rs1')（RV32FC）
            0b011 if has_f => Some(RvInstr::Flw {
                frd: rd_c(raw),
                rs1: rs1_c(raw),
                offset: uimm_w(raw),
            }),
            // C.SW -> sw rs2', uimm(rs1')
            0b110 => Some(RvInstr::Sw {
                rs1: rs1_c(raw),
                rs2: rd_c(raw),
                offset: uimm_w(raw),
            }),
            // C.FSW -> fsw frs2', uimm(rs1')（RV32FC）
            0b111 if has_f => Some(RvInstr::Fsw {
                rs1: rs1_c(raw),
                frs2: rd_c(raw),
                offset: uimm_w(raw),
            }),
            _ => None,
        },

        // ========== 象限 1 ==========
        0b01 => match funct3 {
            // C.ADDI（rd=x0 且 imm=0 即 C.NOP，同样展开为 addi x0,x0,0）
            0b000 => Some(RvInstr::Addi {
                rd: rd_full(raw),
                rs1: rd_full(raw),
                imm: imm_ci(raw),
            }),
            // C.JAL -> jal x1, offset（RV32 专有）
            0b001 => Some(RvInstr::Jal { rd: 1, offset: imm_cj(raw) }),
            // C.LI -> addi rd, x0, imm
            0b010 => Some(RvInstr::Addi {
                rd: rd_full(raw),
                rs1: 0,
                imm: imm_ci(raw),
            }),
            0b011 => {
                let rd = rd_full(raw);
                if rd == 2 {
                    // C.ADDI16SP -> addi x2, x2, nzimm
                    let nzimm = imm_addi16sp(raw);
                    if nzimm == 0 {
                        return None;
                    }
                    Some(RvInstr::Addi { rd: 2, rs1: 2, imm: nzimm })
                } else {
                    // C.LUI -> lui rd, nzimm（imm 为符号扩展的 6-bit，左移 12）
                    let imm6 = imm_ci(raw);
                    if imm6 == 0 {
                        return None;
                    }
                    Some(RvInstr::Lui { rd, imm: imm6 << 12 })
                }
            }
            0b100 => {
                let shamt = rs2_full(raw);
                match (raw >> 10) & 0x3 {
                    // C.SRLI（inst[12] 为 RV32 保留位）
                    0b00 => {
                        if (raw >> 12) & 0x1 != 0 {
                            return None;
                        }
                        Some(RvInstr::Srli { rd: rs1_c(raw), rs1: rs1_c(raw), shamt })
                    }
                    // C.SRAI
                    0b01 => {
                        if (raw >> 12) & 0x1 != 0 {
                            return None;
                        }
                        Some(RvInstr::Srai { rd: rs1_c(raw), rs1: rs1_c(raw), shamt })
                    }
                    // C.ANDI
                    0b10 => Some(RvInstr::Andi {
                        rd: rs1_c(raw),
                        rs1: rs1_c(raw),
                        imm: imm_ci(raw),
                    }),
                    // C.SUB/C.XOR/C.OR/C.AND（inst[12]=1 的槽位属 RV64）
                    _ => {
                        if (raw >> 12) & 0x1 != 0 {
                            return None;
                        }
                        let rd = rs1_c(raw);
                        let rs2 = rd_c(raw);
                        match (raw >> 5) & 0x3 {
                            0b00 => Some(RvInstr::Sub { rd, rs1: rd, rs2 }),
                            0b01 => Some(RvInstr::Xor { rd, rs1: rd, rs2 }),
                            0b10 => Some(RvInstr::Or { rd, rs1: rd, rs2 }),
                            _ => Some(RvInstr::And { rd, rs1: rd, rs2 }),
                        }
                    }
                }
            }
            // C.J -> jal x0, offset
            0b101 => Some(RvInstr::Jal { rd: 0, offset: imm_cj(raw) }),
            // C.BEQZ -> beq rs1', x0, offset
            0b110 => Some(RvInstr::Beq {
                rs1: rs1_c(raw),
                rs2: 0,
                offset: imm_cb(raw),
            }),
            // C.BNEZ -> bne rs1', x0, offset
            _ => Some(RvInstr::Bne {
                rs1: rs1_c(raw),
                rs2: 0,
                offset: imm_cb(raw),
            }),
        },

        // ========== 象限 2 ==========
        0b10 => match funct3 {
            // C.SLLI（inst[12] 为 RV32 保留位）
            0b000 => {
                if (raw >> 12) & 0x1 != 0 {
                    return None;
                }
                Some(RvInstr::Slli {
                    rd: rd_full(raw),
                    rs1: rd_full(raw),
                    shamt: rs2_full(raw),
                })
            }
            // C.LWSP -> lw rd, uimm(x2)，rd = x0 保留
            0b010 => {
                let rd = rd_full(raw);
                if rd == 0 {
                    return None;
                }
                Some(RvInstr::Lw { rd, rs1: 2, offset: uimm_lwsp(raw) })
            }
            // C.FLWSP -> flw frd, uimm(x2)（RV32FC）
            0b011 if has_f => Some(RvInstr::Flw {
                frd: rd_full(raw),
                rs1: 2,
                offset: uimm_lwsp(raw),
            }),
            0b100 => {
                let rd = rd_full(raw);
                let rs2 = rs2_full(raw);
                if (raw >> 12) & 0x1 == 0 {
                    if rs2 == 0 {
                        // C.JR -> jalr x0, 0(rs1)，rs1 = x0 保留
                        if rd == 0 {
                            return None;
                        }
                        Some(RvInstr::Jalr { rd: 0, rs1: rd, offset: 0 })
                    } else {
                        // C.MV -> add rd, x0, rs2
                        Some(RvInstr::Add { rd, rs1: 0, rs2 })
                    }
                } else if rs2 == 0 {
                    if rd == 0 {
                        // C.EBREAK
                        Some(RvInstr::Ebreak)
                    } else {
                        // C.JALR -> jalr x1, 0(rs1)
                        Some(RvInstr::Jalr { rd: 1, rs1: rd, offset: 0 })
                    }
                } else {
                    // C.ADD -> add rd, rd, rs2
                    Some(RvInstr::Add { rd, rs1: rd, rs2 })
                }
            }
            // C.SWSP -> sw rs2, uimm(x2)
            0b110 => Some(RvInstr::Sw {
                rs1: 2,
                rs2: rs2_full(raw),
                offset: uimm_swsp(raw),
            }),
            // C.FSWSP -> fsw frs2, uimm(x2)（RV32FC）
            0b111 if has_f => Some(RvInstr::Fsw {
                rs1: 2,
                frs2: rs2_full(raw),
                offset: uimm_swsp(raw),
            }),
            _ => None,
        },

        // bits[1:0] = 11 是 32 位编码，不应到达这里
        _ => None,
    }
}
