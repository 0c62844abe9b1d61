//! RV32F (single-precision floating-point) execution unit
//!
//! 以 `simple_soft_float` 实现位精确的 IEEE-754 单精度运算：舍入
//! 模式是逐次调用的参数、异常标志通过 `FPState` 返回，不触碰宿主
//! 浮点环境。每条指令产生的标志在退休前累积进 fflags，因此紧随其
//! 后的 CSRR 读 fflags 能看到本条指令的标志。

use super::super::trap::TrapCause;
use super::super::CpuCore;
use crate::isa::RvInstr;
use crate::memory::Memory;
use simple_soft_float::{FPState, RoundingMode, StatusFlags, F32};

/// 浮点异常标志位（fflags 布局）
pub mod fflags {
    pub const NX: u32 = 1 << 0; // 不精确
    pub const UF: u32 = 1 << 1; // 下溢
    pub const OF: u32 = 1 << 2; // 上溢
    pub const DZ: u32 = 1 << 3; // 除以零
    pub const NV: u32 = 1 << 4; // 无效操作
}

/// 规范 NaN（Canonical NaN）
pub const CANONICAL_NAN: u32 = 0x7FC0_0000;

/// 解析指令的舍入模式请求
///
/// rm = 111 (DYN) 时取 frm CSR；保留编码（101/110 或非法的 frm 值）
/// 返回 None，调用方触发非法指令异常
#[inline]
fn decode_rounding_mode(cpu: &CpuCore, instr_rm: u8) -> Option<RoundingMode> {
    let rm = if instr_rm == 0b111 { cpu.frm() } else { instr_rm };

    match rm {
        0b000 => Some(RoundingMode::TiesToEven),
        0b001 => Some(RoundingMode::TowardZero),
        0b010 => Some(RoundingMode::TowardNegative),
        0b011 => Some(RoundingMode::TowardPositive),
        0b100 => Some(RoundingMode::TiesToAway),
        _ => None,
    }
}

/// 将软浮点状态标志累积到 fflags
#[inline]
fn apply_fp_state(cpu: &mut CpuCore, fp_state: &FPState) {
    let flags = fp_state.status_flags;
    let mut bits = 0;
    if flags.contains(StatusFlags::INVALID_OPERATION) {
        bits |= fflags::NV;
    }
    if flags.contains(StatusFlags::DIVISION_BY_ZERO) {
        bits |= fflags::DZ;
    }
    if flags.contains(StatusFlags::OVERFLOW) {
        bits |= fflags::OF;
    }
    if flags.contains(StatusFlags::UNDERFLOW) {
        bits |= fflags::UF;
    }
    if flags.contains(StatusFlags::INEXACT) {
        bits |= fflags::NX;
    }

    cpu.accrue_fflags(bits);
}

#[inline]
fn read_soft(cpu: &CpuCore, reg: u8) -> F32 {
    F32::from_bits(cpu.read_fp(reg))
}

#[inline]
fn write_soft(cpu: &mut CpuCore, reg: u8, value: F32) {
    cpu.write_fp(reg, value.into_bits());
}

/// signaling NaN 判定：指数全 1、尾数非零且最高尾数位为 0
#[inline]
fn is_signaling_nan_bits(bits: u32) -> bool {
    let exp = bits & 0x7F80_0000;
    let frac = bits & 0x007F_FFFF;
    exp == 0x7F80_0000 && frac != 0 && (frac & 0x0040_0000) == 0
}

#[inline]
fn is_nan_bits(bits: u32) -> bool {
    (bits & 0x7F80_0000) == 0x7F80_0000 && (bits & 0x007F_FFFF) != 0
}

/// FMIN/FMAX 的 IEEE-754 + RISC-V 语义：
/// - 一个操作数为 NaN 时返回另一个；两个都是 NaN 返回规范 NaN
/// - signaling NaN 置 NV
/// - -0 < +0
fn handle_min_max(cpu: &mut CpuCore, frd: u8, frs1: u8, frs2: u8, is_min: bool) {
    let a_bits = cpu.read_fp(frs1);
    let b_bits = cpu.read_fp(frs2);
    let a = f32::from_bits(a_bits);
    let b = f32::from_bits(b_bits);

    let a_nan = a.is_nan();
    let b_nan = b.is_nan();
    let mut flag_bits = 0;
    if is_signaling_nan_bits(a_bits) || is_signaling_nan_bits(b_bits) {
        flag_bits |= fflags::NV;
    }

    let result_bits = if a_nan && b_nan {
        CANONICAL_NAN
    } else if a_nan {
        b_bits
    } else if b_nan {
        a_bits
    } else if a == 0.0 && b == 0.0 {
        // ±0 比较：min 取 -0，max 取 +0
        if is_min {
            a_bits | b_bits // 任一为 -0 则符号位置位
        } else {
            a_bits & b_bits // 任一为 +0 则符号位清零
        }
    } else if a_bits == b_bits {
        a_bits
    } else {
        let choose_a = if is_min { a < b } else { a > b };
        if choose_a {
            a_bits
        } else {
            b_bits
        }
    };

    cpu.write_fp(frd, result_bits);
    cpu.accrue_fflags(flag_bits);
}

/// FCLASS.S 的 10-bit 分类掩码
fn fclass(bits: u32) -> u32 {
    let sign = bits >> 31;
    let exp = (bits >> 23) & 0xFF;
    let frac = bits & 0x007F_FFFF;

    if exp == 0xFF {
        if frac == 0 {
            // ±Inf
            if sign == 0 {
                1 << 7
            } else {
                1 << 0
            }
        } else if frac & 0x0040_0000 != 0 {
            // Quiet NaN
            1 << 9
        } else {
            // Signaling NaN
            1 << 8
        }
    } else if exp == 0 {
        if frac == 0 {
            // ±0
            if sign == 0 {
                1 << 4
            } else {
                1 << 3
            }
        } else {
            // ±subnormal
            if sign == 0 {
                1 << 5
            } else {
                1 << 2
            }
        }
    } else {
        // ±normal
        if sign == 0 {
            1 << 6
        } else {
            1 << 1
        }
    }
}

/// Execute RV32F (single-precision floating-point) instructions.
/// Returns true if handled.
pub fn execute(cpu: &mut CpuCore, mem: &mut dyn Memory, instr: RvInstr, current_pc: u32) -> bool {
    // F 扩展未启用时交还给保留指令路径
    if !cpu.has_fp() {
        return false;
    }

    // 保留的舍入模式编码走非法指令 trap
    macro_rules! rounding {
        ($rm:expr) => {
            match decode_rounding_mode(cpu, $rm) {
                Some(r) => r,
                None => {
                    let raw = cpu.curr_instr();
                    cpu.take_trap_at(TrapCause::IllegalInstruction, raw, current_pc);
                    return true;
                }
            }
        };
    }

    match instr {
        // ========== Load/Store ==========
        RvInstr::Flw { frd, rs1, offset } => {
            let addr = cpu.read_reg(rs1).wrapping_add(offset as u32);
            let result = mem.load32(addr);
            if let Some(value) = cpu.mem_load(result, addr, current_pc) {
                cpu.write_fp(frd, value);
            }
        }

        RvInstr::Fsw { frs2, rs1, offset } => {
            let addr = cpu.read_reg(rs1).wrapping_add(offset as u32);
            let result = mem.store32(addr, cpu.read_fp(frs2));
            cpu.mem_store(result, addr, current_pc);
        }

        // ========== Arithmetic ==========
        RvInstr::FaddS { frd, frs1, frs2, rm } => {
            let rounding = rounding!(rm);
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let mut fp_state = FPState::default();
            let result = a.add(&b, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        RvInstr::FsubS { frd, frs1, frs2, rm } => {
            let rounding = rounding!(rm);
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let mut fp_state = FPState::default();
            let result = a.sub(&b, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        RvInstr::FmulS { frd, frs1, frs2, rm } => {
            let rounding = rounding!(rm);
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let mut fp_state = FPState::default();
            let result = a.mul(&b, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        RvInstr::FdivS { frd, frs1, frs2, rm } => {
            let rounding = rounding!(rm);
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let mut fp_state = FPState::default();
            let result = a.div(&b, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        RvInstr::FsqrtS { frd, frs1, rm } => {
            let rounding = rounding!(rm);
            let a = read_soft(cpu, frs1);
            let mut fp_state = FPState::default();
            let result = a.sqrt(Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        // ========== Fused Multiply-Add ==========
        // 四条 FMA 族指令都映射到单次舍入的 fused_mul_add，
        // 负形式通过符号翻转组合得到
        RvInstr::FmaddS { frd, frs1, frs2, frs3, rm } => {
            let rounding = rounding!(rm);
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let c = read_soft(cpu, frs3);
            let mut fp_state = FPState::default();
            // fmadd: a * b + c
            let result = a.fused_mul_add(&b, &c, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        RvInstr::FmsubS { frd, frs1, frs2, frs3, rm } => {
            let rounding = rounding!(rm);
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let c = read_soft(cpu, frs3);
            let mut fp_state = FPState::default();
            // fmsub: a * b - c = a * b + (-c)
            let mut neg_c = c.clone();
            neg_c.toggle_sign();
            let result = a.fused_mul_add(&b, &neg_c, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        RvInstr::FnmaddS { frd, frs1, frs2, frs3, rm } => {
            let rounding = rounding!(rm);
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let c = read_soft(cpu, frs3);
            let mut fp_state = FPState::default();
            // fnmadd: -(a * b) - c = (-a) * b + (-c)
            let mut neg_a = a.clone();
            neg_a.toggle_sign();
            let mut neg_c = c.clone();
            neg_c.toggle_sign();
            let result = neg_a.fused_mul_add(&b, &neg_c, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        RvInstr::FnmsubS { frd, frs1, frs2, frs3, rm } => {
            let rounding = rounding!(rm);
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let c = read_soft(cpu, frs3);
            let mut fp_state = FPState::default();
            // fnmsub: -(a * b) + c = (-a) * b + c
            let mut neg_a = a.clone();
            neg_a.toggle_sign();
            let result = neg_a.fused_mul_add(&b, &c, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        // ========== Sign Injection（纯位操作，不产生异常）==========
        RvInstr::FsgnjS { frd, frs1, frs2 } => {
            let a = cpu.read_fp(frs1);
            let b = cpu.read_fp(frs2);
            // frs1 的幅值，frs2 的符号
            cpu.write_fp(frd, (a & 0x7FFF_FFFF) | (b & 0x8000_0000));
        }

        RvInstr::FsgnjnS { frd, frs1, frs2 } => {
            let a = cpu.read_fp(frs1);
            let b = cpu.read_fp(frs2);
            // frs1 的幅值，frs2 符号取反
            cpu.write_fp(frd, (a & 0x7FFF_FFFF) | (!b & 0x8000_0000));
        }

        RvInstr::FsgnjxS { frd, frs1, frs2 } => {
            let a = cpu.read_fp(frs1);
            let b = cpu.read_fp(frs2);
            // frs1 的值，符号位异或
            cpu.write_fp(frd, a ^ (b & 0x8000_0000));
        }

        // ========== Min/Max ==========
        RvInstr::FminS { frd, frs1, frs2 } => {
            handle_min_max(cpu, frd, frs1, frs2, true);
        }

        RvInstr::FmaxS { frd, frs1, frs2 } => {
            handle_min_max(cpu, frd, frs1, frs2, false);
        }

        // ========== Compare ==========
        RvInstr::FeqS { rd, frs1, frs2 } => {
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let mut fp_state = FPState::default();
            // quiet 比较：quiet NaN 不置 NV
            let result = a.compare_quiet(&b, Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            cpu.write_reg(rd, (result == Some(std::cmp::Ordering::Equal)) as u32);
        }

        RvInstr::FltS { rd, frs1, frs2 } => {
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let mut fp_state = FPState::default();
            // signaling 比较：任何 NaN 都置 NV
            let result = a.compare_signaling(&b, Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            cpu.write_reg(rd, (result == Some(std::cmp::Ordering::Less)) as u32);
        }

        RvInstr::FleS { rd, frs1, frs2 } => {
            let a = read_soft(cpu, frs1);
            let b = read_soft(cpu, frs2);
            let mut fp_state = FPState::default();
            let result = a.compare_signaling(&b, Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            let is_le = matches!(
                result,
                Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
            );
            cpu.write_reg(rd, is_le as u32);
        }

        // ========== Classification ==========
        RvInstr::FclassS { rd, frs1 } => {
            let bits = cpu.read_fp(frs1);
            cpu.write_reg(rd, fclass(bits));
        }

        // ========== Conversion: Float -> Integer ==========
        RvInstr::FcvtWS { rd, frs1, rm } => {
            let rounding = rounding!(rm);
            let value = read_soft(cpu, frs1);
            let bits = cpu.read_fp(frs1);
            let mut fp_state = FPState::default();
            // exact=true：结果不精确时置 NX
            let result = value.to_i32(true, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            // 越界/无效时按 RISC-V 规范饱和
            let int_result = result.unwrap_or_else(|| {
                if is_nan_bits(bits) {
                    i32::MAX
                } else if bits & 0x8000_0000 != 0 {
                    i32::MIN
                } else {
                    i32::MAX
                }
            });
            cpu.write_reg(rd, int_result as u32);
        }

        RvInstr::FcvtWuS { rd, frs1, rm } => {
            let rounding = rounding!(rm);
            let value = read_soft(cpu, frs1);
            let bits = cpu.read_fp(frs1);
            let mut fp_state = FPState::default();
            let result = value.to_u32(true, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            let int_result = result.unwrap_or_else(|| {
                if is_nan_bits(bits) || bits & 0x8000_0000 == 0 {
                    u32::MAX
                } else {
                    0
                }
            });
            cpu.write_reg(rd, int_result);
        }

        // ========== Conversion: Integer -> Float ==========
        RvInstr::FcvtSW { frd, rs1, rm } => {
            let rounding = rounding!(rm);
            let value = cpu.read_reg(rs1) as i32;
            let mut fp_state = FPState::default();
            let result = F32::from_i32(value, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        RvInstr::FcvtSWu { frd, rs1, rm } => {
            let rounding = rounding!(rm);
            let value = cpu.read_reg(rs1);
            let mut fp_state = FPState::default();
            let result = F32::from_u32(value, Some(rounding), Some(&mut fp_state));
            apply_fp_state(cpu, &fp_state);
            write_soft(cpu, frd, result);
        }

        // ========== Move（位精确，不做 NaN 规范化）==========
        RvInstr::FmvXW { rd, frs1 } => {
            cpu.write_reg(rd, cpu.read_fp(frs1));
        }

        RvInstr::FmvWX { frd, rs1 } => {
            cpu.write_fp(frd, cpu.read_reg(rs1));
        }

        _ => return false,
    }

    true
}
