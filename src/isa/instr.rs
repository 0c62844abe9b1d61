//! 指令的语义表示，解码与执行阶段共用
//!
//! 解码阶段一次性完成字段提取与符号扩展，执行阶段直接对枚举变体做
//! 匹配。每个变体携带该指令需要的全部操作数，因此执行单元不再接触
//! 原始编码（原始字只保留在 `DecodedInstr::raw` 中，供 trap 的 mtval
//! 与运行时反汇编使用）。

/// RV32 指令的语义化表示
///
/// 压缩指令（C 扩展）在取指阶段展开为这里的规范形式，之后与 32 位
/// 指令走完全相同的执行路径。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RvInstr {
    // ========== R-type 算术/逻辑指令 ==========
    /// ADD: rd = rs1 + rs2
    Add { rd: u8, rs1: u8, rs2: u8 },
    /// SUB: rd = rs1 - rs2
    Sub { rd: u8, rs1: u8, rs2: u8 },
    /// AND: rd = rs1 & rs2
    And { rd: u8, rs1: u8, rs2: u8 },
    /// OR: rd = rs1 | rs2
    Or { rd: u8, rs1: u8, rs2: u8 },
    /// XOR: rd = rs1 ^ rs2
    Xor { rd: u8, rs1: u8, rs2: u8 },
    /// SLT: rd = (rs1 < rs2) ? 1 : 0 (有符号比较)
    Slt { rd: u8, rs1: u8, rs2: u8 },
    /// SLTU: rd = (rs1 < rs2) ? 1 : 0 (无符号比较)
    Sltu { rd: u8, rs1: u8, rs2: u8 },
    /// SLL: rd = rs1 << rs2[4:0]
    Sll { rd: u8, rs1: u8, rs2: u8 },
    /// SRL: rd = rs1 >> rs2[4:0] (逻辑右移)
    Srl { rd: u8, rs1: u8, rs2: u8 },
    /// SRA: rd = rs1 >> rs2[4:0] (算术右移)
    Sra { rd: u8, rs1: u8, rs2: u8 },

    // ========== I-type 立即数算术/逻辑指令 ==========
    /// ADDI: rd = rs1 + imm
    Addi { rd: u8, rs1: u8, imm: i32 },
    /// ANDI: rd = rs1 & imm
    Andi { rd: u8, rs1: u8, imm: i32 },
    /// ORI: rd = rs1 | imm
    Ori { rd: u8, rs1: u8, imm: i32 },
    /// XORI: rd = rs1 ^ imm
    Xori { rd: u8, rs1: u8, imm: i32 },
    /// SLTI: rd = (rs1 < imm) ? 1 : 0 (有符号比较)
    Slti { rd: u8, rs1: u8, imm: i32 },
    /// SLTIU: rd = (rs1 < imm) ? 1 : 0 (无符号比较)
    Sltiu { rd: u8, rs1: u8, imm: i32 },
    /// SLLI: rd = rs1 << shamt
    Slli { rd: u8, rs1: u8, shamt: u8 },
    /// SRLI: rd = rs1 >> shamt (逻辑右移)
    Srli { rd: u8, rs1: u8, shamt: u8 },
    /// SRAI: rd = rs1 >> shamt (算术右移)
    Srai { rd: u8, rs1: u8, shamt: u8 },

    // ========== Load 指令 ==========
    /// LB: rd = sign_extend(mem8[rs1 + offset])
    Lb { rd: u8, rs1: u8, offset: i32 },
    /// LH: rd = sign_extend(mem16[rs1 + offset])
    Lh { rd: u8, rs1: u8, offset: i32 },
    /// LW: rd = mem32[rs1 + offset]
    Lw { rd: u8, rs1: u8, offset: i32 },
    /// LBU: rd = zero_extend(mem8[rs1 + offset])
    Lbu { rd: u8, rs1: u8, offset: i32 },
    /// LHU: rd = zero_extend(mem16[rs1 + offset])
    Lhu { rd: u8, rs1: u8, offset: i32 },

    // ========== Store 指令 ==========
    /// SB: mem8[rs1 + offset] = rs2[7:0]
    Sb { rs1: u8, rs2: u8, offset: i32 },
    /// SH: mem16[rs1 + offset] = rs2[15:0]
    Sh { rs1: u8, rs2: u8, offset: i32 },
    /// SW: mem32[rs1 + offset] = rs2
    Sw { rs1: u8, rs2: u8, offset: i32 },

    // ========== U-type 指令 ==========
    /// LUI: rd = imm << 12
    Lui { rd: u8, imm: i32 },
    /// AUIPC: rd = pc + (imm << 12)
    Auipc { rd: u8, imm: i32 },

    // ========== 控制流指令 ==========
    /// JAL: rd = pc + instr_len; pc = pc + offset
    Jal { rd: u8, offset: i32 },
    /// JALR: rd = pc + instr_len; pc = (rs1 + offset) & !1
    Jalr { rd: u8, rs1: u8, offset: i32 },
    /// BEQ: if (rs1 == rs2) pc = pc + offset
    Beq { rs1: u8, rs2: u8, offset: i32 },
    /// BNE: if (rs1 != rs2) pc = pc + offset
    Bne { rs1: u8, rs2: u8, offset: i32 },
    /// BLT: if (rs1 < rs2) pc = pc + offset (有符号)
    Blt { rs1: u8, rs2: u8, offset: i32 },
    /// BGE: if (rs1 >= rs2) pc = pc + offset (有符号)
    Bge { rs1: u8, rs2: u8, offset: i32 },
    /// BLTU: if (rs1 < rs2) pc = pc + offset (无符号)
    Bltu { rs1: u8, rs2: u8, offset: i32 },
    /// BGEU: if (rs1 >= rs2) pc = pc + offset (无符号)
    Bgeu { rs1: u8, rs2: u8, offset: i32 },

    // ========== 系统指令 ==========
    /// ECALL: 环境调用
    Ecall,
    /// EBREAK: 断点
    Ebreak,
    /// FENCE: 内存顺序栅栏，单 hart 模型中视为立即完成
    Fence { pred: u8, succ: u8, fm: u8 },

    // ========== M 扩展（乘除法）==========
    /// MUL: rd = (rs1 * rs2)[31:0]
    Mul { rd: u8, rs1: u8, rs2: u8 },
    /// MULH: rd = (rs1 * rs2)[63:32] (signed * signed)
    Mulh { rd: u8, rs1: u8, rs2: u8 },
    /// MULHSU: rd = (rs1 * rs2)[63:32] (signed * unsigned)
    Mulhsu { rd: u8, rs1: u8, rs2: u8 },
    /// MULHU: rd = (rs1 * rs2)[63:32] (unsigned * unsigned)
    Mulhu { rd: u8, rs1: u8, rs2: u8 },
    /// DIV: rd = rs1 / rs2 (signed)
    Div { rd: u8, rs1: u8, rs2: u8 },
    /// DIVU: rd = rs1 / rs2 (unsigned)
    Divu { rd: u8, rs1: u8, rs2: u8 },
    /// REM: rd = rs1 % rs2 (signed)
    Rem { rd: u8, rs1: u8, rs2: u8 },
    /// REMU: rd = rs1 % rs2 (unsigned)
    Remu { rd: u8, rs1: u8, rs2: u8 },

    // ========== Zicsr 扩展（CSR 操作）==========
    /// CSRRW: t = CSR[csr]; CSR[csr] = rs1; rd = t
    Csrrw { rd: u8, rs1: u8, csr: u16 },
    /// CSRRS: t = CSR[csr]; CSR[csr] = t | rs1; rd = t
    /// （rs1 = x0 时为纯读取，不发生写副作用）
    Csrrs { rd: u8, rs1: u8, csr: u16 },
    /// CSRRC: t = CSR[csr]; CSR[csr] = t & ~rs1; rd = t
    /// （rs1 = x0 时为纯读取，不发生写副作用）
    Csrrc { rd: u8, rs1: u8, csr: u16 },
    /// CSRRWI: t = CSR[csr]; CSR[csr] = zimm; rd = t
    Csrrwi { rd: u8, zimm: u8, csr: u16 },
    /// CSRRSI: t = CSR[csr]; CSR[csr] = t | zimm; rd = t
    Csrrsi { rd: u8, zimm: u8, csr: u16 },
    /// CSRRCI: t = CSR[csr]; CSR[csr] = t & ~zimm; rd = t
    Csrrci { rd: u8, zimm: u8, csr: u16 },

    // ========== 特权指令 ==========
    /// MRET: 从 M-mode trap handler 返回
    ///
    /// PC = mepc，MIE = MPIE，MPIE = 1，特权级 = MPP，MPP = U
    Mret,

    /// WFI: 暂停执行直到有中断待处理
    Wfi,

    // ========== F 扩展（单精度浮点）==========
    /// FLW: 从内存加载单精度浮点数 frd = M[rs1 + offset]
    Flw { frd: u8, rs1: u8, offset: i32 },
    /// FSW: 存储单精度浮点数到内存 M[rs1 + offset] = frs2
    Fsw { frs2: u8, rs1: u8, offset: i32 },

    /// FADD.S: 单精度浮点加法
    FaddS { frd: u8, frs1: u8, frs2: u8, rm: u8 },
    /// FSUB.S: 单精度浮点减法
    FsubS { frd: u8, frs1: u8, frs2: u8, rm: u8 },
    /// FMUL.S: 单精度浮点乘法
    FmulS { frd: u8, frs1: u8, frs2: u8, rm: u8 },
    /// FDIV.S: 单精度浮点除法
    FdivS { frd: u8, frs1: u8, frs2: u8, rm: u8 },
    /// FSQRT.S: 单精度浮点平方根
    FsqrtS { frd: u8, frs1: u8, rm: u8 },

    /// FMADD.S: 融合乘加 frd = frs1 * frs2 + frs3（单次舍入）
    FmaddS { frd: u8, frs1: u8, frs2: u8, frs3: u8, rm: u8 },
    /// FMSUB.S: 融合乘减 frd = frs1 * frs2 - frs3
    FmsubS { frd: u8, frs1: u8, frs2: u8, frs3: u8, rm: u8 },
    /// FNMADD.S: 负融合乘加 frd = -(frs1 * frs2) - frs3
    FnmaddS { frd: u8, frs1: u8, frs2: u8, frs3: u8, rm: u8 },
    /// FNMSUB.S: 负融合乘减 frd = -(frs1 * frs2) + frs3
    FnmsubS { frd: u8, frs1: u8, frs2: u8, frs3: u8, rm: u8 },

    /// FSGNJ.S: 符号注入（取 frs2 的符号）
    FsgnjS { frd: u8, frs1: u8, frs2: u8 },
    /// FSGNJN.S: 符号注入（取 frs2 符号的反）
    FsgnjnS { frd: u8, frs1: u8, frs2: u8 },
    /// FSGNJX.S: 符号注入（符号异或）
    FsgnjxS { frd: u8, frs1: u8, frs2: u8 },

    /// FMIN.S: 取最小值（NaN 与 ±0 规则见执行单元）
    FminS { frd: u8, frs1: u8, frs2: u8 },
    /// FMAX.S: 取最大值
    FmaxS { frd: u8, frs1: u8, frs2: u8 },

    /// FEQ.S: 浮点相等比较（quiet），结果写入整数寄存器
    FeqS { rd: u8, frs1: u8, frs2: u8 },
    /// FLT.S: 浮点小于比较（signaling）
    FltS { rd: u8, frs1: u8, frs2: u8 },
    /// FLE.S: 浮点小于等于比较（signaling）
    FleS { rd: u8, frs1: u8, frs2: u8 },

    /// FCVT.W.S: 浮点转有符号整数（越界饱和并置 NV）
    FcvtWS { rd: u8, frs1: u8, rm: u8 },
    /// FCVT.WU.S: 浮点转无符号整数（越界饱和并置 NV）
    FcvtWuS { rd: u8, frs1: u8, rm: u8 },
    /// FCVT.S.W: 有符号整数转浮点
    FcvtSW { frd: u8, rs1: u8, rm: u8 },
    /// FCVT.S.WU: 无符号整数转浮点
    FcvtSWu { frd: u8, rs1: u8, rm: u8 },

    /// FMV.X.W: 浮点寄存器位模式移动到整数寄存器（位精确）
    FmvXW { rd: u8, frs1: u8 },
    /// FMV.W.X: 整数寄存器位模式移动到浮点寄存器（位精确）
    FmvWX { frd: u8, rs1: u8 },
    /// FCLASS.S: 浮点分类，10-bit 掩码写入整数寄存器
    FclassS { rd: u8, frs1: u8 },

    // ========== 特殊 ==========
    /// 非法/保留指令，raw 为原始编码（用于 mtval 与保留指令停机）
    Illegal { raw: u32 },
}

/// 已解码的指令
///
/// 原始编码与语义表示成对出现：raw 供 mtval 与运行时反汇编使用。
/// 压缩指令展开后 raw 存放 16-bit 原始编码（零扩展）。
#[derive(Debug, Clone, Copy)]
pub struct DecodedInstr {
    /// 原始指令编码
    pub raw: u32,
    /// 解码后的语义表示
    pub instr: RvInstr,
}
