//! CPU 核心与执行引擎
//!
//! 定义周期记账、指令精确的 RV32 执行核 `CpuCore`：hart 架构状态、
//! 取指/解码/执行/退休的单步循环、trap 交付与中断仲裁。扩展以能力
//! 组合方式装配：解码表片段在构建时合并（见 `isa::IsaConfig`），
//! 执行单元按扩展拆分在 `exu` 下，压缩取指与对齐规则由 C 扩展标志
//! 控制。

use std::sync::Arc;

use log::debug;

use crate::isa::{self, rv32c, DecodedInstr, DecoderRegistry, RvInstr};
use crate::memory::{MemError, Memory};

pub mod csr_def;
mod builder;
mod exu;
mod status;
pub mod trap;

use csr_def::*;
use status::Status;
use trap::{calculate_trap_pc, highest_priority_interrupt, mip, mstatus};

pub use builder::CpuBuilder;
pub use status::{CsrEntry, StatusSnapshot};
pub use trap::{PrivilegeMode, TrapCause};

/// trap 交付在单周期执行模型上的额外周期开销
pub const TRAP_EXTRA_CYCLES: u64 = 5;

/// CPU 执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    /// 正常运行中
    Running,
    /// 等待中断 (WFI 指令)
    WaitForInterrupt,
    /// 遇到保留/非法指令且配置为停机（halt_on_reserved）
    IllegalInstruction(u32),
    /// 配置性停机
    Halted(HaltCause),
}

/// 配置性停机原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCause {
    /// EBREAK 且 halt_on_ebreak 置位
    Ebreak,
    /// ECALL 且 halt_on_ecall 置位
    Ecall,
    /// 中断回调通道请求停止
    StopRequest,
}

/// 中断回调的返回值
///
/// `pending` 为本步的待处理中断电平（mip 的 MSI/MTI/MEI 位），
/// 与内部 mip 按位或合并；`stop` 为嵌入方的显式停止请求。
#[derive(Debug, Clone, Copy, Default)]
pub struct IntRequest {
    pub pending: u32,
    pub stop: bool,
}

/// 中断回调：每个执行步开始时调用一次
pub type IntCallback = Box<dyn FnMut() -> IntRequest>;

/// 单个 hart 的架构状态（寄存器文件 + CSR + PC）
pub struct Hart {
    pub(crate) status: Status,
    pub(crate) pc: u32,
}

/// 单个 hart 的完整快照（保存/恢复流程）
///
/// 布局在单次构建内保持稳定。
#[derive(Clone, Debug)]
pub struct HartSnapshot {
    pub status: StatusSnapshot,
    pub pc: u32,
    pub cycle_count: u64,
    pub instret_count: u64,
}

/// 周期记账、指令精确的 RV32 执行核
///
/// 设计约定：
/// - x0 永远为 0，写入时丢弃
/// - PC 为字节地址；无 C 扩展时 4 字节对齐，有 C 扩展时 2 字节对齐
/// - hart 数组在构建时定容；多 hart 由外层循环轮转调度，核内无并行
/// - 指令路径上没有动态分配
pub struct CpuCore {
    /// hart 数组（通常为 1）
    harts: Vec<Hart>,
    /// 当前活动 hart
    curr_hart: usize,
    /// 当前 CPU 状态
    state: CpuState,
    /// 指令解码器（按扩展组合）
    decoder: Arc<DecoderRegistry>,
    /// C 扩展存在：半字取指，对齐掩码为 1
    has_c: bool,

    // ---- 内部仿真状态 ----
    /// 时钟周期计数（每条退休指令 +1，trap 额外加 TRAP_EXTRA_CYCLES）
    cycle_count: u64,
    /// 退休指令计数（发生同步 trap 的指令不计）
    instret_count: u64,
    /// 定时器比较器（mtime 以 cycle 计）
    mtimecmp: u64,
    /// 最近一次访存/跳转目标地址（trap 报告用）
    access_addr: u32,
    /// 当前指令的原始编码
    curr_instr: u32,
    /// 刚取的指令是否为压缩形式
    last_compressed: bool,
    /// 本步是否发生了同步 trap（抑制 instret）
    trap_taken: bool,
    /// 复位向量
    reset_vector: u32,

    // ---- 停机配置 ----
    halt_on_ebreak: bool,
    halt_on_ecall: bool,
    halt_on_reserved: bool,

    // ---- 外部集成 ----
    int_callback: Option<IntCallback>,
    /// 回调报告的中断电平（每步刷新）
    ext_irq: u32,
}

impl CpuCore {
    /// 创建一个仅含 RV32I 的 CPU 核心
    ///
    /// # 参数
    ///
    /// * `reset_vector` - 复位后的初始 PC
    pub fn new(reset_vector: u32) -> Self {
        let decoder = Arc::new(isa::IsaConfig::new().build().expect("RV32I should not conflict"));
        // trap 交付依赖 M-mode CSR 机制在场；Zicsr 扩展只控制 CSR
        // 指令是否可用
        let mut status = Status::new();
        status.csr.register(csr_def::BASE_CSRS);
        status.csr.register(csr_def::M_CSRS);
        status.csr.register(&[CsrEntry {
            name: "misa",
            addr: CSR_MISA,
            reset: misa::MXL_32 | misa::EXT_I,
            wr_mask: 0,
        }]);
        Self::with_config(reset_vector, status, decoder, false, 1)
    }

    /// 使用预配置的状态和解码器创建 CPU 核心（由 CpuBuilder 调用）
    pub(crate) fn with_config(
        reset_vector: u32,
        status: Status,
        decoder: Arc<DecoderRegistry>,
        has_c: bool,
        num_harts: usize,
    ) -> Self {
        let harts = (0..num_harts.max(1))
            .map(|_| Hart {
                status: status.clone(),
                pc: reset_vector,
            })
            .collect();

        CpuCore {
            harts,
            curr_hart: 0,
            state: CpuState::Running,
            decoder,
            has_c,
            cycle_count: 0,
            instret_count: 0,
            mtimecmp: 0,
            access_addr: 0,
            curr_instr: 0,
            last_compressed: false,
            trap_taken: false,
            reset_vector,
            halt_on_ebreak: false,
            halt_on_ecall: false,
            halt_on_reserved: false,
            int_callback: None,
            ext_irq: 0,
        }
    }

    // ========== 基本访问器 ==========

    #[inline]
    fn hart(&self) -> &Hart {
        &self.harts[self.curr_hart]
    }

    #[inline]
    fn hart_mut(&mut self) -> &mut Hart {
        &mut self.harts[self.curr_hart]
    }

    /// hart 数量
    pub fn num_harts(&self) -> usize {
        self.harts.len()
    }

    /// 切换当前活动 hart（外层轮转调度用）
    pub fn select_hart(&mut self, hart: usize) {
        if hart < self.harts.len() {
            self.curr_hart = hart;
        }
    }

    /// 获取当前程序计数器值
    pub fn pc(&self) -> u32 {
        self.hart().pc
    }

    /// 设置程序计数器
    pub fn set_pc(&mut self, pc: u32) {
        self.hart_mut().pc = pc;
    }

    /// 获取当前 CPU 状态
    pub fn state(&self) -> CpuState {
        self.state
    }

    /// 设置 CPU 状态
    pub fn set_state(&mut self, state: CpuState) {
        self.state = state;
    }

    /// 读取整数寄存器（x0 总是返回 0）
    pub fn read_reg(&self, reg: u8) -> u32 {
        self.hart().status.int_read(reg)
    }

    /// 写入整数寄存器（对 x0 的写入被丢弃）
    pub fn write_reg(&mut self, reg: u8, value: u32) {
        self.hart_mut().status.int_write(reg, value)
    }

    /// 读取浮点寄存器位模式；F 扩展未启用时返回 0
    pub fn read_fp(&self, reg: u8) -> u32 {
        self.hart().status.fp.as_ref().map(|fp| fp.read(reg)).unwrap_or(0)
    }

    /// 写入浮点寄存器位模式；F 扩展未启用时忽略
    pub fn write_fp(&mut self, reg: u8, value: u32) {
        if let Some(fp) = self.hart_mut().status.fp.as_mut() {
            fp.write(reg, value);
        }
    }

    /// 以 f32 读取浮点寄存器
    pub fn read_fp_f32(&self, reg: u8) -> f32 {
        f32::from_bits(self.read_fp(reg))
    }

    /// 以 f32 写入浮点寄存器
    pub fn write_fp_f32(&mut self, reg: u8, value: f32) {
        self.write_fp(reg, value.to_bits());
    }

    /// 检查是否启用了浮点扩展
    pub fn has_fp(&self) -> bool {
        self.hart().status.fp.is_some()
    }

    /// 检查是否启用了 C 扩展
    pub fn has_c(&self) -> bool {
        self.has_c
    }

    /// 当前特权级
    pub fn privilege(&self) -> PrivilegeMode {
        self.hart().status.privilege
    }

    pub fn set_privilege(&mut self, mode: PrivilegeMode) {
        self.hart_mut().status.privilege = mode;
    }

    /// 时钟周期计数
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// 退休指令计数
    pub fn instret_count(&self) -> u64 {
        self.instret_count
    }

    /// 最近一次访存/跳转目标地址（trap 报告）
    pub fn last_access_addr(&self) -> u32 {
        self.access_addr
    }

    /// 当前指令的原始编码
    pub fn curr_instr(&self) -> u32 {
        self.curr_instr
    }

    /// 复位向量
    pub fn reset_vector(&self) -> u32 {
        self.reset_vector
    }

    /// 设置复位向量（下次 reset 生效）
    pub fn set_reset_vector(&mut self, vector: u32) {
        self.reset_vector = vector;
    }

    /// 指令地址对齐掩码：有 C 扩展时跳转目标只需半字对齐
    #[inline]
    pub fn iaddr_align_mask(&self) -> u32 {
        if self.has_c {
            1
        } else {
            3
        }
    }

    /// 刚退休的指令长度（字节）
    #[inline]
    pub fn last_instr_len(&self) -> u32 {
        if self.last_compressed {
            2
        } else {
            4
        }
    }

    // ========== 停机配置与外部集成 ==========

    /// EBREAK 停机而不触发断点异常
    pub fn set_halt_on_ebreak(&mut self, on: bool) {
        self.halt_on_ebreak = on;
    }

    pub fn halt_on_ebreak(&self) -> bool {
        self.halt_on_ebreak
    }

    pub fn halt_on_ecall(&self) -> bool {
        self.halt_on_ecall
    }

    pub fn halt_on_reserved(&self) -> bool {
        self.halt_on_reserved
    }

    /// ECALL 停机而不触发环境调用异常
    pub fn set_halt_on_ecall(&mut self, on: bool) {
        self.halt_on_ecall = on;
    }

    /// 保留指令停机而不触发非法指令异常
    pub fn set_halt_on_reserved(&mut self, on: bool) {
        self.halt_on_reserved = on;
    }

    /// 注册中断回调（每个执行步开始时调用一次）
    pub fn register_int_callback(&mut self, callback: IntCallback) {
        self.int_callback = Some(callback);
    }

    // ========== CSR 访问 ==========

    /// 受信任路径的 CSR 读取（trap 交付等内部用途）
    ///
    /// 计数器、定时器与 fflags/frm 别名在这里被截获；
    /// 未注册地址返回 0
    pub fn csr_read(&self, addr: u16) -> u32 {
        match addr {
            CSR_CYCLE | CSR_MCYCLE | CSR_TIME => self.cycle_count as u32,
            CSR_CYCLEH | CSR_MCYCLEH | CSR_TIMEH => (self.cycle_count >> 32) as u32,
            CSR_INSTRET | CSR_MINSTRET => self.instret_count as u32,
            CSR_INSTRETH | CSR_MINSTRETH => (self.instret_count >> 32) as u32,
            CSR_MTIMECMP => self.mtimecmp as u32,
            CSR_MTIMECMPH => (self.mtimecmp >> 32) as u32,
            CSR_FFLAGS => self.hart().status.csr.read(CSR_FCSR).unwrap_or(0) & FCSR_FLAGS_MASK,
            CSR_FRM => {
                (self.hart().status.csr.read(CSR_FCSR).unwrap_or(0) & FCSR_RM_MASK) >> FCSR_RM_SHIFT
            }
            CSR_MIP => self.mip_value(),
            _ => self.hart().status.csr.read(addr).unwrap_or(0),
        }
    }

    /// 受信任路径的 CSR 写入；未注册地址为 no-op
    pub fn csr_write(&mut self, addr: u16, value: u32) {
        let _ = self.csr_write_checked(addr, value);
    }

    /// 指令路径的 CSR 读取：未注册地址返回 None（非法指令）
    pub(crate) fn csr_read_checked(&self, addr: u16) -> Option<u32> {
        if !self.hart().status.csr.is_implemented(addr) {
            return None;
        }
        Some(self.csr_read(addr))
    }

    /// 指令路径的 CSR 写入：未注册地址返回 None（非法指令）
    ///
    /// 按各寄存器的可写位掩码写入；计数器与别名视图被截获
    pub(crate) fn csr_write_checked(&mut self, addr: u16, value: u32) -> Option<()> {
        if !self.hart().status.csr.is_implemented(addr) {
            return None;
        }

        match addr {
            CSR_MCYCLE => {
                self.cycle_count = (self.cycle_count & !0xFFFF_FFFF) | value as u64;
            }
            CSR_MCYCLEH => {
                self.cycle_count = (self.cycle_count & 0xFFFF_FFFF) | ((value as u64) << 32);
            }
            CSR_MINSTRET => {
                self.instret_count = (self.instret_count & !0xFFFF_FFFF) | value as u64;
            }
            CSR_MINSTRETH => {
                self.instret_count = (self.instret_count & 0xFFFF_FFFF) | ((value as u64) << 32);
            }
            CSR_MTIMECMP => {
                self.mtimecmp = (self.mtimecmp & !0xFFFF_FFFF) | value as u64;
            }
            CSR_MTIMECMPH => {
                self.mtimecmp = (self.mtimecmp & 0xFFFF_FFFF) | ((value as u64) << 32);
            }
            CSR_FFLAGS => {
                let fcsr = self.csr_read(CSR_FCSR);
                let new = (fcsr & !FCSR_FLAGS_MASK) | (value & FCSR_FLAGS_MASK);
                self.hart_mut().status.csr.force_write(CSR_FCSR, new);
            }
            CSR_FRM => {
                let fcsr = self.csr_read(CSR_FCSR);
                let new = (fcsr & !FCSR_RM_MASK) | ((value & 0x7) << FCSR_RM_SHIFT);
                self.hart_mut().status.csr.force_write(CSR_FCSR, new);
            }
            _ => {
                self.hart_mut().status.csr.write(addr, value)?;
            }
        }

        Some(())
    }

    /// 动态舍入模式（frm 字段）
    pub fn frm(&self) -> u8 {
        self.csr_read(CSR_FRM) as u8
    }

    /// 累积浮点异常标志到 fflags
    pub fn accrue_fflags(&mut self, flags: u32) {
        if flags != 0 {
            let fcsr = self.csr_read(CSR_FCSR);
            self.hart_mut()
                .status
                .csr
                .force_write(CSR_FCSR, fcsr | (flags & FCSR_FLAGS_MASK));
        }
    }

    /// 当前有效的 mip 值：软件位 | 外部回调电平 | 定时器比较
    fn mip_value(&self) -> u32 {
        let soft = self.hart().status.csr.read(CSR_MIP).unwrap_or(0);
        let timer = if self.mtimecmp != 0 && self.cycle_count >= self.mtimecmp {
            mip::MTI_MASK
        } else {
            0
        };
        soft | timer | (self.ext_irq & mip::M_MASK)
    }

    // ========== Trap 交付 ==========

    /// 以当前 PC 为异常 PC 触发 trap
    pub fn take_trap(&mut self, cause: TrapCause, tval: u32) {
        self.take_trap_at(cause, tval, self.pc());
    }

    /// 在指定 PC 处触发 trap（异常指向触发指令，中断指向下一条指令）
    ///
    /// 执行 RISC-V 特权规范的 M-mode trap 交付：
    /// 1. mepc <- epc
    /// 2. mcause <- cause（中断置 bit 31）
    /// 3. mtval <- tval（错误地址或非法指令编码）
    /// 4. mstatus: MPIE <- MIE, MIE <- 0, MPP <- 当前特权级
    /// 5. 特权级 <- Machine
    /// 6. pc <- mtvec（direct）或 mtvec.base + 4*cause（vectored，仅中断）
    pub fn take_trap_at(&mut self, cause: TrapCause, tval: u32, epc: u32) {
        debug!(
            "trap: cause={:?} tval=0x{:08x} epc=0x{:08x}",
            cause, tval, epc
        );

        self.csr_write(CSR_MEPC, epc);
        self.hart_mut().status.csr.force_write(CSR_MCAUSE, cause.to_cause_value());
        self.hart_mut().status.csr.force_write(CSR_MTVAL, tval);

        // mstatus: MPIE <- MIE, MIE <- 0, MPP <- 当前特权级
        let old = self.csr_read(CSR_MSTATUS);
        let mut new = old;
        if mstatus::read_mie(old) {
            new |= mstatus::MPIE_MASK;
        } else {
            new &= !mstatus::MPIE_MASK;
        }
        new &= !mstatus::MIE_MASK;
        new = mstatus::write_mpp(new, self.privilege().to_bits());
        self.hart_mut().status.csr.force_write(CSR_MSTATUS, new);

        self.set_privilege(PrivilegeMode::Machine);

        let mtvec = self.csr_read(CSR_MTVEC);
        let target = calculate_trap_pc(mtvec, &cause);
        self.set_pc(target);

        self.cycle_count += TRAP_EXTRA_CYCLES;
        self.trap_taken = true;
    }

    // ========== 中断仲裁 ==========

    /// 每步执行前的中断处理
    ///
    /// 先咨询中断回调刷新外部电平（并检查停止请求），再按
    /// MEI > MSI > MTI 的优先级仲裁；只有 mstatus.MIE、对应 mie 位
    /// 与对应 mip 位同时置位的中断才被接受。接受的中断把 mepc 指向
    /// 下一条将要执行的指令（当前 PC）。
    ///
    /// 返回 true 如果接受了一个中断
    pub fn process_interrupts(&mut self) -> bool {
        if let Some(cb) = self.int_callback.as_mut() {
            let req = cb();
            self.ext_irq = req.pending & mip::M_MASK;
            if req.stop {
                self.state = CpuState::Halted(HaltCause::StopRequest);
                return false;
            }
        }

        if !mstatus::read_mie(self.csr_read(CSR_MSTATUS)) {
            return false;
        }

        let pending = self.mip_value() & self.csr_read(CSR_MIE);
        let Some(cause) = highest_priority_interrupt(pending) else {
            return false;
        };

        let next_pc = self.pc();
        self.take_trap_at(cause, 0, next_pc);
        self.state = CpuState::Running;
        true
    }

    // ========== 取指 ==========

    /// 取指并解码一条指令，返回解码结果与指令长度（字节）
    ///
    /// C 扩展存在时按半字取指：低半字 bits [1:0] != 11 则展开
    /// 16-bit 编码，否则再取高半字拼成 32-bit 字
    fn fetch_instruction(&self, mem: &mut dyn Memory) -> Result<(DecodedInstr, u32), MemError> {
        let pc = self.pc();

        if self.has_c {
            let lo = mem.load16(pc)? as u32;
            if rv32c::is_compressed(lo) {
                let instr = rv32c::expand(lo as u16, self.has_fp())
                    .unwrap_or(RvInstr::Illegal { raw: lo });
                return Ok((DecodedInstr { raw: lo, instr }, 2));
            }
            let hi = mem.load16(pc.wrapping_add(2))? as u32;
            let word = lo | (hi << 16);
            Ok((self.decoder.decode(word), 4))
        } else {
            let word = mem.load32(pc)?;
            Ok((self.decoder.decode(word), 4))
        }
    }

    /// 无副作用地取指并解码当前 PC 处的指令（trace/调试用）
    ///
    /// 不推进 PC、不更新计数器；取指失败返回 None
    pub fn peek_instruction(&self, mem: &mut dyn Memory) -> Option<(DecodedInstr, u32)> {
        self.fetch_instruction(mem).ok()
    }

    // ========== 执行步 ==========

    /// 执行单步指令
    ///
    /// # 流程
    ///
    /// 1. 处理中断（可能把 PC 重定向到 handler，或响应停止请求）
    /// 2. 从 PC 处取指并解码（压缩形式先展开）
    /// 3. 默认 PC += 指令长度
    /// 4. 执行指令（可能修改 PC 或触发 trap）
    /// 5. 退休记账：cycle +1；未发生同步 trap 时 instret +1
    pub fn step(&mut self, mem: &mut dyn Memory) -> CpuState {
        match self.state {
            CpuState::Running => {
                self.process_interrupts();
            }
            CpuState::WaitForInterrupt => {
                // WFI 挂起：有待处理的使能中断时恢复执行
                if self.process_interrupts() {
                    self.state = CpuState::Running;
                }
                if self.state != CpuState::Running {
                    return self.state;
                }
            }
            _ => return self.state,
        }

        if self.state != CpuState::Running {
            // 中断回调请求了停止
            return self.state;
        }

        self.trap_taken = false;
        let current_pc = self.pc();

        let (decoded, len) = match self.fetch_instruction(mem) {
            Ok(fetched) => fetched,
            Err(err) => {
                self.access_addr = current_pc;
                let cause = match err {
                    MemError::Unaligned { .. } => TrapCause::InstructionAddressMisaligned,
                    _ => TrapCause::InstructionAccessFault,
                };
                self.take_trap_at(cause, current_pc, current_pc);
                self.cycle_count += 1;
                return self.state;
            }
        };

        self.curr_instr = decoded.raw;
        self.last_compressed = len == 2;

        // 默认顺序执行
        self.set_pc(current_pc.wrapping_add(len));

        self.execute(mem, decoded, current_pc);

        self.cycle_count += 1;
        if !self.trap_taken {
            self.instret_count += 1;
        }

        self.state
    }

    /// 运行多条指令，直到状态离开 Running 或达到最大指令数
    ///
    /// 返回本次调用实际执行的步数和最终 CPU 状态
    pub fn run(&mut self, mem: &mut dyn Memory, max_instructions: u64) -> (u64, CpuState) {
        let mut executed = 0;
        for _ in 0..max_instructions {
            let state = self.step(mem);
            executed += 1;
            if state != CpuState::Running {
                return (executed, state);
            }
        }
        (executed, self.state)
    }

    /// 执行已解码的指令，委托到分 ISA 的执行单元
    fn execute(&mut self, mem: &mut dyn Memory, decoded: DecodedInstr, current_pc: u32) {
        let instr = decoded.instr;

        if exu::rv32i::execute(self, mem, instr, current_pc) {
            return;
        }

        if exu::rv32m::execute(self, instr) {
            return;
        }

        if exu::rv32f::execute(self, mem, instr, current_pc) {
            return;
        }

        if exu::zicsr::execute(self, instr, current_pc) {
            return;
        }

        if exu::priv_instr::execute(self, instr, current_pc) {
            return;
        }

        // 保留/非法编码：配置决定停机还是走非法指令 trap
        let raw = decoded.raw;
        if self.halt_on_reserved {
            self.set_pc(current_pc);
            self.state = CpuState::IllegalInstruction(raw);
            // 未完成架构写回，不计入退休
            self.trap_taken = true;
        } else {
            self.take_trap_at(TrapCause::IllegalInstruction, raw, current_pc);
        }
    }

    // ========== 执行单元的访存辅助 ==========

    /// 数据加载；失败时触发相应 trap 并返回 None
    pub(crate) fn mem_load(
        &mut self,
        result: Result<u32, MemError>,
        addr: u32,
        current_pc: u32,
    ) -> Option<u32> {
        self.access_addr = addr;
        match result {
            Ok(value) => Some(value),
            Err(MemError::Unaligned { .. }) => {
                self.take_trap_at(TrapCause::LoadAddressMisaligned, addr, current_pc);
                None
            }
            Err(_) => {
                self.take_trap_at(TrapCause::LoadAccessFault, addr, current_pc);
                None
            }
        }
    }

    /// 数据存储；失败时触发相应 trap 并返回 false
    pub(crate) fn mem_store(
        &mut self,
        result: Result<(), MemError>,
        addr: u32,
        current_pc: u32,
    ) -> bool {
        self.access_addr = addr;
        match result {
            Ok(()) => true,
            Err(MemError::Unaligned { .. }) => {
                self.take_trap_at(TrapCause::StoreAddressMisaligned, addr, current_pc);
                false
            }
            Err(_) => {
                self.take_trap_at(TrapCause::StoreAccessFault, addr, current_pc);
                false
            }
        }
    }

    /// 控制流转移：目标未按对齐掩码对齐时触发指令地址未对齐 trap
    ///
    /// 对齐检查作用于转移目标原值（JALR 的 bit 0 清除发生在检查后）。
    /// 返回 false 表示发生了 trap，调用方必须放弃本条指令的写回。
    pub(crate) fn branch_to(&mut self, target: u32, current_pc: u32) -> bool {
        self.access_addr = target;
        if target & self.iaddr_align_mask() != 0 {
            self.take_trap_at(TrapCause::InstructionAddressMisaligned, target, current_pc);
            false
        } else {
            self.set_pc(target & !1);
            true
        }
    }

    // ========== 复位与快照 ==========

    /// 逻辑复位：寄存器清零、CSR 回到复位值、PC 回到复位向量、
    /// 计数器清零
    pub fn reset(&mut self) {
        let reset_vector = self.reset_vector;
        for hart in &mut self.harts {
            hart.status.reset();
            hart.pc = reset_vector;
        }
        self.curr_hart = 0;
        self.state = CpuState::Running;
        self.cycle_count = 0;
        self.instret_count = 0;
        self.mtimecmp = 0;
        self.access_addr = 0;
        self.curr_instr = 0;
        self.last_compressed = false;
        self.trap_taken = false;
        self.ext_irq = 0;
    }

    /// 当前 hart 的完整快照
    pub fn hart_snapshot(&self) -> HartSnapshot {
        HartSnapshot {
            status: self.hart().status.snapshot(),
            pc: self.pc(),
            cycle_count: self.cycle_count,
            instret_count: self.instret_count,
        }
    }

    /// 从快照恢复当前 hart
    pub fn restore_hart(&mut self, snapshot: &HartSnapshot) {
        self.hart_mut().status.restore(&snapshot.status);
        self.set_pc(snapshot.pc);
        self.cycle_count = snapshot.cycle_count;
        self.instret_count = snapshot.instret_count;
        self.state = CpuState::Running;
    }

    /// 打印所有存在的状态（用于调试）
    pub fn dump_regs(&self) {
        println!("═══════════════════════════════════════════════════════════════════");
        println!("CPU Status Dump");
        println!("═══════════════════════════════════════════════════════════════════");

        println!(
            "PC: 0x{:08x}  State: {:?}  Privilege: {:?}",
            self.pc(),
            self.state,
            self.privilege()
        );
        println!(
            "cycle: {}  instret: {}",
            self.cycle_count, self.instret_count
        );
        println!();

        println!("─── Integer Registers (x0-x31) ───────────────────────────────────");
        for i in 0..32 {
            if i % 4 == 0 {
                print!("  ");
            }
            print!("x{:02}: 0x{:08x}  ", i, self.read_reg(i as u8));
            if i % 4 == 3 {
                println!();
            }
        }

        if self.has_fp() {
            println!();
            println!("─── Floating-Point Registers (f0-f31) ────────────────────────────");
            for i in 0..32 {
                if i % 4 == 0 {
                    print!("  ");
                }
                print!("f{:02}: 0x{:08x}  ", i, self.read_fp(i as u8));
                if i % 4 == 3 {
                    println!();
                }
            }
        }

        let csr_snapshot = self.hart().status.csr.snapshot();
        if !csr_snapshot.is_empty() {
            println!();
            println!("─── Control and Status Registers (CSR) ───────────────────────────");
            let mut csr_list: Vec<_> = csr_snapshot.iter().collect();
            csr_list.sort_by_key(|(addr, _)| **addr);

            for (i, (addr, value)) in csr_list.iter().enumerate() {
                print!("  0x{:03x}: 0x{:08x}", addr, value);
                if i % 3 == 2 {
                    println!();
                } else {
                    print!("  ");
                }
            }
            if csr_list.len() % 3 != 0 {
                println!();
            }
        }

        println!("═══════════════════════════════════════════════════════════════════");
    }
}

impl Default for CpuCore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests;
