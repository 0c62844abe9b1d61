//! CPU 配置器
//!
//! 以能力组合的方式装配 CPU：每个选定的扩展贡献
//! - 解码表片段（构建时合并进注册表并做冲突检测）
//! - 架构状态（浮点寄存器文件、各扩展的 CSR 表项）
//! - 取指/对齐行为（C 扩展）
//!
//! # 示例
//!
//! ```
//! use rvcosim::cpu::CpuBuilder;
//!
//! let cpu = CpuBuilder::new(0x1000)
//!     .with_m_extension()
//!     .with_f_extension()
//!     .with_c_extension()
//!     .build()
//!     .expect("配置无冲突");
//! assert_eq!(cpu.pc(), 0x1000);
//! ```

use std::sync::Arc;

use super::csr_def::{self, misa};
use super::status::Status;
use super::CpuCore;
use crate::isa::{ConflictInfo, IsaConfig, IsaExtension};

/// CPU 构建器
pub struct CpuBuilder {
    reset_vector: u32,
    isa_config: IsaConfig,
    enable_f: bool,
    enable_c: bool,
    enable_m_mode: bool,
    num_harts: usize,
    halt_on_ebreak: bool,
    halt_on_ecall: bool,
    halt_on_reserved: bool,
}

impl CpuBuilder {
    /// 创建新的 CPU 构建器
    ///
    /// 默认为 RV32I + M-mode CSR（trap 交付需要 CSR 机制在场，
    /// Zicsr 扩展只控制 CSR *指令* 是否可用）
    pub fn new(reset_vector: u32) -> Self {
        Self {
            reset_vector,
            isa_config: IsaConfig::new(),
            enable_f: false,
            enable_c: false,
            enable_m_mode: true,
            num_harts: 1,
            halt_on_ebreak: false,
            halt_on_ecall: false,
            halt_on_reserved: false,
        }
    }

    /// 启用 M 扩展（乘除法）
    pub fn with_m_extension(mut self) -> Self {
        self.isa_config = self.isa_config.with_m_extension();
        self
    }

    /// 启用 F 扩展（单精度浮点，隐含 Zicsr）
    pub fn with_f_extension(mut self) -> Self {
        self.enable_f = true;
        self.isa_config = self.isa_config.with_f_extension().with_zicsr_extension();
        self
    }

    /// 启用 C 扩展（压缩指令）
    pub fn with_c_extension(mut self) -> Self {
        self.enable_c = true;
        self.isa_config = self.isa_config.with_c_extension();
        self
    }

    /// 启用 Zicsr 扩展（CSR 操作指令）
    pub fn with_zicsr_extension(mut self) -> Self {
        self.isa_config = self.isa_config.with_zicsr_extension();
        self
    }

    /// 启用特权指令扩展（MRET, WFI）
    pub fn with_priv_extension(mut self) -> Self {
        self.isa_config = self.isa_config.with_priv_extension();
        self
    }

    /// 禁用 M-mode CSR（仅用于纯用户态指令流的测试）
    pub fn without_m_mode(mut self) -> Self {
        self.enable_m_mode = false;
        self
    }

    /// hart 数量（构建时定容，默认 1）
    pub fn with_harts(mut self, num_harts: usize) -> Self {
        self.num_harts = num_harts.max(1);
        self
    }

    /// EBREAK 停机而不触发断点异常
    pub fn halt_on_ebreak(mut self, on: bool) -> Self {
        self.halt_on_ebreak = on;
        self
    }

    /// ECALL 停机而不触发环境调用异常
    pub fn halt_on_ecall(mut self, on: bool) -> Self {
        self.halt_on_ecall = on;
        self
    }

    /// 保留指令停机而不触发非法指令异常
    pub fn halt_on_reserved(mut self, on: bool) -> Self {
        self.halt_on_reserved = on;
        self
    }

    /// 检测配置中的指令冲突
    pub fn detect_conflicts(&self) -> Vec<ConflictInfo> {
        self.isa_config.detect_conflicts()
    }

    /// misa 的复位值（MXL=32 + 扩展位）
    fn misa_value(&self) -> u32 {
        let mut value = misa::MXL_32 | misa::EXT_I;
        if self.isa_config.has_extension(IsaExtension::RV32M) {
            value |= misa::EXT_M;
        }
        if self.enable_f {
            value |= misa::EXT_F;
        }
        if self.enable_c {
            value |= misa::EXT_C;
        }
        value
    }

    /// 构建 CPU 核心
    ///
    /// 返回 `Err` 如果检测到指令冲突
    pub fn build(self) -> Result<CpuCore, Vec<ConflictInfo>> {
        let misa_value = self.misa_value();

        // 1. 构建解码器（含冲突检测）
        let has_c = self.enable_c;
        let decoder = Arc::new(self.isa_config.build()?);

        // 2. 构建架构状态
        let mut status = Status::new();

        status.csr.register(csr_def::BASE_CSRS);

        if self.enable_f {
            status.enable_fp();
            status.csr.register(csr_def::F_CSRS);
        }

        if self.enable_m_mode {
            status.csr.register(csr_def::M_CSRS);
            // misa 的复位值由扩展配置决定，覆盖表中的占位项
            status.csr.register(&[super::status::CsrEntry {
                name: "misa",
                addr: csr_def::CSR_MISA,
                reset: misa_value,
                wr_mask: 0,
            }]);
        }

        // 3. 创建 CPU 核心
        let mut cpu =
            CpuCore::with_config(self.reset_vector, status, decoder, has_c, self.num_harts);
        cpu.set_halt_on_ebreak(self.halt_on_ebreak);
        cpu.set_halt_on_ecall(self.halt_on_ecall);
        cpu.set_halt_on_reserved(self.halt_on_reserved);
        Ok(cpu)
    }
}

impl Default for CpuBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}
