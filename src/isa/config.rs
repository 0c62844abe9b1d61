//! ISA 配置与冲突检测
//!
//! 指令集扩展的配置管理：选定的扩展各自贡献一份解码表片段，
//! 构建时合并进注册表并做 mask/match 冲突检测。C 扩展不进注册表
//! （16-bit 编码在取指阶段展开），但参与扩展集合与 misa/ISA 字符串。

use std::collections::HashSet;
use std::sync::Arc;

use super::decoder::DecoderRegistry;
use super::instr_def::InstrDef;
use super::priv_instr::{PRIV_DECODER, PRIV_INSTRS};
use super::rv32f::{RV32F_DECODER, RV32F_INSTRS};
use super::rv32i::{RV32I_DECODER, RV32I_INSTRS};
use super::rv32m::{RV32M_DECODER, RV32M_INSTRS};
use super::zicsr::{ZICSR_DECODER, ZICSR_INSTRS};

/// 支持的 ISA 扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsaExtension {
    /// RV32I 基础整数指令集（必选）
    RV32I,
    /// M 扩展：乘除法
    RV32M,
    /// F 扩展：单精度浮点
    RV32F,
    /// C 扩展：压缩指令（取指阶段展开）
    RV32C,
    /// Zicsr 扩展：CSR 操作指令
    Zicsr,
    /// 特权指令：MRET, WFI
    Priv,
}

impl std::fmt::Display for IsaExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsaExtension::RV32I => write!(f, "RV32I"),
            IsaExtension::RV32M => write!(f, "M"),
            IsaExtension::RV32F => write!(f, "F"),
            IsaExtension::RV32C => write!(f, "C"),
            IsaExtension::Zicsr => write!(f, "_Zicsr"),
            IsaExtension::Priv => write!(f, "_Priv"),
        }
    }
}

/// 指令模式描述（用于冲突检测），从 InstrDef 派生的轻量级视图
#[derive(Debug, Clone)]
pub struct InstrSignature {
    /// 扩展名称
    pub extension: IsaExtension,
    /// 指令名称
    pub name: &'static str,
    /// 匹配掩码
    pub mask: u32,
    /// 匹配值
    pub match_val: u32,
}

impl InstrSignature {
    /// 从 InstrDef 创建签名
    pub fn from_def(def: &InstrDef, extension: IsaExtension) -> Self {
        Self {
            extension,
            name: def.name,
            mask: def.mask,
            match_val: def.match_val,
        }
    }

    /// 检查两个指令模式是否冲突
    ///
    /// 两个模式冲突当且仅当存在某个指令字同时匹配两者，
    /// 即公共 mask 下的 match 值相同
    pub fn conflicts_with(&self, other: &InstrSignature) -> bool {
        let common_mask = self.mask & other.mask;
        (self.match_val & common_mask) == (other.match_val & common_mask)
    }
}

/// 冲突信息
#[derive(Debug, Clone)]
pub struct ConflictInfo {
    pub instr1: InstrSignature,
    pub instr2: InstrSignature,
    /// 冲突的示例指令编码
    pub example_raw: u32,
}

impl std::fmt::Display for ConflictInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "冲突: {}:{} 与 {}:{} (示例: 0x{:08X})",
            self.instr1.extension,
            self.instr1.name,
            self.instr2.extension,
            self.instr2.name,
            self.example_raw
        )
    }
}

/// ISA 配置构建器
///
/// 配置启用的指令集扩展，检测冲突，并构建解码器注册表
pub struct IsaConfig {
    extensions: HashSet<IsaExtension>,
    signatures: Vec<InstrSignature>,
}

impl IsaConfig {
    /// 创建新的 ISA 配置（默认只有 RV32I）
    pub fn new() -> Self {
        let mut config = Self {
            extensions: HashSet::new(),
            signatures: Vec::new(),
        };

        // RV32I 是必选的
        config.extensions.insert(IsaExtension::RV32I);
        config.signatures.extend(signatures_of(RV32I_INSTRS, IsaExtension::RV32I));

        config
    }

    /// 启用 M 扩展（乘除法）
    pub fn with_m_extension(mut self) -> Self {
        if self.extensions.insert(IsaExtension::RV32M) {
            self.signatures.extend(signatures_of(RV32M_INSTRS, IsaExtension::RV32M));
        }
        self
    }

    /// 启用 F 扩展（单精度浮点）
    pub fn with_f_extension(mut self) -> Self {
        if self.extensions.insert(IsaExtension::RV32F) {
            self.signatures.extend(signatures_of(RV32F_INSTRS, IsaExtension::RV32F));
        }
        self
    }

    /// 启用 C 扩展（压缩指令）
    ///
    /// 压缩编码不经过注册表，这里只登记扩展（影响取指与对齐规则）
    pub fn with_c_extension(mut self) -> Self {
        self.extensions.insert(IsaExtension::RV32C);
        self
    }

    /// 启用 Zicsr 扩展（CSR 操作指令）
    pub fn with_zicsr_extension(mut self) -> Self {
        if self.extensions.insert(IsaExtension::Zicsr) {
            self.signatures.extend(signatures_of(ZICSR_INSTRS, IsaExtension::Zicsr));
        }
        self
    }

    /// 启用特权指令扩展（MRET, WFI）
    pub fn with_priv_extension(mut self) -> Self {
        if self.extensions.insert(IsaExtension::Priv) {
            self.signatures.extend(signatures_of(PRIV_INSTRS, IsaExtension::Priv));
        }
        self
    }

    /// 检测指令冲突
    pub fn detect_conflicts(&self) -> Vec<ConflictInfo> {
        let mut conflicts = Vec::new();

        for (i, sig1) in self.signatures.iter().enumerate() {
            for sig2 in self.signatures.iter().skip(i + 1) {
                // 同一扩展内的指令不检测（假设扩展内部是正确的）
                if sig1.extension == sig2.extension {
                    continue;
                }

                if sig1.conflicts_with(sig2) {
                    // 生成一个同时满足两者 mask/match 的示例
                    let example = (sig1.match_val & sig1.mask) | (sig2.match_val & sig2.mask);
                    conflicts.push(ConflictInfo {
                        instr1: sig1.clone(),
                        instr2: sig2.clone(),
                        example_raw: example,
                    });
                }
            }
        }

        conflicts
    }

    /// 检查配置是否有效（无冲突）
    pub fn is_valid(&self) -> bool {
        self.detect_conflicts().is_empty()
    }

    /// 是否启用了某个扩展
    pub fn has_extension(&self, ext: IsaExtension) -> bool {
        self.extensions.contains(&ext)
    }

    /// 获取 ISA 字符串（如 "RV32IMFC"）
    pub fn isa_string(&self) -> String {
        let mut s = String::from("RV32I");

        // 按标准顺序添加扩展
        let order = [IsaExtension::RV32M, IsaExtension::RV32F, IsaExtension::RV32C];
        for ext in &order {
            if self.extensions.contains(ext) {
                s.push_str(&ext.to_string());
            }
        }

        if self.extensions.contains(&IsaExtension::Zicsr) {
            s.push_str("_Zicsr");
        }

        s
    }

    /// 构建解码器注册表
    ///
    /// 如果存在冲突，返回错误
    pub fn build(self) -> Result<DecoderRegistry, Vec<ConflictInfo>> {
        let conflicts = self.detect_conflicts();
        if !conflicts.is_empty() {
            return Err(conflicts);
        }

        let mut registry = DecoderRegistry::new();

        // 基础 RV32I 总是存在
        registry
            .register(Arc::new(RV32I_DECODER))
            .expect("RV32I decoder must register");

        if self.extensions.contains(&IsaExtension::RV32M) {
            registry
                .register(Arc::new(RV32M_DECODER))
                .expect("RV32M decoder must register");
        }

        if self.extensions.contains(&IsaExtension::RV32F) {
            registry
                .register(Arc::new(RV32F_DECODER))
                .expect("RV32F decoder must register");
        }

        if self.extensions.contains(&IsaExtension::Zicsr) {
            registry
                .register(Arc::new(ZICSR_DECODER))
                .expect("Zicsr decoder must register");
        }

        if self.extensions.contains(&IsaExtension::Priv) {
            registry
                .register(Arc::new(PRIV_DECODER))
                .expect("Priv decoder must register");
        }

        Ok(registry)
    }

    /// 获取已启用的扩展列表
    pub fn enabled_extensions(&self) -> &HashSet<IsaExtension> {
        &self.extensions
    }
}

impl Default for IsaConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 从 InstrDef 表派生指令签名
fn signatures_of(defs: &'static [InstrDef], ext: IsaExtension) -> Vec<InstrSignature> {
    defs.iter().map(|def| InstrSignature::from_def(def, ext)).collect()
}
