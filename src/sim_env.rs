//! 仿真环境模块
//!
//! 本模块负责：
//! - 读取并解析仿真配置（run 选项包）
//! - 解析 ELF 文件并加载到内部 RAM 窗口
//! - 组装 CPU 与协同仿真总线
//! - 运行循环：停机条件、运行时反汇编 trace、HTIF 测试协议
//!
//! # 示例
//!
//! ```no_run
//! use rvcosim::sim_env::{SimConfig, SimEnv};
//!
//! let config = SimConfig::default()
//!     .with_elf_path("program.elf")
//!     .with_memory_size(64 * 1024)
//!     .with_halt_on_ebreak(true);
//!
//! let mut env = SimEnv::from_config(config).expect("Failed to create sim env");
//! let (reason, executed) = env.run_until_halt();
//! println!("{:?} after {} instructions", reason, executed);
//! ```

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use elf::abi::{EM_RISCV, PF_W, PF_X, PT_LOAD};
use elf::endian::AnyEndian;
use elf::ElfBytes;
use log::{debug, info};
use thiserror::Error;

use crate::cpu::{CpuBuilder, CpuCore, CpuState, HaltCause, IntCallback};
use crate::isa::disasm;
use crate::memory::{AccessSize, CoSimBus, ExtMemCallback, FlatMemory, MemError, Memory};

/// 仿真配置错误
///
/// 嵌入层错误通过 Result 返回，不触碰架构状态
#[derive(Debug, Error)]
pub enum SimError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// ELF 解析错误
    #[error("ELF parse error: {0}")]
    ElfParse(String),
    /// 配置错误
    #[error("Config error: {0}")]
    Config(String),
    /// 内存错误
    #[error("Memory error: {0}")]
    Memory(#[from] MemError),
    /// CPU 配置错误
    #[error("CPU config error: {0}")]
    CpuConfig(String),
}

/// ISA 扩展配置
#[derive(Debug, Clone, Default)]
pub struct IsaExtensions {
    /// 启用 M 扩展（乘除法）
    pub m: bool,
    /// 启用 F 扩展（单精度浮点）
    pub f: bool,
    /// 启用 C 扩展（压缩指令）
    pub c: bool,
    /// 启用 Zicsr 扩展（CSR 操作）
    pub zicsr: bool,
    /// 启用特权指令
    pub priv_instr: bool,
}

impl IsaExtensions {
    /// 创建 RV32I 基础配置
    pub fn rv32i() -> Self {
        Self::default()
    }

    /// 创建 RV32IM 配置
    pub fn rv32im() -> Self {
        Self { m: true, ..Default::default() }
    }

    /// 创建 RV32IMFC 配置（协同仿真的常用配置）
    pub fn rv32imfc() -> Self {
        Self {
            m: true,
            f: true,
            c: true,
            zicsr: true,
            priv_instr: true,
        }
    }

    /// 从字符串解析扩展配置
    ///
    /// 格式示例: "rv32imf", "rv32imfc", "imc"
    pub fn parse(s: &str) -> Result<Self, SimError> {
        let s = s.to_lowercase();
        let s = s.strip_prefix("rv32").unwrap_or(&s);

        let mut ext = Self::default();

        for ch in s.chars() {
            match ch {
                'i' => {} // 基础指令集，总是启用
                'm' => ext.m = true,
                'f' => {
                    ext.f = true;
                    ext.zicsr = true; // F 扩展需要 Zicsr
                }
                'c' => ext.c = true,
                'g' => {
                    ext.m = true;
                    ext.f = true;
                    ext.zicsr = true;
                    ext.priv_instr = true;
                }
                '_' | 'e' => {}
                other => {
                    return Err(SimError::Config(format!(
                        "unsupported ISA extension letter '{}'",
                        other
                    )));
                }
            }
        }

        // trap/返回流程总是可用
        ext.priv_instr = true;
        ext.zicsr = true;

        Ok(ext)
    }
}

/// 内存区域配置（内部 RAM 窗口）
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    /// 区域名称（用于诊断）
    pub name: String,
    /// 起始地址
    pub base: u32,
    /// 大小（字节）
    pub size: usize,
}

impl Default for MemoryRegion {
    fn default() -> Self {
        Self {
            name: "ram".to_string(),
            base: 0,
            size: 64 * 1024, // 默认 64KB
        }
    }
}

/// 仿真配置（run 的选项包）
pub struct SimConfig {
    /// ELF 文件路径（可选，也可以直接提供二进制）
    pub elf_path: Option<String>,
    /// 二进制文件路径（可选）
    pub bin_path: Option<String>,
    /// 二进制加载地址（用于 bin_path）
    pub bin_load_addr: u32,
    /// 起始 PC（不设置时取 ELF 入口或复位向量）
    pub start_address: Option<u32>,
    /// 复位向量（ELF 入口会覆盖它）
    pub reset_vector: u32,
    /// 内存窗口配置
    pub memory: MemoryRegion,
    /// ISA 扩展
    pub extensions: IsaExtensions,
    /// 最大执行指令数（0 表示无限制）
    pub max_instructions: u64,
    /// ECALL 停机（而不是触发环境调用异常）
    pub exit_on_ecall: bool,
    /// EBREAK 停机（而不是触发断点异常）
    pub halt_on_ebreak: bool,
    /// 保留指令停机（而不是触发非法指令异常）
    pub halt_on_reserved: bool,
    /// 到达该地址时停机
    pub exit_address: Option<u32>,
    /// 运行时反汇编 trace
    pub disassemble_runtime: bool,
    /// 反汇编使用 ABI 寄存器名
    pub use_abi_names: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            elf_path: None,
            bin_path: None,
            bin_load_addr: 0,
            start_address: None,
            reset_vector: 0,
            memory: MemoryRegion::default(),
            extensions: IsaExtensions::rv32im(),
            max_instructions: 0,
            exit_on_ecall: false,
            halt_on_ebreak: false,
            halt_on_reserved: false,
            exit_address: None,
            disassemble_runtime: false,
            use_abi_names: false,
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 ELF 文件路径
    pub fn with_elf_path(mut self, path: impl Into<String>) -> Self {
        self.elf_path = Some(path.into());
        self
    }

    /// 设置二进制文件路径与加载地址
    pub fn with_bin_path(mut self, path: impl Into<String>, load_addr: u32) -> Self {
        self.bin_path = Some(path.into());
        self.bin_load_addr = load_addr;
        self
    }

    /// 设置起始 PC
    pub fn with_start_address(mut self, pc: u32) -> Self {
        self.start_address = Some(pc);
        self
    }

    /// 设置复位向量
    pub fn with_reset_vector(mut self, vector: u32) -> Self {
        self.reset_vector = vector;
        self
    }

    /// 设置内存大小
    pub fn with_memory_size(mut self, size: usize) -> Self {
        self.memory.size = size;
        self
    }

    /// 设置内存基地址
    pub fn with_memory_base(mut self, base: u32) -> Self {
        self.memory.base = base;
        self
    }

    /// 设置内存配置
    pub fn with_memory(mut self, name: impl Into<String>, base: u32, size: usize) -> Self {
        self.memory = MemoryRegion {
            name: name.into(),
            base,
            size,
        };
        self
    }

    /// 设置 ISA 扩展
    pub fn with_extensions(mut self, ext: IsaExtensions) -> Self {
        self.extensions = ext;
        self
    }

    /// 从字符串设置 ISA 扩展
    pub fn with_isa(mut self, isa: &str) -> Result<Self, SimError> {
        self.extensions = IsaExtensions::parse(isa)?;
        Ok(self)
    }

    /// 设置最大执行指令数
    pub fn with_max_instructions(mut self, max: u64) -> Self {
        self.max_instructions = max;
        self
    }

    pub fn with_exit_on_ecall(mut self, on: bool) -> Self {
        self.exit_on_ecall = on;
        self
    }

    pub fn with_halt_on_ebreak(mut self, on: bool) -> Self {
        self.halt_on_ebreak = on;
        self
    }

    pub fn with_halt_on_reserved(mut self, on: bool) -> Self {
        self.halt_on_reserved = on;
        self
    }

    pub fn with_exit_address(mut self, addr: u32) -> Self {
        self.exit_address = Some(addr);
        self
    }

    /// 启用运行时反汇编 trace
    pub fn with_disassemble_runtime(mut self, on: bool) -> Self {
        self.disassemble_runtime = on;
        self
    }

    /// 反汇编使用 ABI 寄存器名
    pub fn with_abi_names(mut self, on: bool) -> Self {
        self.use_abi_names = on;
        self
    }
}

/// ELF 程序段信息
#[derive(Debug, Clone)]
pub struct ElfSegment {
    /// 虚拟地址
    pub vaddr: u32,
    /// 物理地址
    pub paddr: u32,
    /// 文件中的大小
    pub file_size: usize,
    /// 内存中的大小
    pub mem_size: usize,
    /// 段数据
    pub data: Vec<u8>,
    /// 是否可执行
    pub executable: bool,
    /// 是否可写
    pub writable: bool,
}

/// ELF 符号信息（只保留 HTIF 相关符号）
#[derive(Debug, Clone)]
pub struct ElfSymbol {
    pub name: String,
    pub addr: u32,
    pub size: u32,
}

/// ELF 文件解析结果
#[derive(Debug, Clone)]
pub struct ElfInfo {
    /// 入口点地址
    pub entry: u32,
    /// 可加载程序段
    pub segments: Vec<ElfSegment>,
    /// 符号表（仅 tohost/fromhost）
    pub symbols: Vec<ElfSymbol>,
    /// 是否为小端序
    pub is_little_endian: bool,
}

impl ElfInfo {
    /// 解析 ELF 文件
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        Self::parse_bytes(&data)
    }

    /// 从字节数组解析 ELF（小端 RISC-V ELF32）
    pub fn parse_bytes(data: &[u8]) -> Result<Self, SimError> {
        let elf_file = ElfBytes::<AnyEndian>::minimal_parse(data)
            .map_err(|e| SimError::ElfParse(format!("Failed to parse ELF: {}", e)))?;

        let header = &elf_file.ehdr;

        if header.e_machine != EM_RISCV {
            return Err(SimError::ElfParse(format!(
                "Not a RISC-V ELF (machine type: 0x{:x}, expected 0x{:x})",
                header.e_machine, EM_RISCV
            )));
        }

        if header.class != elf::file::Class::ELF32 {
            return Err(SimError::ElfParse("Only 32-bit ELF is supported".into()));
        }

        let is_little_endian = header.endianness == AnyEndian::Little;
        if !is_little_endian {
            return Err(SimError::ElfParse("Only little-endian ELF is supported".into()));
        }

        let entry = header.e_entry as u32;

        // 只处理 PT_LOAD 类型的段，按原样拷贝进内存
        let mut segments = Vec::new();
        if let Some(phdrs) = elf_file.segments() {
            for phdr in phdrs {
                if phdr.p_type != PT_LOAD {
                    continue;
                }

                let segment_data = elf_file
                    .segment_data(&phdr)
                    .map_err(|e| SimError::ElfParse(format!("Failed to read segment data: {}", e)))?
                    .to_vec();

                segments.push(ElfSegment {
                    vaddr: phdr.p_vaddr as u32,
                    paddr: phdr.p_paddr as u32,
                    file_size: phdr.p_filesz as usize,
                    mem_size: phdr.p_memsz as usize,
                    data: segment_data,
                    executable: (phdr.p_flags & PF_X) != 0,
                    writable: (phdr.p_flags & PF_W) != 0,
                });
            }
        }

        // 符号表只查 HTIF 邮箱符号（riscv-tests 协议）
        let mut symbols = Vec::new();
        if let Ok(Some((symtab, strtab))) = elf_file.symbol_table() {
            for sym in symtab {
                if sym.st_value == 0 {
                    continue;
                }
                if let Ok(name) = strtab.get(sym.st_name as usize) {
                    if name == "tohost" || name == "fromhost" {
                        symbols.push(ElfSymbol {
                            name: name.to_string(),
                            addr: sym.st_value as u32,
                            size: sym.st_size as u32,
                        });
                    }
                }
            }
        }

        Ok(ElfInfo {
            entry,
            segments,
            symbols,
            is_little_endian,
        })
    }

    /// 查找符号地址
    pub fn find_symbol(&self, name: &str) -> Option<u32> {
        self.symbols.iter().find(|s| s.name == name).map(|s| s.addr)
    }

    /// 获取程序使用的最小和最大地址
    pub fn address_range(&self) -> Option<(u32, u32)> {
        if self.segments.is_empty() {
            return None;
        }

        let min_addr = self.segments.iter().map(|s| s.vaddr).min().unwrap();
        let max_addr = self
            .segments
            .iter()
            .map(|s| s.vaddr + s.mem_size as u32)
            .max()
            .unwrap();

        Some((min_addr, max_addr))
    }
}

fn len_to_u32(len: usize) -> Result<u32, SimError> {
    len.try_into()
        .map_err(|_| SimError::Config(format!("Size {} exceeds 32-bit address space", len)))
}

fn range_end(addr: u32, len: usize) -> Result<u32, SimError> {
    let len_u32 = len_to_u32(len)?;
    addr.checked_add(len_u32).ok_or_else(|| {
        SimError::Config(format!(
            "Address range overflow: start=0x{:08x}, len=0x{:x}",
            addr, len
        ))
    })
}

fn ensure_range(region: &MemoryRegion, addr: u32, len: usize) -> Result<(), SimError> {
    let region_end = range_end(region.base, region.size)?;
    let target_end = range_end(addr, len)?;
    if addr < region.base || target_end > region_end {
        return Err(SimError::Config(format!(
            "Memory region '{}' (0x{:08x}..0x{:08x}) cannot fit range 0x{:08x}..0x{:08x}",
            region.name, region.base, region_end, addr, target_end,
        )));
    }
    Ok(())
}

fn load_segments_into_memory(
    memory: &mut FlatMemory,
    region: &MemoryRegion,
    segments: &[ElfSegment],
) -> Result<(), SimError> {
    for seg in segments {
        ensure_range(region, seg.vaddr, seg.mem_size)?;
        if seg.mem_size == 0 {
            continue;
        }

        memory.write_bytes(seg.vaddr, &seg.data)?;

        // .bss 部分清零
        if seg.mem_size > seg.file_size {
            let bss_start = range_end(seg.vaddr, seg.file_size)?;
            let bss_size = seg.mem_size - seg.file_size;
            memory.fill(bss_start, bss_size, 0)?;
        }

        debug!(
            "loaded segment vaddr=0x{:08x} filesz=0x{:x} memsz=0x{:x} {}{}",
            seg.vaddr,
            seg.file_size,
            seg.mem_size,
            if seg.executable { "X" } else { "-" },
            if seg.writable { "W" } else { "R" },
        );
    }
    Ok(())
}

/// run 循环的返回状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// 达到最大指令数
    InstrLimit,
    /// EBREAK 停机
    Breakpoint,
    /// ECALL 停机
    EnvCall,
    /// 保留指令停机
    ReservedInstr(u32),
    /// 到达配置的退出地址
    ExitAddress,
    /// 中断回调通道的停止请求
    StopRequest,
    /// WFI 挂起且无可交付的中断
    WaitForInterrupt,
}

/// ISA 测试结果（HTIF tohost 协议）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    /// 测试通过
    Pass,
    /// 测试失败，包含失败的测试编号
    Fail(u32),
    /// 测试超时或未完成
    Timeout,
}

impl TestResult {
    /// 从 tohost 值解析测试结果：1 = pass，否则 (test_num << 1) | 1
    pub fn from_tohost(value: u32) -> Self {
        if value == 1 {
            TestResult::Pass
        } else if value != 0 {
            TestResult::Fail(value >> 1)
        } else {
            TestResult::Timeout
        }
    }
}

/// 仿真环境
///
/// 封装 CPU、协同仿真总线和配置，提供统一的仿真接口。
/// trace 输出流从调用方借入，本层不负责关闭。
pub struct SimEnv {
    /// CPU 核心
    pub cpu: CpuCore,
    /// 协同仿真总线（内部 RAM 窗口 + 外部回调）
    pub bus: CoSimBus,
    /// 配置
    pub config: SimConfig,
    /// 已执行的指令数
    pub instructions_executed: u64,
    /// HTIF tohost 地址（用于 ISA 测试）
    pub tohost_addr: Option<u32>,
    /// HTIF fromhost 地址
    pub fromhost_addr: Option<u32>,
    /// trace 输出流（借用，不关闭）
    trace_stream: Option<Box<dyn Write>>,
}

impl SimEnv {
    /// 从配置创建仿真环境
    pub fn from_config(config: SimConfig) -> Result<Self, SimError> {
        // 1. 创建内存窗口
        let mut memory = FlatMemory::new(config.memory.size, config.memory.base);

        // 2. 确定复位向量
        let mut reset_vector = config.reset_vector;

        // 3. 加载程序
        let mut tohost_addr = None;
        let mut fromhost_addr = None;

        if let Some(ref elf_path) = config.elf_path {
            let elf = ElfInfo::parse(elf_path)?;

            tohost_addr = elf.find_symbol("tohost");
            fromhost_addr = elf.find_symbol("fromhost");

            info!(
                "loaded ELF {}: entry=0x{:08x}, {} segments",
                elf_path,
                elf.entry,
                elf.segments.len()
            );

            load_segments_into_memory(&mut memory, &config.memory, &elf.segments)?;

            // ELF 入口点成为复位向量
            reset_vector = elf.entry;
        } else if let Some(ref bin_path) = config.bin_path {
            let data = std::fs::read(bin_path)?;
            ensure_range(&config.memory, config.bin_load_addr, data.len())?;

            info!(
                "loaded binary {}: load=0x{:08x}, {} bytes",
                bin_path,
                config.bin_load_addr,
                data.len()
            );

            memory.write_bytes(config.bin_load_addr, &data)?;
            reset_vector = config.bin_load_addr;
        }

        // 4. 创建 CPU
        let start_pc = config.start_address.unwrap_or(reset_vector);
        let mut cpu = Self::build_cpu(&config, reset_vector)?;
        cpu.set_pc(start_pc);

        info!("CPU initialized at PC=0x{:08x}", start_pc);

        let mut env = SimEnv {
            cpu,
            bus: CoSimBus::new(memory),
            config,
            instructions_executed: 0,
            tohost_addr,
            fromhost_addr,
            trace_stream: None,
        };

        env.clear_htif_mailboxes();

        Ok(env)
    }

    /// 根据配置构建 CPU
    fn build_cpu(config: &SimConfig, reset_vector: u32) -> Result<CpuCore, SimError> {
        let ext = &config.extensions;
        let mut builder = CpuBuilder::new(reset_vector)
            .halt_on_ebreak(config.halt_on_ebreak)
            .halt_on_ecall(config.exit_on_ecall)
            .halt_on_reserved(config.halt_on_reserved);

        if ext.m {
            builder = builder.with_m_extension();
        }
        if ext.f {
            builder = builder.with_f_extension();
        }
        if ext.c {
            builder = builder.with_c_extension();
        }
        if ext.zicsr {
            builder = builder.with_zicsr_extension();
        }
        if ext.priv_instr {
            builder = builder.with_priv_extension();
        }

        builder
            .build()
            .map_err(|conflicts| {
                SimError::CpuConfig(format!("ISA conflicts detected: {:?}", conflicts))
            })
    }

    /// 从 ELF 文件创建仿真环境（便捷方法）
    pub fn from_elf<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let elf = ElfInfo::parse(&path)?;

        let (min_addr, max_addr) = elf
            .address_range()
            .ok_or_else(|| SimError::ElfParse("No loadable segments".into()))?;

        // 分配足够大的内存（对齐到 4KB，至少 64KB）
        let mem_size = ((max_addr - min_addr + 0xFFF) & !0xFFF) as usize;
        let mem_size = mem_size.max(64 * 1024);

        let config = SimConfig::new()
            .with_elf_path(path.as_ref().to_string_lossy().to_string())
            .with_memory("ram", min_addr, mem_size);

        Self::from_config(config)
    }

    /// 加载 ELF 镜像到内部 RAM 窗口并把复位向量设为其入口点
    ///
    /// 嵌入层错误（坏 ELF、窗口不够大）通过 Result 返回，
    /// 不触碰架构状态
    pub fn load_elf<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SimError> {
        let elf = ElfInfo::parse(&path)?;
        load_segments_into_memory(self.bus.ram_mut(), &self.config.memory, &elf.segments)?;

        self.tohost_addr = elf.find_symbol("tohost");
        self.fromhost_addr = elf.find_symbol("fromhost");
        self.clear_htif_mailboxes();

        self.cpu.set_reset_vector(elf.entry);
        self.cpu.set_pc(elf.entry);

        info!("loaded ELF: entry=0x{:08x}", elf.entry);
        Ok(())
    }

    /// 注册外部内存回调（窗口外地址交给硬件侧服务）
    pub fn register_ext_mem_callback(&mut self, callback: ExtMemCallback) {
        self.bus.register_ext_callback(callback);
    }

    /// 注册中断回调（每步调用一次，返回待处理中断位与停止请求）
    pub fn register_int_callback(&mut self, callback: IntCallback) {
        self.cpu.register_int_callback(callback);
    }

    /// 设置 trace 输出流（借用，不关闭；配合 disassemble_runtime）
    pub fn set_trace_stream(&mut self, stream: Box<dyn Write>) {
        self.trace_stream = Some(stream);
    }

    /// 调试用直接内存读取（不更新周期计数）
    pub fn read_mem(&mut self, addr: u32, size: AccessSize) -> Result<u32, MemError> {
        match size {
            AccessSize::Byte => self.bus.load8(addr).map(|v| v as u32),
            AccessSize::Half => self.bus.load16(addr).map(|v| v as u32),
            AccessSize::Word => self.bus.load32(addr),
        }
    }

    /// 调试用直接内存写入（不更新周期计数）
    pub fn write_mem(&mut self, addr: u32, value: u32, size: AccessSize) -> Result<(), MemError> {
        match size {
            AccessSize::Byte => self.bus.store8(addr, value as u8),
            AccessSize::Half => self.bus.store16(addr, value as u16),
            AccessSize::Word => self.bus.store32(addr, value),
        }
    }

    /// 执行单步（含 trace 输出）
    pub fn step(&mut self) -> CpuState {
        if self.config.disassemble_runtime {
            self.trace_current_instruction();
        }

        let state = self.cpu.step(&mut self.bus);
        self.instructions_executed += 1;
        state
    }

    fn trace_current_instruction(&mut self) {
        let Some(stream) = self.trace_stream.as_mut() else {
            return;
        };
        if let Some((decoded, len)) = self.cpu.peek_instruction(&mut self.bus) {
            let line = disasm::trace_line(
                self.cpu.pc(),
                decoded.raw,
                len == 2,
                &decoded.instr,
                self.config.use_abi_names,
            );
            let _ = writeln!(stream, "{}", line);
        }
    }

    /// 运行直到停机条件
    ///
    /// 停机条件（见配置）：最大指令数、EBREAK/ECALL/保留指令停机、
    /// 退出地址、中断回调的停止请求、WFI 无中断可交付
    pub fn run_until_halt(&mut self) -> (ExitReason, u64) {
        let max = if self.config.max_instructions > 0 {
            self.config.max_instructions
        } else {
            u64::MAX
        };

        let start = self.instructions_executed;

        for _ in 0..max {
            if let Some(exit_addr) = self.config.exit_address {
                if self.cpu.pc() == exit_addr {
                    return (ExitReason::ExitAddress, self.instructions_executed - start);
                }
            }

            let state = self.step();
            let executed = self.instructions_executed - start;

            match state {
                CpuState::Running => continue,
                CpuState::WaitForInterrupt => return (ExitReason::WaitForInterrupt, executed),
                CpuState::IllegalInstruction(raw) => {
                    return (ExitReason::ReservedInstr(raw), executed)
                }
                CpuState::Halted(HaltCause::Ebreak) => return (ExitReason::Breakpoint, executed),
                CpuState::Halted(HaltCause::Ecall) => return (ExitReason::EnvCall, executed),
                CpuState::Halted(HaltCause::StopRequest) => {
                    return (ExitReason::StopRequest, executed)
                }
            }
        }

        (ExitReason::InstrLimit, self.instructions_executed - start)
    }

    /// 获取 CPU 引用
    pub fn cpu(&self) -> &CpuCore {
        &self.cpu
    }

    /// 获取 CPU 可变引用
    pub fn cpu_mut(&mut self) -> &mut CpuCore {
        &mut self.cpu
    }

    /// 打印仿真状态
    pub fn dump(&self) {
        println!("=== SimEnv Status ===");
        println!("Instructions executed: {}", self.instructions_executed);
        self.cpu.dump_regs();
    }

    /// 检查 tohost 值并在检测到写入时执行 ACK
    pub fn check_tohost(&mut self) -> Option<u32> {
        let addr = self.tohost_addr?;
        match self.bus.load32(addr) {
            Ok(value) if value != 0 => {
                self.acknowledge_tohost(value);
                Some(value)
            }
            _ => None,
        }
    }

    fn clear_htif_mailboxes(&mut self) {
        if let Some(addr) = self.tohost_addr {
            let _ = self.bus.store32(addr, 0);
        }
        if let Some(addr) = self.fromhost_addr {
            let _ = self.bus.store32(addr, 0);
        }
    }

    fn acknowledge_tohost(&mut self, value: u32) {
        if let Some(addr) = self.tohost_addr {
            let _ = self.bus.store32(addr, 0);
        }
        if let Some(addr) = self.fromhost_addr {
            let _ = self.bus.store32(addr, value);
        }
    }

    /// 运行 ISA 测试：执行到 tohost 被写入或达到最大指令数
    ///
    /// # 参数
    ///
    /// * `max_instructions` - 最大执行指令数（0 表示默认 100 万条）
    pub fn run_isa_test(&mut self, max_instructions: u64) -> (TestResult, u64) {
        let max = if max_instructions > 0 {
            max_instructions
        } else {
            1_000_000
        };

        if self.tohost_addr.is_none() {
            let start = self.instructions_executed;
            let _ = self.run_until_halt();
            return (TestResult::Timeout, self.instructions_executed - start);
        }

        self.clear_htif_mailboxes();
        let start = self.instructions_executed;

        for _ in 0..max {
            let state = self.step();

            if let Some(value) = self.check_tohost() {
                let delta = self.instructions_executed - start;
                return (TestResult::from_tohost(value), delta);
            }

            if state != CpuState::Running {
                // 可能是 trap 前的最后写入，再查一次 tohost
                if let Some(value) = self.check_tohost() {
                    let delta = self.instructions_executed - start;
                    return (TestResult::from_tohost(value), delta);
                }
                break;
            }
        }

        (TestResult::Timeout, self.instructions_executed - start)
    }

    /// 重置仿真环境：逻辑复位 CPU 并重新加载程序镜像
    pub fn reset(&mut self) -> Result<(), SimError> {
        self.cpu.reset();
        if let Some(start) = self.config.start_address {
            self.cpu.set_pc(start);
        }
        self.instructions_executed = 0;

        if let Some(elf_path) = self.config.elf_path.clone() {
            let elf = ElfInfo::parse(&elf_path)?;
            self.tohost_addr = elf.find_symbol("tohost");
            self.fromhost_addr = elf.find_symbol("fromhost");
            load_segments_into_memory(self.bus.ram_mut(), &self.config.memory, &elf.segments)?;
        } else if let Some(bin_path) = self.config.bin_path.clone() {
            let data = std::fs::read(&bin_path)?;
            ensure_range(&self.config.memory, self.config.bin_load_addr, data.len())?;
            self.bus.ram_mut().write_bytes(self.config.bin_load_addr, &data)?;
        }

        self.clear_htif_mailboxes();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AccessSize;

    #[test]
    fn test_isa_extensions_parse() {
        let ext = IsaExtensions::parse("rv32im").unwrap();
        assert!(ext.m);
        assert!(!ext.f);
        assert!(!ext.c);

        let ext = IsaExtensions::parse("rv32imfc").unwrap();
        assert!(ext.m);
        assert!(ext.f);
        assert!(ext.c);
        assert!(ext.zicsr); // F 隐含 Zicsr

        let ext = IsaExtensions::parse("rv32g").unwrap();
        assert!(ext.m);
        assert!(ext.f);
        assert!(ext.zicsr);

        assert!(IsaExtensions::parse("rv32ixz").is_err());
    }

    #[test]
    fn test_sim_config_builder() {
        let config = SimConfig::new()
            .with_memory_size(128 * 1024)
            .with_memory_base(0x8000_0000)
            .with_start_address(0x8000_0000)
            .with_max_instructions(1000)
            .with_halt_on_ebreak(true);

        assert_eq!(config.memory.size, 128 * 1024);
        assert_eq!(config.memory.base, 0x8000_0000);
        assert_eq!(config.start_address, Some(0x8000_0000));
        assert_eq!(config.max_instructions, 1000);
        assert!(config.halt_on_ebreak);
    }

    #[test]
    fn test_sim_env_basic() {
        let config = SimConfig::new().with_memory_size(4096).with_start_address(0);
        let mut env = SimEnv::from_config(config).expect("Failed to create sim env");

        // addi x1, x0, 42
        env.bus.store32(0, 0x02A00093).unwrap();

        let state = env.step();
        assert_eq!(state, CpuState::Running);
        assert_eq!(env.cpu.read_reg(1), 42);
        assert_eq!(env.instructions_executed, 1);
    }

    #[test]
    fn test_sim_env_with_extensions() {
        let config = SimConfig::new()
            .with_extensions(IsaExtensions::rv32imfc())
            .with_memory_size(4096)
            .with_start_address(0);

        let env = SimEnv::from_config(config).expect("Failed to create sim env");
        assert!(env.cpu.has_fp());
        assert!(env.cpu.has_c());
    }

    #[test]
    fn test_run_until_halt_on_ebreak() {
        let config = SimConfig::new()
            .with_memory_size(4096)
            .with_start_address(0)
            .with_halt_on_ebreak(true);
        let mut env = SimEnv::from_config(config).unwrap();

        env.bus.store32(0, 0x02A00093).unwrap(); // addi x1, x0, 42
        env.bus.store32(4, 0x00100073).unwrap(); // ebreak

        let (reason, executed) = env.run_until_halt();
        assert_eq!(reason, ExitReason::Breakpoint);
        assert_eq!(executed, 2);
        assert_eq!(env.cpu.read_reg(1), 42);
    }

    #[test]
    fn test_run_until_halt_instr_limit() {
        let config = SimConfig::new()
            .with_memory_size(4096)
            .with_start_address(0)
            .with_max_instructions(5);
        let mut env = SimEnv::from_config(config).unwrap();

        // beq x0, x0, 0：原地死循环
        env.bus.store32(0, 0x00000063).unwrap();

        let (reason, executed) = env.run_until_halt();
        assert_eq!(reason, ExitReason::InstrLimit);
        assert_eq!(executed, 5);
        assert_eq!(env.cpu.pc(), 0); // 分支不推进 PC
    }

    #[test]
    fn test_run_until_halt_exit_address() {
        let config = SimConfig::new()
            .with_memory_size(4096)
            .with_start_address(0)
            .with_exit_address(8);
        let mut env = SimEnv::from_config(config).unwrap();

        env.bus.store32(0, 0x00000013).unwrap(); // nop
        env.bus.store32(4, 0x00000013).unwrap(); // nop

        let (reason, executed) = env.run_until_halt();
        assert_eq!(reason, ExitReason::ExitAddress);
        assert_eq!(executed, 2);
    }

    #[test]
    fn test_run_until_halt_reserved() {
        let config = SimConfig::new()
            .with_memory_size(4096)
            .with_start_address(0)
            .with_halt_on_reserved(true);
        let mut env = SimEnv::from_config(config).unwrap();

        env.bus.store32(0, 0x00000000).unwrap();

        let (reason, _) = env.run_until_halt();
        assert_eq!(reason, ExitReason::ReservedInstr(0));
    }

    #[test]
    fn test_store_load_through_external_bus() {
        use std::collections::HashMap;
        use std::rc::Rc;
        use std::sync::Mutex;

        // 代码在内部 RAM，数据在 0x10000000（外部回调服务）
        let config = SimConfig::new()
            .with_memory_size(4096)
            .with_start_address(0)
            .with_halt_on_ebreak(true);
        let mut env = SimEnv::from_config(config).unwrap();

        let ext_mem = Rc::new(Mutex::new(HashMap::<u32, u32>::new()));
        let ext_for_cb = Rc::clone(&ext_mem);
        env.register_ext_mem_callback(Box::new(move |addr, _size, is_write, data_in| {
            let mut mem = ext_for_cb.lock().unwrap();
            if is_write {
                mem.insert(addr, data_in);
                Ok(0)
            } else {
                Ok(*mem.get(&addr).unwrap_or(&0))
            }
        }));

        env.bus.ram_mut().store32(0, 0x100000B7).unwrap(); // lui x1, 0x10000
        env.bus.ram_mut().store32(4, 0xABC00113).unwrap(); // addi x2, x0, 0xABC (符号扩展)
        env.bus.ram_mut().store32(8, 0x0020A023).unwrap(); // sw x2, 0(x1)
        env.bus.ram_mut().store32(12, 0x0000A183).unwrap(); // lw x3, 0(x1)
        env.bus.ram_mut().store32(16, 0x00100073).unwrap(); // ebreak

        let (reason, _) = env.run_until_halt();
        assert_eq!(reason, ExitReason::Breakpoint);

        // 12-bit 立即数 0xABC 符号扩展后写出、读回
        assert_eq!(env.cpu.read_reg(3), 0xFFFF_FABC);
        assert_eq!(
            ext_mem.lock().unwrap().get(&0x1000_0000),
            Some(&0xFFFF_FABC)
        );
    }

    #[test]
    fn test_debug_mem_access_does_not_count() {
        let config = SimConfig::new().with_memory_size(4096).with_start_address(0);
        let mut env = SimEnv::from_config(config).unwrap();

        env.write_mem(0x10, 0xAABBCCDD, AccessSize::Word).unwrap();
        assert_eq!(env.read_mem(0x10, AccessSize::Word).unwrap(), 0xAABBCCDD);
        assert_eq!(env.read_mem(0x10, AccessSize::Byte).unwrap(), 0xDD);
        assert_eq!(env.read_mem(0x12, AccessSize::Half).unwrap(), 0xAABB);

        assert_eq!(env.cpu.cycle_count(), 0);
        assert_eq!(env.instructions_executed, 0);
    }

    #[test]
    fn test_trace_stream_receives_lines() {
        use std::sync::{Arc, Mutex};

        // 共享缓冲收集 trace 行
        #[derive(Clone)]
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let buf = SharedBuf(Arc::new(Mutex::new(Vec::new())));
        let config = SimConfig::new()
            .with_memory_size(4096)
            .with_start_address(0)
            .with_disassemble_runtime(true);
        let mut env = SimEnv::from_config(config).unwrap();
        env.set_trace_stream(Box::new(buf.clone()));

        env.bus.store32(0, 0x02A00093).unwrap(); // addi x1, x0, 42
        env.step();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("addi"), "trace should contain disassembly: {}", text);
        assert!(text.contains("00000000: 02a00093"));
    }
}
