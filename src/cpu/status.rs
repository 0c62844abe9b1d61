//! CPU architectural state components: register file(s) and CSR bank.

use std::collections::HashMap;

use super::trap::PrivilegeMode;

/// Generic register file with configurable count, element type, and zero-hardwire behavior.
///
/// - `N`: number of registers
/// - `T`: element type（RV64 扩展时以 u64 实例化）
/// - `ZERO_HARDWIRE`: if true, register 0 always reads as zero and writes are ignored
#[derive(Clone)]
pub struct GenericRegFile<const N: usize, T: Copy + Default, const ZERO_HARDWIRE: bool> {
    regs: [T; N],
}

impl<const N: usize, T: Copy + Default, const ZERO_HARDWIRE: bool>
    GenericRegFile<N, T, ZERO_HARDWIRE>
where
    [T; N]: Default,
{
    pub fn new() -> Self {
        Self { regs: [T::default(); N] }
    }

    #[inline]
    pub fn read(&self, reg: u8) -> T {
        if ZERO_HARDWIRE && reg == 0 {
            T::default()
        } else {
            self.regs[reg as usize]
        }
    }

    #[inline]
    pub fn write(&mut self, reg: u8, value: T) {
        if ZERO_HARDWIRE && reg == 0 {
            return;
        }
        self.regs[reg as usize] = value;
    }

    pub fn snapshot(&self) -> &[T; N] {
        &self.regs
    }

    pub fn restore(&mut self, regs: &[T; N]) {
        self.regs = *regs;
        if ZERO_HARDWIRE {
            self.regs[0] = T::default();
        }
    }

    pub fn clear(&mut self) {
        self.regs = [T::default(); N];
    }
}

impl<const N: usize, T: Copy + Default, const ZERO_HARDWIRE: bool> Default
    for GenericRegFile<N, T, ZERO_HARDWIRE>
where
    [T; N]: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Integer register file x0..x31. x0 is hard-wired to zero.
pub type RegFile = GenericRegFile<32, u32, true>;

/// Floating-point register file f0..f31. No zero-hardwire.
pub type FpRegFile = GenericRegFile<32, u32, false>;

/// Table entry for CSR declaration: name, address, reset value, writable-bit mask.
#[derive(Clone, Copy)]
pub struct CsrEntry {
    pub name: &'static str,
    pub addr: u16,
    pub reset: u32,
    /// 可写位掩码（WARL 统一表达；0 表示整个寄存器只读）
    pub wr_mask: u32,
}

/// 单个已注册 CSR 的存储单元
#[derive(Clone, Copy)]
struct CsrCell {
    value: u32,
    reset: u32,
    wr_mask: u32,
}

/// Masked CSR bank: a hash table indexed by address.
///
/// 已注册的地址集合是封闭的：`read`/`write` 对未注册地址返回
/// `None`，由执行单元转为非法指令异常。
#[derive(Clone, Default)]
pub struct CsrBank {
    table: HashMap<u16, CsrCell>,
}

impl CsrBank {
    pub fn new() -> Self {
        Self { table: HashMap::new() }
    }

    /// Register a batch of CSRs declared as a table.
    pub fn register(&mut self, entries: &[CsrEntry]) {
        for e in entries {
            self.table.insert(
                e.addr,
                CsrCell {
                    value: e.reset,
                    reset: e.reset,
                    wr_mask: e.wr_mask,
                },
            );
        }
    }

    /// 地址是否已注册
    #[inline]
    pub fn is_implemented(&self, addr: u16) -> bool {
        self.table.contains_key(&addr)
    }

    /// 读取寄存器值；未注册地址返回 None
    #[inline]
    pub fn read(&self, addr: u16) -> Option<u32> {
        self.table.get(&addr).map(|c| c.value)
    }

    /// 按可写位掩码写入：new = (old & !mask) | (value & mask)
    ///
    /// 未注册地址返回 None
    #[inline]
    pub fn write(&mut self, addr: u16, value: u32) -> Option<()> {
        let cell = self.table.get_mut(&addr)?;
        cell.value = (cell.value & !cell.wr_mask) | (value & cell.wr_mask);
        Some(())
    }

    /// 绕过掩码的整字写入（trap 交付、状态恢复等内部路径）
    #[inline]
    pub fn force_write(&mut self, addr: u16, value: u32) {
        if let Some(cell) = self.table.get_mut(&addr) {
            cell.value = value;
        }
    }

    /// 可写位掩码；未注册地址返回 None
    #[inline]
    pub fn wr_mask(&self, addr: u16) -> Option<u32> {
        self.table.get(&addr).map(|c| c.wr_mask)
    }

    /// 全部已注册 CSR 复位为各自的复位值
    pub fn reset(&mut self) {
        for cell in self.table.values_mut() {
            cell.value = cell.reset;
        }
    }

    /// 地址到当前值的快照
    pub fn snapshot(&self) -> HashMap<u16, u32> {
        self.table.iter().map(|(&a, c)| (a, c.value)).collect()
    }

    /// 从快照恢复（只恢复已注册地址的值，掩码不变）
    pub fn restore(&mut self, values: &HashMap<u16, u32>) {
        for (&addr, &value) in values {
            self.force_write(addr, value);
        }
    }
}

/// Aggregated architectural state: integer RF, optional FP RF, and CSR bank.
#[derive(Clone)]
pub struct Status {
    pub int: RegFile,
    pub fp: Option<FpRegFile>,
    pub csr: CsrBank,
    /// Current privilege mode
    pub privilege: PrivilegeMode,
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

impl Status {
    pub fn new() -> Self {
        Self {
            int: RegFile::new(),
            fp: None,
            csr: CsrBank::new(),
            privilege: PrivilegeMode::Machine, // 启动时为 M-mode
        }
    }

    /// Enable floating-point state (F extension) on demand.
    pub fn enable_fp(&mut self) {
        if self.fp.is_none() {
            self.fp = Some(FpRegFile::new());
        }
    }

    // Integer register file access
    #[inline]
    pub fn int_read(&self, reg: u8) -> u32 {
        self.int.read(reg)
    }

    #[inline]
    pub fn int_write(&mut self, reg: u8, value: u32) {
        self.int.write(reg, value)
    }

    /// 逻辑复位：寄存器清零、CSR 回到复位值、特权级回到 M-mode
    pub fn reset(&mut self) {
        self.int.clear();
        if let Some(fp) = self.fp.as_mut() {
            fp.clear();
        }
        self.csr.reset();
        self.privilege = PrivilegeMode::Machine;
    }

    /// Snapshot all architectural state at once.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            int: *self.int.snapshot(),
            fp: self.fp.as_ref().map(|f| *f.snapshot()),
            csr: self.csr.snapshot(),
            privilege: self.privilege,
        }
    }

    /// 从快照恢复全部架构状态
    pub fn restore(&mut self, snapshot: &StatusSnapshot) {
        self.int.restore(&snapshot.int);
        if let (Some(fp), Some(values)) = (self.fp.as_mut(), snapshot.fp.as_ref()) {
            fp.restore(values);
        }
        self.csr.restore(&snapshot.csr);
        self.privilege = snapshot.privilege;
    }
}

/// Snapshot of all architectural state.
///
/// 布局在单次构建内保持稳定，用于保存/恢复流程。
#[derive(Clone, Debug)]
pub struct StatusSnapshot {
    pub int: [u32; 32],
    pub fp: Option<[u32; 32]>,
    pub csr: HashMap<u16, u32>,
    pub privilege: PrivilegeMode,
}
