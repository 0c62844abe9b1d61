//! 内存抽象层
//!
//! 定义内存访问的统一接口 `Memory` trait、线性内存实现 `FlatMemory`，
//! 以及协同仿真总线 `CoSimBus`：内部 RAM 窗口直接服务访问，窗口外的
//! 地址交给注册的外部回调（例如 VHDL 侧的总线功能模型）同步处理。

use thiserror::Error;

/// 访存粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    Byte,
    Half,
    Word,
}

impl AccessSize {
    pub fn bytes(self) -> usize {
        match self {
            AccessSize::Byte => 1,
            AccessSize::Half => 2,
            AccessSize::Word => 4,
        }
    }
}

/// 内存访问错误
///
/// 执行核把这些错误映射为对应的架构 trap（misaligned / access fault）
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// 地址未按访问粒度对齐
    #[error("unaligned {access:?} access at 0x{addr:08x}")]
    Unaligned { addr: u32, access: AccessSize },
    /// 地址越界且无外部回调可以服务
    #[error("out-of-range {access:?} access at 0x{addr:08x} (ram 0x{base:08x}..+0x{size:x})")]
    OutOfRange {
        addr: u32,
        access: AccessSize,
        base: u32,
        size: usize,
    },
    /// 外部回调报告总线错误
    #[error("external bus fault on {access:?} access at 0x{addr:08x} (write={is_write})")]
    BusFault {
        addr: u32,
        access: AccessSize,
        is_write: bool,
    },
}

pub type MemResult<T> = Result<T, MemError>;

/// 内存访问的统一接口
///
/// 执行核只通过该 trait 访存，便于接入多种内存模型
/// （平坦 RAM、协同仿真总线、调试桩等）
pub trait Memory {
    /// 从指定地址读取 8 位数据
    fn load8(&mut self, addr: u32) -> MemResult<u8>;

    /// 从指定地址读取 16 位数据（小端序）
    fn load16(&mut self, addr: u32) -> MemResult<u16>;

    /// 从指定地址读取 32 位数据（小端序）
    fn load32(&mut self, addr: u32) -> MemResult<u32>;

    /// 向指定地址写入 8 位数据
    fn store8(&mut self, addr: u32, value: u8) -> MemResult<()>;

    /// 向指定地址写入 16 位数据（小端序）
    fn store16(&mut self, addr: u32, value: u16) -> MemResult<()>;

    /// 向指定地址写入 32 位数据（小端序）
    fn store32(&mut self, addr: u32, value: u32) -> MemResult<()>;
}

/// 简单线性内存实现
///
/// 使用 `Vec<u8>` 存储一段工作集，支持基地址偏移以模拟内存映射。
/// 对齐检查先于越界检查，越界错误由上层决定是否转交外部回调。
pub struct FlatMemory {
    /// 内存数据存储
    data: Vec<u8>,
    /// 内存映射起始地址
    base_addr: u32,
}

impl FlatMemory {
    /// 创建一个指定大小的内存区域
    ///
    /// # 参数
    ///
    /// * `size` - 内存大小（字节数）
    /// * `base_addr` - 内存映射的起始地址
    pub fn new(size: usize, base_addr: u32) -> Self {
        FlatMemory {
            data: vec![0; size],
            base_addr,
        }
    }

    /// 获取内存的基地址
    pub fn base_addr(&self) -> u32 {
        self.base_addr
    }

    /// 获取内存的大小
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn ensure_aligned(addr: u32, access: AccessSize) -> MemResult<()> {
        match access {
            AccessSize::Byte => Ok(()),
            AccessSize::Half if addr % 2 == 0 => Ok(()),
            AccessSize::Word if addr % 4 == 0 => Ok(()),
            _ => Err(MemError::Unaligned { addr, access }),
        }
    }

    fn bounds_check(&self, addr: u32, len: usize, access: AccessSize) -> MemResult<usize> {
        let oor = MemError::OutOfRange {
            addr,
            access,
            base: self.base_addr,
            size: self.data.len(),
        };

        let relative = addr.checked_sub(self.base_addr).ok_or(oor)? as usize;
        let end = relative.checked_add(len).ok_or(oor)?;
        if end > self.data.len() {
            return Err(oor);
        }

        Ok(relative)
    }

    /// 地址范围是否完全落在本内存窗口内
    pub fn contains(&self, addr: u32, len: usize) -> bool {
        self.bounds_check(addr, len, AccessSize::Byte).is_ok()
    }

    /// 批量写入数据到内存（用于程序加载）
    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> MemResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let start = self.bounds_check(addr, data.len(), AccessSize::Byte)?;
        let end = start + data.len();
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    /// 批量读取数据
    pub fn read_bytes(&self, addr: u32, len: usize) -> MemResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = self.bounds_check(addr, len, AccessSize::Byte)?;
        let end = start + len;
        Ok(self.data[start..end].to_vec())
    }

    /// 将指定范围填充为固定字节（用于 .bss 清零）
    pub fn fill(&mut self, addr: u32, len: usize, value: u8) -> MemResult<()> {
        if len == 0 {
            return Ok(());
        }
        let start = self.bounds_check(addr, len, AccessSize::Byte)?;
        let end = start + len;
        self.data[start..end].fill(value);
        Ok(())
    }
}

impl Memory for FlatMemory {
    fn load8(&mut self, addr: u32) -> MemResult<u8> {
        let idx = self.bounds_check(addr, 1, AccessSize::Byte)?;
        Ok(self.data[idx])
    }

    fn load16(&mut self, addr: u32) -> MemResult<u16> {
        Self::ensure_aligned(addr, AccessSize::Half)?;
        let idx = self.bounds_check(addr, 2, AccessSize::Half)?;
        Ok(u16::from_le_bytes([self.data[idx], self.data[idx + 1]]))
    }

    fn load32(&mut self, addr: u32) -> MemResult<u32> {
        Self::ensure_aligned(addr, AccessSize::Word)?;
        let idx = self.bounds_check(addr, 4, AccessSize::Word)?;
        Ok(u32::from_le_bytes([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]))
    }

    fn store8(&mut self, addr: u32, value: u8) -> MemResult<()> {
        let idx = self.bounds_check(addr, 1, AccessSize::Byte)?;
        self.data[idx] = value;
        Ok(())
    }

    fn store16(&mut self, addr: u32, value: u16) -> MemResult<()> {
        Self::ensure_aligned(addr, AccessSize::Half)?;
        let idx = self.bounds_check(addr, 2, AccessSize::Half)?;
        self.data[idx..idx + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn store32(&mut self, addr: u32, value: u32) -> MemResult<()> {
        Self::ensure_aligned(addr, AccessSize::Word)?;
        let idx = self.bounds_check(addr, 4, AccessSize::Word)?;
        self.data[idx..idx + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

/// 外部内存回调
///
/// `fn(byte_addr, size, is_write, data_in) -> Result<data_out, ()>`
///
/// 被调方同步服务本次访问：读访问返回数据（data_in 忽略），写访问
/// 返回值忽略。返回 `Err(())` 表示总线错误，仿真器将产生相应的
/// access-fault trap。
pub type ExtMemCallback = Box<dyn FnMut(u32, AccessSize, bool, u32) -> Result<u32, ()>>;

/// 协同仿真总线
///
/// 内部 RAM 窗口内的访问直接由 `FlatMemory` 服务；窗口外的地址交给
/// 注册的外部回调。未注册回调时窗口外访问保持 OutOfRange 错误，
/// 由执行核转为 access-fault trap。
pub struct CoSimBus {
    ram: FlatMemory,
    ext_callback: Option<ExtMemCallback>,
}

impl CoSimBus {
    /// 以给定的内部 RAM 窗口创建总线
    pub fn new(ram: FlatMemory) -> Self {
        Self {
            ram,
            ext_callback: None,
        }
    }

    /// 注册外部内存回调
    pub fn register_ext_callback(&mut self, callback: ExtMemCallback) {
        self.ext_callback = Some(callback);
    }

    /// 内部 RAM 窗口的引用（程序加载等）
    pub fn ram(&self) -> &FlatMemory {
        &self.ram
    }

    /// 内部 RAM 窗口的可变引用
    pub fn ram_mut(&mut self) -> &mut FlatMemory {
        &mut self.ram
    }

    fn ext_read(&mut self, addr: u32, access: AccessSize, oor: MemError) -> MemResult<u32> {
        match self.ext_callback.as_mut() {
            Some(cb) => cb(addr, access, false, 0).map_err(|_| MemError::BusFault {
                addr,
                access,
                is_write: false,
            }),
            None => Err(oor),
        }
    }

    fn ext_write(&mut self, addr: u32, access: AccessSize, data: u32, oor: MemError) -> MemResult<()> {
        match self.ext_callback.as_mut() {
            Some(cb) => cb(addr, access, true, data).map(|_| ()).map_err(|_| MemError::BusFault {
                addr,
                access,
                is_write: true,
            }),
            None => Err(oor),
        }
    }
}

impl Memory for CoSimBus {
    fn load8(&mut self, addr: u32) -> MemResult<u8> {
        match self.ram.load8(addr) {
            Err(oor @ MemError::OutOfRange { .. }) => {
                self.ext_read(addr, AccessSize::Byte, oor).map(|v| v as u8)
            }
            other => other,
        }
    }

    fn load16(&mut self, addr: u32) -> MemResult<u16> {
        match self.ram.load16(addr) {
            Err(oor @ MemError::OutOfRange { .. }) => {
                self.ext_read(addr, AccessSize::Half, oor).map(|v| v as u16)
            }
            other => other,
        }
    }

    fn load32(&mut self, addr: u32) -> MemResult<u32> {
        match self.ram.load32(addr) {
            Err(oor @ MemError::OutOfRange { .. }) => self.ext_read(addr, AccessSize::Word, oor),
            other => other,
        }
    }

    fn store8(&mut self, addr: u32, value: u8) -> MemResult<()> {
        match self.ram.store8(addr, value) {
            Err(oor @ MemError::OutOfRange { .. }) => {
                self.ext_write(addr, AccessSize::Byte, value as u32, oor)
            }
            other => other,
        }
    }

    fn store16(&mut self, addr: u32, value: u16) -> MemResult<()> {
        match self.ram.store16(addr, value) {
            Err(oor @ MemError::OutOfRange { .. }) => {
                self.ext_write(addr, AccessSize::Half, value as u32, oor)
            }
            other => other,
        }
    }

    fn store32(&mut self, addr: u32, value: u32) -> MemResult<()> {
        match self.ram.store32(addr, value) {
            Err(oor @ MemError::OutOfRange { .. }) => {
                self.ext_write(addr, AccessSize::Word, value, oor)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::sync::Mutex;

    #[test]
    fn test_flat_memory_basic() {
        let mut mem = FlatMemory::new(1024, 0);

        mem.store8(0, 0x12).unwrap();
        assert_eq!(mem.load8(0).unwrap(), 0x12);

        mem.store16(2, 0x3456).unwrap();
        assert_eq!(mem.load16(2).unwrap(), 0x3456);
        assert_eq!(mem.load8(2).unwrap(), 0x56); // 低字节
        assert_eq!(mem.load8(3).unwrap(), 0x34); // 高字节

        mem.store32(4, 0x78ABCDEF).unwrap();
        assert_eq!(mem.load32(4).unwrap(), 0x78ABCDEF);
        assert_eq!(mem.load8(4).unwrap(), 0xEF); // 最低字节
        assert_eq!(mem.load8(7).unwrap(), 0x78); // 最高字节
    }

    #[test]
    fn test_flat_memory_with_base_addr() {
        let mut mem = FlatMemory::new(1024, 0x1000);

        mem.store32(0x1000, 0xDEADBEEF).unwrap();
        assert_eq!(mem.load32(0x1000).unwrap(), 0xDEADBEEF);

        // 基地址以下越界
        assert!(matches!(
            mem.load8(0xFFF).unwrap_err(),
            MemError::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_write_bytes_round_trip() {
        let mut mem = FlatMemory::new(1024, 0);
        mem.write_bytes(0, &[0x01, 0x02, 0x03, 0x04]).unwrap();
        assert_eq!(mem.load32(0).unwrap(), 0x04030201); // 小端序
        assert_eq!(mem.read_bytes(0, 4).unwrap(), vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_unaligned_access() {
        let mut mem = FlatMemory::new(1024, 0);
        assert!(matches!(
            mem.load16(1).unwrap_err(),
            MemError::Unaligned { addr: 1, .. }
        ));
        assert!(matches!(
            mem.load32(2).unwrap_err(),
            MemError::Unaligned { addr: 2, .. }
        ));
        assert!(matches!(
            mem.store32(6, 0).unwrap_err(),
            MemError::Unaligned { addr: 6, .. }
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut mem = FlatMemory::new(1024, 0);
        assert!(matches!(
            mem.load8(2000).unwrap_err(),
            MemError::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_cosim_bus_window_hit() {
        let mut bus = CoSimBus::new(FlatMemory::new(1024, 0));
        bus.store32(16, 0xCAFEBABE).unwrap();
        assert_eq!(bus.load32(16).unwrap(), 0xCAFEBABE);
    }

    #[test]
    fn test_cosim_bus_no_callback_faults() {
        let mut bus = CoSimBus::new(FlatMemory::new(1024, 0));
        assert!(matches!(
            bus.load32(0x8000_0000).unwrap_err(),
            MemError::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_cosim_bus_callback_services_external() {
        // 外部回调以 HashMap 模拟一块远端内存
        let ext_mem = Rc::new(Mutex::new(HashMap::<u32, u32>::new()));
        let ext_for_cb = Rc::clone(&ext_mem);

        let mut bus = CoSimBus::new(FlatMemory::new(1024, 0));
        bus.register_ext_callback(Box::new(move |addr, _size, is_write, data_in| {
            let mut mem = ext_for_cb.lock().unwrap();
            if is_write {
                mem.insert(addr, data_in);
                Ok(0)
            } else {
                Ok(*mem.get(&addr).unwrap_or(&0))
            }
        }));

        bus.store32(0x8000_0000, 0x12345678).unwrap();
        assert_eq!(bus.load32(0x8000_0000).unwrap(), 0x12345678);
        assert_eq!(ext_mem.lock().unwrap().get(&0x8000_0000), Some(&0x12345678));

        // 窗口内访问仍然走内部 RAM
        bus.store32(0, 0x1111).unwrap();
        assert_eq!(bus.load32(0).unwrap(), 0x1111);
    }

    #[test]
    fn test_cosim_bus_callback_fault() {
        let mut bus = CoSimBus::new(FlatMemory::new(1024, 0));
        bus.register_ext_callback(Box::new(|_, _, _, _| Err(())));

        assert!(matches!(
            bus.load32(0x8000_0000).unwrap_err(),
            MemError::BusFault { is_write: false, .. }
        ));
        assert!(matches!(
            bus.store8(0x8000_0000, 1).unwrap_err(),
            MemError::BusFault { is_write: true, .. }
        ));
    }

    #[test]
    fn test_cosim_bus_unaligned_checked_before_callback() {
        // 对齐错误在转交回调之前报告
        let mut bus = CoSimBus::new(FlatMemory::new(1024, 0));
        bus.register_ext_callback(Box::new(|_, _, _, _| Ok(0)));
        assert!(matches!(
            bus.load32(0x8000_0002).unwrap_err(),
            MemError::Unaligned { .. }
        ));
    }
}
