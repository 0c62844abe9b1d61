//! CPU 核心测试

use super::csr_def::*;
use super::*;
use crate::memory::FlatMemory;

/// 将指令写入内存
fn write_instr(mem: &mut FlatMemory, addr: u32, instr: u32) {
    mem.store32(addr, instr).expect("failed to write test instruction");
}

/// 将压缩指令写入内存
fn write_instr16(mem: &mut FlatMemory, addr: u32, instr: u16) {
    mem.store16(addr, instr).expect("failed to write test instruction");
}

#[test]
fn test_addi() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    // addi x1, x0, 42
    write_instr(&mut mem, 0, 0x02A00093);
    cpu.step(&mut mem);

    assert_eq!(cpu.read_reg(1), 42);
    assert_eq!(cpu.pc(), 4);
    assert_eq!(cpu.instret_count(), 1);
    assert_eq!(cpu.cycle_count(), 1);
}

#[test]
fn test_add_sub() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    // addi x1, x0, 10
    write_instr(&mut mem, 0, 0x00A00093);
    // addi x2, x0, 20
    write_instr(&mut mem, 4, 0x01400113);
    // add x3, x1, x2
    write_instr(&mut mem, 8, 0x002081B3);
    // sub x4, x2, x1
    write_instr(&mut mem, 12, 0x40110233);

    cpu.run(&mut mem, 4);

    assert_eq!(cpu.read_reg(3), 30);
    assert_eq!(cpu.read_reg(4), 10);
}

#[test]
fn test_lw_sw() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    // addi x1, x0, 0x42
    write_instr(&mut mem, 0, 0x04200093);
    // addi x2, x0, 100
    write_instr(&mut mem, 4, 0x06400113);
    // sw x1, 0(x2)
    write_instr(&mut mem, 8, 0x00112023);
    // lw x3, 0(x2)
    write_instr(&mut mem, 12, 0x00012183);

    cpu.run(&mut mem, 4);

    assert_eq!(cpu.read_reg(3), 0x42);
    assert_eq!(mem.load32(100).unwrap(), 0x42);
}

#[test]
fn test_sign_extension_lb_lbu() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    // addi x1, x0, 255 (0xFF)
    write_instr(&mut mem, 0, 0x0FF00093);
    // addi x2, x0, 100
    write_instr(&mut mem, 4, 0x06400113);
    // sb x1, 0(x2)
    write_instr(&mut mem, 8, 0x00110023);
    // lb x3, 0(x2)
    write_instr(&mut mem, 12, 0x00010183);
    // lbu x4, 0(x2)
    write_instr(&mut mem, 16, 0x00014203);

    cpu.run(&mut mem, 5);

    assert_eq!(cpu.read_reg(3), 0xFFFF_FFFF); // 符号扩展
    assert_eq!(cpu.read_reg(4), 0x0000_00FF); // 零扩展
}

#[test]
fn test_beq_taken_and_not_taken() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    // addi x1, x0, 5
    write_instr(&mut mem, 0, 0x00500093);
    // addi x2, x0, 5
    write_instr(&mut mem, 4, 0x00500113);
    // beq x1, x2, 8 (跳转到 16)
    write_instr(&mut mem, 8, 0x00208463);
    // addi x3, x0, 1 (被跳过)
    write_instr(&mut mem, 12, 0x00100193);

    cpu.run(&mut mem, 3);

    assert_eq!(cpu.pc(), 16);
    assert_eq!(cpu.read_reg(3), 0);
}

#[test]
fn test_jal_link() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    // jal x1, 8
    write_instr(&mut mem, 0, 0x008000EF);
    cpu.step(&mut mem);

    assert_eq!(cpu.read_reg(1), 4); // 返回地址 = PC + 4
    assert_eq!(cpu.pc(), 8);
}

#[test]
fn test_jalr_odd_target_traps_misaligned() {
    // 对齐检查作用于 rs1 + imm 原值（bit 0 清除之前），
    // mtval 记录未清除的目标
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_c_extension().build().unwrap();

    cpu.csr_write(CSR_MTVEC, 0x100);
    // addi x1, x0, 0x21
    write_instr(&mut mem, 0, 0x02100093);
    // jalr x2, 0(x1)
    write_instr(&mut mem, 4, 0x00008167);

    cpu.run(&mut mem, 2);

    assert_eq!(cpu.pc(), 0x100);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 0); // instruction-address-misaligned
    assert_eq!(cpu.csr_read(CSR_MTVAL), 0x21);
    assert_eq!(cpu.csr_read(CSR_MEPC), 4);
    // trap 的 JALR 不写链接寄存器
    assert_eq!(cpu.read_reg(2), 0);
}

#[test]
fn test_jalr_even_target_jumps() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    // addi x1, x0, 0x40
    write_instr(&mut mem, 0, 0x04000093);
    // jalr x2, 0(x1)
    write_instr(&mut mem, 4, 0x00008167);

    cpu.run(&mut mem, 2);

    assert_eq!(cpu.pc(), 0x40);
    assert_eq!(cpu.read_reg(2), 8); // 返回地址
}

#[test]
fn test_lui_auipc() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0x100);

    // lui x1, 0x12345
    write_instr(&mut mem, 0x100, 0x123450B7);
    // auipc x2, 0x12345
    write_instr(&mut mem, 0x104, 0x12345117);

    cpu.run(&mut mem, 2);

    assert_eq!(cpu.read_reg(1), 0x12345000);
    assert_eq!(cpu.read_reg(2), 0x104 + 0x12345000);
}

#[test]
fn test_x0_always_zero() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    // addi x0, x0, 42
    write_instr(&mut mem, 0, 0x02A00013);
    cpu.step(&mut mem);

    assert_eq!(cpu.read_reg(0), 0);
}

#[test]
fn test_ecall_traps() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    cpu.csr_write(CSR_MTVEC, 0x100);
    write_instr(&mut mem, 0, 0x00000073); // ecall

    let state = cpu.step(&mut mem);

    assert_eq!(state, CpuState::Running); // trap 后继续运行
    assert_eq!(cpu.pc(), 0x100);
    assert_eq!(cpu.csr_read(CSR_MEPC), 0);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 11); // ecall from M-mode
    // 发生 trap 的指令不退休
    assert_eq!(cpu.instret_count(), 0);
    assert_eq!(cpu.cycle_count(), 1 + TRAP_EXTRA_CYCLES);
}

#[test]
fn test_ebreak_traps_with_mtval() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    cpu.csr_write(CSR_MTVEC, 0x200);
    write_instr(&mut mem, 0, 0x00100073); // ebreak

    cpu.step(&mut mem);

    assert_eq!(cpu.pc(), 0x200);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 3); // breakpoint
    assert_eq!(cpu.csr_read(CSR_MTVAL), 0); // 断点指令地址
}

#[test]
fn test_halt_on_ebreak() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).halt_on_ebreak(true).build().unwrap();

    // addi x1, x0, 1
    write_instr(&mut mem, 0, 0x00100093);
    // ebreak
    write_instr(&mut mem, 4, 0x00100073);

    let (executed, state) = cpu.run(&mut mem, 100);

    assert_eq!(state, CpuState::Halted(HaltCause::Ebreak));
    assert_eq!(executed, 2);
    assert_eq!(cpu.pc(), 4); // 停在 EBREAK 自身
    assert_eq!(cpu.instret_count(), 2); // EBREAK 计入退休
}

#[test]
fn test_halt_on_reserved() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).halt_on_reserved(true).build().unwrap();

    write_instr(&mut mem, 0, 0x00000000); // 非法编码

    let state = cpu.step(&mut mem);
    assert_eq!(state, CpuState::IllegalInstruction(0));
    assert_eq!(cpu.pc(), 0);
}

#[test]
fn test_illegal_instruction_traps_by_default() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    cpu.csr_write(CSR_MTVEC, 0x300);
    write_instr(&mut mem, 0, 0xFFFF_FFFF);

    let state = cpu.step(&mut mem);
    assert_eq!(state, CpuState::Running);
    assert_eq!(cpu.pc(), 0x300);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 2);
    assert_eq!(cpu.csr_read(CSR_MTVAL), 0xFFFF_FFFF); // 指令编码
}

#[test]
fn test_misaligned_load_trap() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    cpu.csr_write(CSR_MTVEC, 0x100);
    // addi x1, x0, 2
    write_instr(&mut mem, 0, 0x00200093);
    // lw x2, 0(x1) -> 地址 2 未按 4 对齐
    write_instr(&mut mem, 4, 0x0000A103);

    cpu.run(&mut mem, 2);

    assert_eq!(cpu.pc(), 0x100);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 4); // load address misaligned
    assert_eq!(cpu.csr_read(CSR_MTVAL), 2);
    assert_eq!(cpu.csr_read(CSR_MEPC), 4);
    assert_eq!(cpu.last_access_addr(), 2);
}

#[test]
fn test_load_access_fault_outside_window() {
    use crate::memory::CoSimBus;

    let mut bus = CoSimBus::new(FlatMemory::new(1024, 0));
    let mut cpu = CpuCore::new(0);

    cpu.csr_write(CSR_MTVEC, 0x100);
    // lui x1, 0x80000
    bus.ram_mut().store32(0, 0x800000B7).unwrap();
    // lw x2, 0(x1) -> 0x80000000 无回调
    bus.ram_mut().store32(4, 0x0000A103).unwrap();

    cpu.run(&mut bus, 2);

    assert_eq!(cpu.pc(), 0x100);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 5); // load access fault
    assert_eq!(cpu.csr_read(CSR_MTVAL), 0x8000_0000);
}

#[test]
fn test_fetch_fault() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0x2000); // RAM 之外

    cpu.csr_write(CSR_MTVEC, 0x100);
    let state = cpu.step(&mut mem);

    assert_eq!(state, CpuState::Running);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 1); // instruction access fault
    assert_eq!(cpu.csr_read(CSR_MEPC), 0x2000);
    assert_eq!(cpu.pc(), 0x100);
}

#[test]
fn test_take_trap_vectored() {
    let mut cpu = CpuBuilder::new(0x1000).with_zicsr_extension().build().unwrap();

    // vectored mode, base = 0x8000_0000
    cpu.csr_write(CSR_MTVEC, 0x8000_0001);

    // 异常到 base
    cpu.take_trap(TrapCause::IllegalInstruction, 0xDEADBEEF);
    assert_eq!(cpu.pc(), 0x8000_0000);
    assert_eq!(cpu.csr_read(CSR_MTVAL), 0xDEADBEEF);

    // 中断到 base + 4*cause
    cpu.set_pc(0x2000);
    cpu.take_trap(TrapCause::MachineTimerInterrupt, 0);
    assert_eq!(cpu.pc(), 0x8000_0000 + 4 * 7);
}

#[test]
fn test_mstatus_stack_on_trap() {
    let mut cpu = CpuBuilder::new(0x1000).with_zicsr_extension().build().unwrap();

    cpu.csr_write(CSR_MTVEC, 0x8000_0000);
    cpu.csr_write(CSR_MSTATUS, 0x8); // MIE = 1

    let pc_before = cpu.pc();
    cpu.take_trap(TrapCause::EcallFromM, 0);

    assert_eq!(cpu.csr_read(CSR_MEPC), pc_before);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 11);

    let mstatus = cpu.csr_read(CSR_MSTATUS);
    assert_eq!((mstatus >> 7) & 1, 1, "MPIE = old MIE");
    assert_eq!((mstatus >> 3) & 1, 0, "MIE cleared");
    assert_eq!((mstatus >> 11) & 3, 3, "MPP = Machine");
    assert_eq!(cpu.pc(), 0x8000_0000);
}

#[test]
fn test_trap_and_mret_cycle() {
    use crate::isa::MRET_ENCODING;

    let mut mem = FlatMemory::new(0x10000, 0);
    let mut cpu = CpuBuilder::new(0x1000)
        .with_zicsr_extension()
        .with_priv_extension()
        .build()
        .unwrap();

    let handler_addr = 0x8000u32;
    cpu.csr_write(CSR_MTVEC, handler_addr);
    cpu.csr_write(CSR_MSTATUS, 1 << 3); // MIE = 1

    write_instr(&mut mem, handler_addr, MRET_ENCODING);

    let original_pc = cpu.pc();
    cpu.take_trap(TrapCause::EcallFromM, 0);

    assert_eq!(cpu.pc(), handler_addr);
    assert_eq!(cpu.csr_read(CSR_MEPC), original_pc);

    // handler 中执行 MRET
    cpu.step(&mut mem);

    assert_eq!(cpu.pc(), original_pc);
    let mstatus = cpu.csr_read(CSR_MSTATUS);
    assert_eq!((mstatus >> 3) & 1, 1, "MIE restored from MPIE");
    assert_eq!((mstatus >> 7) & 1, 1, "MPIE set");
    // MPP 回到 U，特权级变为 U
    assert_eq!((mstatus >> 11) & 3, 0);
    assert_eq!(cpu.privilege(), PrivilegeMode::User);
}

#[test]
fn test_wfi_parks_and_interrupt_resumes() {
    use crate::cpu::trap::mip;
    use crate::isa::WFI_ENCODING;

    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0)
        .with_zicsr_extension()
        .with_priv_extension()
        .build()
        .unwrap();

    cpu.csr_write(CSR_MTVEC, 0x100);
    cpu.csr_write(CSR_MSTATUS, 1 << 3); // MIE
    cpu.csr_write(CSR_MIE, mip::MSI_MASK);

    write_instr(&mut mem, 0, WFI_ENCODING);
    write_instr(&mut mem, 0x100, 0x00000013); // handler: nop

    let state = cpu.step(&mut mem);
    assert_eq!(state, CpuState::WaitForInterrupt);

    // 无中断时保持挂起
    assert_eq!(cpu.step(&mut mem), CpuState::WaitForInterrupt);

    // 软件中断挂起：下一步恢复并 trap
    cpu.csr_write(CSR_MIP, mip::MSI_MASK);
    let state = cpu.step(&mut mem);
    assert_eq!(state, CpuState::Running);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 0x8000_0003);
}

#[test]
fn test_interrupt_callback_delivery() {
    use crate::cpu::trap::mip;

    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_zicsr_extension().build().unwrap();

    cpu.csr_write(CSR_MTVEC, 0x100);
    cpu.csr_write(CSR_MSTATUS, 1 << 3);
    cpu.csr_write(CSR_MIE, mip::MTI_MASK);

    cpu.register_int_callback(Box::new(|| IntRequest {
        pending: mip::MTI_MASK,
        stop: false,
    }));

    // addi x1, x0, 1（不会执行：中断先被接受，本步执行 handler 处的指令）
    write_instr(&mut mem, 0, 0x00100093);
    write_instr(&mut mem, 0x100, 0x00000013); // handler: nop

    cpu.step(&mut mem);

    assert_eq!(cpu.csr_read(CSR_MCAUSE), 0x8000_0007);
    assert_eq!(cpu.csr_read(CSR_MEPC), 0); // 下一条要执行的指令
    // handler 地址处的指令在同一步被取指执行
    assert_eq!(cpu.pc(), 0x104);
}

#[test]
fn test_interrupt_priority_order() {
    use crate::cpu::trap::mip;

    let mut cpu = CpuBuilder::new(0).with_zicsr_extension().build().unwrap();
    cpu.csr_write(CSR_MTVEC, 0x100);
    cpu.csr_write(CSR_MSTATUS, 1 << 3);
    cpu.csr_write(CSR_MIE, mip::M_MASK);

    cpu.register_int_callback(Box::new(|| IntRequest {
        pending: mip::MEI_MASK | mip::MSI_MASK | mip::MTI_MASK,
        stop: false,
    }));

    cpu.process_interrupts();
    // MEI 优先
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 0x8000_000B);
}

#[test]
fn test_interrupt_gated_by_mie() {
    use crate::cpu::trap::mip;

    let mut cpu = CpuBuilder::new(0).with_zicsr_extension().build().unwrap();
    cpu.csr_write(CSR_MTVEC, 0x100);
    // mstatus.MIE = 0：不接受
    cpu.csr_write(CSR_MIE, mip::MTI_MASK);
    cpu.register_int_callback(Box::new(|| IntRequest {
        pending: mip::MTI_MASK,
        stop: false,
    }));

    assert!(!cpu.process_interrupts());

    // mie 位未使能：同样不接受
    cpu.csr_write(CSR_MSTATUS, 1 << 3);
    cpu.csr_write(CSR_MIE, 0);
    assert!(!cpu.process_interrupts());
}

#[test]
fn test_stop_request_via_callback() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    cpu.register_int_callback(Box::new(|| IntRequest {
        pending: 0,
        stop: true,
    }));

    write_instr(&mut mem, 0, 0x00100093);
    let state = cpu.step(&mut mem);
    assert_eq!(state, CpuState::Halted(HaltCause::StopRequest));
    assert_eq!(cpu.read_reg(1), 0); // 指令未执行
}

#[test]
fn test_timer_interrupt_from_mtimecmp() {
    use crate::cpu::trap::mip;

    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_zicsr_extension().build().unwrap();

    cpu.csr_write(CSR_MTVEC, 0x100);
    cpu.csr_write(CSR_MSTATUS, 1 << 3);
    cpu.csr_write(CSR_MIE, mip::MTI_MASK);
    cpu.csr_write(CSR_MTIMECMP, 2); // mtime(=cycle) >= 2 时挂起

    // nop 序列
    write_instr(&mut mem, 0, 0x00000013);
    write_instr(&mut mem, 4, 0x00000013);
    write_instr(&mut mem, 8, 0x00000013);
    write_instr(&mut mem, 0x100, 0x00000013); // handler: nop

    cpu.step(&mut mem); // cycle 1
    cpu.step(&mut mem); // cycle 2
    assert_ne!(cpu.csr_read(CSR_MCAUSE), 0x8000_0007);
    cpu.step(&mut mem); // cycle >= 2，MTI 交付
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 0x8000_0007);
}

#[test]
fn test_compressed_step() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_c_extension().build().unwrap();

    // c.li x1, 5
    write_instr16(&mut mem, 0, 0x4095);
    // c.addi x1, -1
    write_instr16(&mut mem, 2, 0x10FD);
    // 32-bit addi x2, x1, 0
    write_instr(&mut mem, 4, 0x00008113);

    cpu.step(&mut mem);
    assert_eq!(cpu.pc(), 2); // 压缩指令推进 2
    assert_eq!(cpu.read_reg(1), 5);

    cpu.step(&mut mem);
    assert_eq!(cpu.pc(), 4);
    assert_eq!(cpu.read_reg(1), 4);

    cpu.step(&mut mem);
    assert_eq!(cpu.pc(), 8); // 32-bit 指令推进 4
    assert_eq!(cpu.read_reg(2), 4);

    assert_eq!(cpu.instret_count(), 3);
}

#[test]
fn test_compressed_jal_link() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_c_extension().build().unwrap();

    // c.jal +8 (RV32: rd = x1, 返回地址 = PC + 2)
    // offset=8 -> inst[5:3]=100: 001 00000000 100 01
    write_instr16(&mut mem, 0, 0x2021);
    cpu.step(&mut mem);

    assert_eq!(cpu.read_reg(1), 2); // 压缩 JAL 的链接值为 PC + 2
    assert_eq!(cpu.pc(), 8);
}

#[test]
fn test_counters_mirror_csrs() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_zicsr_extension().build().unwrap();

    write_instr(&mut mem, 0, 0x00000013); // nop
    write_instr(&mut mem, 4, 0x00000013);
    cpu.run(&mut mem, 2);

    assert_eq!(cpu.csr_read(CSR_MCYCLE) as u64, cpu.cycle_count());
    assert_eq!(cpu.csr_read(CSR_MINSTRET) as u64, cpu.instret_count());
    assert_eq!(cpu.csr_read(CSR_CYCLE) as u64, cpu.cycle_count());
    assert_eq!(cpu.csr_read(CSR_INSTRET), 2);
}

#[test]
fn test_csr_write_masks() {
    let mut cpu = CpuBuilder::new(0).with_zicsr_extension().build().unwrap();

    // mepc bit 0 恒零
    cpu.csr_write(CSR_MEPC, 0x1003);
    assert_eq!(cpu.csr_read(CSR_MEPC), 0x1002);

    // mtvec bit 1 保留
    cpu.csr_write(CSR_MTVEC, 0x8000_0003);
    assert_eq!(cpu.csr_read(CSR_MTVEC), 0x8000_0001);

    // mstatus 只有 MIE/MPIE/MPP 可写
    cpu.csr_write(CSR_MSTATUS, 0xFFFF_FFFF);
    assert_eq!(cpu.csr_read(CSR_MSTATUS), 0x1888);
}

#[test]
fn test_simple_loop() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuCore::new(0);

    cpu.csr_write(CSR_MTVEC, 0x100);

    // 计算 1+2+3 = 6
    write_instr(&mut mem, 0, 0x00000093); // addi x1, x0, 0
    write_instr(&mut mem, 4, 0x00100113); // addi x2, x0, 1
    write_instr(&mut mem, 8, 0x00400193); // addi x3, x0, 4
    write_instr(&mut mem, 12, 0x002080B3); // add x1, x1, x2
    write_instr(&mut mem, 16, 0x00110113); // addi x2, x2, 1
    write_instr(&mut mem, 20, 0xFE314CE3); // blt x2, x3, -8
    write_instr(&mut mem, 24, 0x00000073); // ecall

    let mut executed = 0;
    while cpu.pc() != 0x100 && executed < 100 {
        cpu.step(&mut mem);
        executed += 1;
    }

    assert_eq!(cpu.read_reg(1), 6);
    assert_eq!(cpu.pc(), 0x100);
    assert_eq!(cpu.csr_read(CSR_MEPC), 24);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 11);
    assert!(executed < 100);
}

#[test]
fn test_hart_snapshot_restore() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_f_extension().build().unwrap();

    write_instr(&mut mem, 0, 0x02A00093); // addi x1, x0, 42
    cpu.step(&mut mem);
    cpu.write_fp_f32(2, 1.5);
    cpu.csr_write(CSR_MSCRATCH, 0xABCD);

    let snap = cpu.hart_snapshot();

    // 继续破坏状态
    write_instr(&mut mem, 4, 0x00000093); // addi x1, x0, 0
    cpu.step(&mut mem);
    cpu.write_fp_f32(2, 0.0);
    cpu.csr_write(CSR_MSCRATCH, 0);

    cpu.restore_hart(&snap);

    assert_eq!(cpu.read_reg(1), 42);
    assert_eq!(cpu.read_fp_f32(2), 1.5);
    assert_eq!(cpu.csr_read(CSR_MSCRATCH), 0xABCD);
    assert_eq!(cpu.pc(), snap.pc);
    assert_eq!(cpu.instret_count(), snap.instret_count);
}

#[test]
fn test_reset() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0x40).build().unwrap();

    write_instr(&mut mem, 0x40, 0x02A00093); // addi x1, x0, 42
    cpu.step(&mut mem);
    assert_eq!(cpu.read_reg(1), 42);

    cpu.reset();
    assert_eq!(cpu.pc(), 0x40);
    assert_eq!(cpu.read_reg(1), 0);
    assert_eq!(cpu.cycle_count(), 0);
    assert_eq!(cpu.instret_count(), 0);
    assert_eq!(cpu.state(), CpuState::Running);
}

#[test]
fn test_addi_chain_halt_on_ebreak() {
    // 基地址 0x80000000 的累加链，EBREAK 停机
    let mut mem = FlatMemory::new(4096, 0x8000_0000);
    let mut cpu = CpuBuilder::new(0x8000_0000).halt_on_ebreak(true).build().unwrap();

    write_instr(&mut mem, 0x8000_0000, 0x00100093); // addi x1, x0, 1
    write_instr(&mut mem, 0x8000_0004, 0x00208113); // addi x2, x1, 2
    write_instr(&mut mem, 0x8000_0008, 0x00310193); // addi x3, x2, 3
    write_instr(&mut mem, 0x8000_000C, 0x00100073); // ebreak

    let (_, state) = cpu.run(&mut mem, 100);

    assert_eq!(state, CpuState::Halted(HaltCause::Ebreak));
    assert_eq!(cpu.read_reg(1), 1);
    assert_eq!(cpu.read_reg(2), 3);
    assert_eq!(cpu.read_reg(3), 6);
    assert_eq!(cpu.instret_count(), 4);
    assert_eq!(cpu.pc(), 0x8000_000C);
}

#[test]
fn test_csrrw_mscratch_program() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_zicsr_extension().build().unwrap();

    cpu.csr_write(CSR_MSCRATCH, 0x12345678);
    cpu.write_reg(2, 0xDEADBEEF);

    // csrrw x1, mscratch, x2
    write_instr(&mut mem, 0, 0x340110F3);
    cpu.step(&mut mem);

    assert_eq!(cpu.read_reg(1), 0x12345678);
    assert_eq!(cpu.csr_read(CSR_MSCRATCH), 0xDEADBEEF);
}

#[test]
fn test_csr_access_rules() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_zicsr_extension().build().unwrap();

    cpu.csr_write(CSR_MTVEC, 0x100);

    // 未实现的 CSR 地址：非法指令
    // csrrs x1, 0x5C0, x0
    write_instr(&mut mem, 0, 0x5C0020F3);
    cpu.step(&mut mem);
    assert_eq!(cpu.pc(), 0x100);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 2);
    assert_eq!(cpu.instret_count(), 0);

    // 只读 CSR（cycle, 0xC00）的纯读取合法
    cpu.set_pc(0x200);
    write_instr(&mut mem, 0x200, 0xC00020F3); // csrrs x1, cycle, x0
    cpu.step(&mut mem);
    assert_eq!(cpu.pc(), 0x204);

    // 只读 CSR 的写入尝试：非法指令
    cpu.set_pc(0x300);
    write_instr(&mut mem, 0x300, 0xC00090F3); // csrrw x1, cycle, x1
    cpu.step(&mut mem);
    assert_eq!(cpu.pc(), 0x100);
    assert_eq!(cpu.csr_read(CSR_MCAUSE), 2);
}

#[test]
fn test_fflags_visible_after_fp_op() {
    // 浮点标志在退休前累积：紧随其后的 CSRR 能看到本条指令的标志
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_f_extension().build().unwrap();

    cpu.write_fp_f32(1, 1.0);
    cpu.write_fp_f32(2, 0.0);

    // fdiv.s f3, f1, f2 (DZ)
    write_instr(&mut mem, 0, 0x182081D3);
    // csrrs x1, fflags, x0
    write_instr(&mut mem, 4, 0x001020F3);

    cpu.run(&mut mem, 2);

    assert_eq!(cpu.read_reg(1) & 0x8, 0x8); // DZ
}

#[test]
fn test_fmadd_program() {
    let mut mem = FlatMemory::new(1024, 0);
    let mut cpu = CpuBuilder::new(0).with_f_extension().build().unwrap();

    cpu.write_fp_f32(0, 2.0);
    cpu.write_fp_f32(1, 3.0);
    cpu.write_fp_f32(2, 4.0);

    // fmadd.s f3, f0, f1, f2, rne
    write_instr(&mut mem, 0, 0x101001C3);
    cpu.step(&mut mem);

    assert_eq!(cpu.read_fp_f32(3), 10.0);
    assert_eq!(cpu.csr_read(CSR_FFLAGS), 0); // 精确结果
    assert_eq!(cpu.instret_count(), 1);
}

#[test]
fn test_misa_reflects_extensions() {
    let cpu = CpuBuilder::new(0)
        .with_m_extension()
        .with_f_extension()
        .with_c_extension()
        .build()
        .unwrap();

    let misa_val = cpu.csr_read(CSR_MISA);
    assert_ne!(misa_val & misa::EXT_I, 0);
    assert_ne!(misa_val & misa::EXT_M, 0);
    assert_ne!(misa_val & misa::EXT_F, 0);
    assert_ne!(misa_val & misa::EXT_C, 0);
    assert_eq!(misa_val >> 30, 1); // MXL = 32
}
