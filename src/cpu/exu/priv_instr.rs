//! 特权指令执行单元
//!
//! 实现 MRET、WFI 的执行逻辑（M-mode only 模型）

use super::super::csr_def::{CSR_MEPC, CSR_MSTATUS};
use super::super::trap::{mstatus, PrivilegeMode, TrapCause};
use super::super::{CpuCore, CpuState};
use crate::isa::RvInstr;

/// 执行特权指令。返回 true 如果处理了该指令。
pub fn execute(cpu: &mut CpuCore, instr: RvInstr, current_pc: u32) -> bool {
    match instr {
        RvInstr::Mret => {
            // U-mode 执行 MRET 是非法指令
            if cpu.privilege() != PrivilegeMode::Machine {
                let raw = cpu.curr_instr();
                cpu.take_trap_at(TrapCause::IllegalInstruction, raw, current_pc);
                return true;
            }
            execute_mret(cpu);
            true
        }
        RvInstr::Wfi => {
            cpu.set_state(CpuState::WaitForInterrupt);
            true
        }
        _ => false,
    }
}

/// 执行 MRET 指令：从 M-mode trap handler 返回
///
/// 执行流程：
/// 1. 将 mstatus.MPIE 恢复到 mstatus.MIE
/// 2. 将特权级设置为 mstatus.MPP
/// 3. 将 mstatus.MPP 设置为 U
/// 4. 将 mstatus.MPIE 设置为 1
/// 5. PC = mepc
fn execute_mret(cpu: &mut CpuCore) {
    let mstatus_val = cpu.csr_read(CSR_MSTATUS);

    let mpie = mstatus::read_mpie(mstatus_val);
    let mpp = mstatus::read_mpp(mstatus_val);

    let mut new_mstatus = mstatus_val;

    // MIE = MPIE
    if mpie {
        new_mstatus |= mstatus::MIE_MASK;
    } else {
        new_mstatus &= !mstatus::MIE_MASK;
    }

    // MPP = U
    new_mstatus = mstatus::write_mpp(new_mstatus, 0);

    // MPIE = 1
    new_mstatus |= mstatus::MPIE_MASK;

    cpu.csr_write(CSR_MSTATUS, new_mstatus);

    cpu.set_privilege(PrivilegeMode::from_bits(mpp));

    // PC = mepc
    let mepc = cpu.csr_read(CSR_MEPC);
    cpu.set_pc(mepc);
}
