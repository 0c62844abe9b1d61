//! rvcosim CLI 入口
//!
//! 加载 RISC-V ELF 并运行到停机条件，可选运行时反汇编 trace 与
//! riscv-tests 的 HTIF 协议。

use std::process::ExitCode;

use clap::Parser;

use rvcosim::sim_env::{ExitReason, SimConfig, SimEnv, TestResult};

#[derive(Parser, Debug)]
#[command(name = "rvcosim", about = "Cycle-accounted RV32IMFC+Zicsr instruction set simulator")]
struct Args {
    /// RISC-V ELF32 程序
    elf: String,

    /// ISA 字符串（如 rv32i, rv32imfc）
    #[arg(long, default_value = "rv32imfc")]
    isa: String,

    /// 内存窗口基地址
    #[arg(long, value_parser = parse_u32, default_value = "0x80000000")]
    mem_base: u32,

    /// 内存窗口大小（字节）
    #[arg(long, default_value_t = 1024 * 1024)]
    mem_size: usize,

    /// 最大执行指令数（0 = 无限制）
    #[arg(long, default_value_t = 0)]
    max_instructions: u64,

    /// EBREAK 停机
    #[arg(long)]
    halt_on_ebreak: bool,

    /// ECALL 停机
    #[arg(long)]
    exit_on_ecall: bool,

    /// 到达该地址时停机
    #[arg(long, value_parser = parse_u32)]
    exit_address: Option<u32>,

    /// 运行时反汇编 trace（写到 stderr）
    #[arg(long)]
    trace: bool,

    /// 反汇编使用 ABI 寄存器名
    #[arg(long)]
    abi_names: bool,

    /// 按 riscv-tests HTIF 协议运行并报告 PASS/FAIL
    #[arg(long)]
    isa_test: bool,

    /// 结束后打印寄存器状态
    #[arg(long)]
    dump_regs: bool,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let result = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    result.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    let config = match SimConfig::new()
        .with_elf_path(&args.elf)
        .with_memory("ram", args.mem_base, args.mem_size)
        .with_max_instructions(args.max_instructions)
        .with_halt_on_ebreak(args.halt_on_ebreak)
        .with_exit_on_ecall(args.exit_on_ecall)
        .with_disassemble_runtime(args.trace)
        .with_abi_names(args.abi_names)
        .with_isa(&args.isa)
    {
        Ok(mut config) => {
            config.exit_address = args.exit_address;
            config
        }
        Err(err) => {
            eprintln!("rvcosim: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut env = match SimEnv::from_config(config) {
        Ok(env) => env,
        Err(err) => {
            eprintln!("rvcosim: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if args.trace {
        env.set_trace_stream(Box::new(std::io::stderr()));
    }

    let code = if args.isa_test {
        let (result, executed) = env.run_isa_test(args.max_instructions);
        println!("instructions: {}", executed);
        match result {
            TestResult::Pass => {
                println!("PASS");
                ExitCode::SUCCESS
            }
            TestResult::Fail(n) => {
                println!("FAIL (test #{})", n);
                ExitCode::FAILURE
            }
            TestResult::Timeout => {
                println!("TIMEOUT");
                ExitCode::FAILURE
            }
        }
    } else {
        let (reason, executed) = env.run_until_halt();
        println!("instructions: {}", executed);
        println!("cycles:       {}", env.cpu.cycle_count());
        println!("exit reason:  {:?}", reason);
        println!("final pc:     0x{:08x}", env.cpu.pc());
        match reason {
            ExitReason::Breakpoint | ExitReason::EnvCall | ExitReason::ExitAddress => {
                ExitCode::SUCCESS
            }
            _ => ExitCode::FAILURE,
        }
    };

    if args.dump_regs {
        env.dump();
    }

    code
}
