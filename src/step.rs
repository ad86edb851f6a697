//! The step driver (SPEC_FULL.md §4.7) and the `Simulator` that owns
//! register state, the memory proxy, and the branch sink.

use crate::condition::Condition;
use crate::error::{SimError, SimResult};
use crate::memory::MemoryProxy;
use crate::operand::{AddrOperand, AddrTiming, Operand, ShiftAmount, ShiftOp};
use crate::ops::{self, DecodedInstr};
use crate::registers::{Registers, PC};
use crate::shift;
use crate::transport::{Disassembler, Transport};

/// Owns everything needed to run one instruction at a time: the register
/// file, the memory proxy, and the scratch branch-target field every
/// operation factory writes into instead of touching PC directly
/// (SPEC_FULL.md §4.5 "Branch sink").
pub struct Simulator {
    pub registers: Registers,
    pub memory: MemoryProxy,
    branch: Option<u32>,
    /// `next_address | thumb_bit` of the instruction currently executing.
    /// Distinct from `registers.pc()` during execution, which holds the
    /// architectural (pipeline-offset) PC; `bl`/`blx` need the real link
    /// address, not the pipelined one (SPEC_FULL.md §4.5 "Control flow").
    link_return: u32,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Simulator {
            registers: Registers::new(),
            memory: MemoryProxy::new(),
            branch: None,
            link_return: 0,
        }
    }

    pub fn reset(&mut self, vector: u32) {
        self.registers.reset(vector);
        self.branch = None;
    }

    /// The link-register value `bl`/`blx` should save: `next_address |
    /// thumb_bit` of the instruction currently executing.
    pub fn link_return(&self) -> u32 {
        self.link_return
    }

    #[cfg(test)]
    pub fn set_link_return_for_test(&mut self, value: u32) {
        self.link_return = value;
    }

    /// Sets the scratch branch target consulted by the step driver after
    /// the current opfunc returns. Writing to PC (directly, or via `pop`,
    /// `ldm`, `bx`, ...) always goes through this, never `Registers::set`.
    pub fn set_branch(&mut self, target: u32) {
        self.branch = Some(target & !1);
    }

    /// Writes `value` to a general destination register, except that a
    /// write to PC is redirected into the branch sink and toggles `thumb`
    /// from the value's low bit (SPEC_FULL.md §4.5).
    pub fn write_dest(&mut self, dst: u8, value: u32) {
        if dst == PC {
            self.registers.thumb = value & 1 != 0;
            self.set_branch(value);
        } else {
            self.registers.set(dst, value);
        }
    }

    /// Evaluates an operand against current register/flag state, returning
    /// its value and the shifter carry-out. An unshifted `Imm`/`Reg`
    /// operand carries `0`, not the current carry flag (`sim_arm_core.py`'s
    /// `_shifter` returns `lambda: (a(), 0)` for the no-shift case).
    pub fn eval_operand(&self, op: &Operand) -> (u32, bool) {
        match *op {
            Operand::Imm(v) => (v, false),
            Operand::Reg(r) => (self.registers.get(r), false),
            Operand::ShiftedReg(r, shift_op, amount) => {
                let value = self.registers.get(r);
                let amt = match amount {
                    ShiftAmount::Imm(n) => n,
                    ShiftAmount::Reg(rr) => self.registers.get(rr) & 0xFF,
                };
                match shift_op {
                    ShiftOp::Lsl => shift::lsl(value, amt),
                    ShiftOp::Lsr => shift::lsr(value, amt),
                    ShiftOp::Asr => shift::asr(value, amt),
                    ShiftOp::Rol => shift::rol(value, amt),
                    ShiftOp::Ror => shift::ror(value, amt),
                }
            }
        }
    }

    /// Computes the effective address of an addressing-mode operand. For a
    /// post-indexed form, the *unmodified* base is returned; the caller is
    /// responsible for writeback (SPEC_FULL.md §4.4).
    pub fn eval_addr(&self, addr: &AddrOperand) -> u32 {
        let base = self.registers.get(addr.base);
        match addr.timing {
            AddrTiming::Post => base,
            AddrTiming::Pre => match &addr.offset {
                None => base,
                Some(op) => {
                    let (value, _) = self.eval_operand(op);
                    if addr.negative {
                        base.wrapping_sub(value)
                    } else {
                        base.wrapping_add(value)
                    }
                }
            },
        }
    }

    /// Computes the base-register update for a post-indexed addressing
    /// operand (always applied, unlike pre-indexed `!` writeback which is
    /// opt-in).
    pub fn post_index_update(&self, addr: &AddrOperand) -> Option<u32> {
        match (addr.timing, &addr.offset) {
            (AddrTiming::Post, Some(op)) => {
                let base = self.registers.get(addr.base);
                let (value, _) = self.eval_operand(op);
                Some(if addr.negative {
                    base.wrapping_sub(value)
                } else {
                    base.wrapping_add(value)
                })
            }
            _ => None,
        }
    }

    /// Architectural PC as seen by an executing opfunc (SPEC_FULL.md §3):
    /// Thumb uses `(next_address + 3) & !3`; ARM uses `address + 8`.
    fn architectural_pc(thumb: bool, address: u32, next_address: u32) -> u32 {
        if thumb {
            (next_address + 3) & !3
        } else {
            address + 8
        }
    }

    /// One iteration of the step loop (SPEC_FULL.md §4.7). `repeat` counts
    /// how many instructions to execute; returns early if `breakpoint` is
    /// reached. `hle_r0` is written back from `r0` after HLE fires per-step.
    pub fn step(
        &mut self,
        mut repeat: u32,
        breakpoint: Option<u32>,
        transport: &mut dyn Transport,
        disasm: &mut dyn Disassembler,
    ) -> SimResult<()> {
        while repeat > 0 {
            self.registers.step_count += 1;
            let pc = self.registers.pc();
            let thumb = self.registers.thumb;

            let hook_addr = pc & !1;
            let mut hook = self.memory.take_hook(hook_addr);

            let record = self.memory.fetch(pc, thumb, transport, disasm)?;
            self.link_return = record.next_address | thumb as u32;
            self.registers
                .set_pc(Self::architectural_pc(thumb, record.address, record.next_address));
            self.branch = None;

            let (decoded, cond) = match self.memory.cached_opfunc(record.address, thumb) {
                Some(pair) => pair,
                None => {
                    let (_, cond, decoded) = ops::decode(&record.op, &record.args)?;
                    self.memory
                        .install_opfunc(record.address, thumb, decoded.clone(), cond);
                    (decoded, cond)
                }
            };

            let exec_result = if cond.test(self.registers.flags) {
                ops::execute(&decoded, self, transport)
            } else {
                Ok(())
            };

            match exec_result {
                Ok(()) => {
                    self.registers.set_pc(self.branch.take().unwrap_or(record.next_address));
                }
                Err(e) => {
                    self.registers.set_pc(record.address);
                    if let Some(h) = hook {
                        self.memory.restore_hook(hook_addr, h);
                    }
                    return Err(e);
                }
            }

            if let Some(name) = self.memory.hle_tag(record.address, thumb) {
                let r0 = self.registers.get(0);
                let result = self.memory.hle_invoke(&name, r0, transport)?;
                self.registers.set(0, result);
            }

            if let Some(h) = &mut hook {
                h(self)?;
            }
            if let Some(h) = hook {
                self.memory.restore_hook(hook_addr, h);
            }

            if let Some(bp) = breakpoint {
                if self.registers.pc() == bp {
                    return Ok(());
                }
            }

            repeat -= 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fakes::{FakeDisassembler, FakeTransport};
    use crate::transport::InstructionRecord;

    fn single_instr_disasm(op: &str, args: &str, size: u8) -> FakeDisassembler {
        let mut d = FakeDisassembler::new();
        d.install(InstructionRecord {
            address: 0x1000,
            next_address: 0x1000 + size as u32,
            op: op.to_string(),
            args: args.to_string(),
            size_bytes: size,
        });
        d
    }

    #[test]
    fn conditional_skip_honours_predicate() {
        let mut sim = Simulator::new();
        sim.reset(0x1000);
        let mut t = FakeTransport::new();
        let mut d = single_instr_disasm("moveq", "r0, #42", 4);

        sim.registers.flags.z = false;
        sim.step(1, None, &mut t, &mut d).unwrap();
        assert_eq!(sim.registers.get(0), 0);

        sim.reset(0x1000);
        sim.registers.flags.z = true;
        sim.step(1, None, &mut t, &mut d).unwrap();
        assert_eq!(sim.registers.get(0), 42);
    }

    #[test]
    fn bl_through_step_saves_next_address_not_pipelined_pc() {
        let mut sim = Simulator::new();
        sim.reset(0x1000);
        let mut t = FakeTransport::new();
        let mut d = single_instr_disasm("bl", "#0x3000", 4);
        sim.step(1, None, &mut t, &mut d).unwrap();
        // Architectural PC during ARM execution would have been 0x1008
        // (address + 8); the link register must hold next_address (0x1004)
        // instead, per SPEC_FULL.md §4.5.
        assert_eq!(sim.registers.get(crate::registers::LR), 0x1004);
        assert_eq!(sim.registers.pc(), 0x3000);
    }

    #[test]
    fn flag_arithmetic_overflow() {
        let mut sim = Simulator::new();
        sim.reset(0x1000);
        sim.registers.set(0, 0x7FFF_FFFF);
        sim.registers.set(1, 1);
        let mut t = FakeTransport::new();
        let mut d = single_instr_disasm("adds", "r2, r0, r1", 4);
        sim.step(1, None, &mut t, &mut d).unwrap();
        assert_eq!(sim.registers.get(2), 0x8000_0000);
        assert!(sim.registers.flags.n);
        assert!(!sim.registers.flags.z);
        assert!(!sim.registers.flags.c);
        assert!(sim.registers.flags.v);
    }
}
