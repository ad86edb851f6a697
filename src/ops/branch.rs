//! Branch mnemonics (SPEC_FULL.md §4.5). All destination writes go through
//! `Simulator::write_dest`/`set_branch`, never `Registers::set_pc` directly.

use crate::error::SimResult;
use crate::operand::{parse_immediate, parse_register_token, split_top_level};
use crate::registers::LR;
use crate::step::Simulator;

/// `bx`/`blx` take either a register or a literal target. A literal target
/// toggles `thumb` unconditionally on branch (it is not itself tagged with
/// the ISA-mode low bit the way a register operand's value is) — this
/// matches `sim_arm_core.py`'s observed behaviour and is the resolution to
/// the Open Question recorded in DESIGN.md.
#[derive(Debug, Clone, Copy)]
pub enum BxTarget {
    Reg(u8),
    Imm(u32),
}

#[derive(Debug, Clone)]
pub enum BranchInstr {
    B { target: u32 },
    Bl { target: u32 },
    Bx { target: BxTarget },
    Blx { target: BxTarget },
}

pub fn recognizes(name: &str) -> bool {
    matches!(name, "b" | "bl" | "bx" | "blx")
}

fn parse_target(tok: &str) -> SimResult<BxTarget> {
    if tok.trim_start().starts_with('#') {
        Ok(BxTarget::Imm(parse_immediate(tok)?))
    } else {
        Ok(BxTarget::Reg(parse_register_token(tok)?))
    }
}

pub fn try_decode(base: &str, args: &str) -> SimResult<Option<BranchInstr>> {
    let tokens = split_top_level(args);
    Ok(Some(match base {
        "b" => BranchInstr::B { target: parse_immediate(&tokens[0])? },
        "bl" => BranchInstr::Bl { target: parse_immediate(&tokens[0])? },
        "bx" => BranchInstr::Bx { target: parse_target(&tokens[0])? },
        "blx" => BranchInstr::Blx { target: parse_target(&tokens[0])? },
        _ => return Ok(None),
    }))
}

pub fn execute(instr: &BranchInstr, sim: &mut Simulator) -> SimResult<()> {
    match *instr {
        BranchInstr::B { target } => sim.set_branch(target),
        BranchInstr::Bl { target } => {
            sim.registers.set(LR, sim.link_return());
            sim.set_branch(target);
        }
        BranchInstr::Bx { target } => branch_exchange(sim, target),
        BranchInstr::Blx { target } => {
            sim.registers.set(LR, sim.link_return());
            branch_exchange(sim, target);
        }
    }
    Ok(())
}

fn branch_exchange(sim: &mut Simulator, target: BxTarget) {
    match target {
        BxTarget::Reg(r) => {
            let value = sim.registers.get(r);
            sim.write_dest(crate::registers::PC, value);
        }
        BxTarget::Imm(addr) => {
            sim.registers.thumb = !sim.registers.thumb;
            sim.set_branch(addr);
        }
    }
}
