//! Standalone shift/rotate mnemonics (`lsl`, `lsr`, `asr`, `rol`, `ror`,
//! `rrx`), distinct from the shifter-operand field embedded in a
//! data-processing operand (SPEC_FULL.md §4.1/§4.5).

use crate::error::SimResult;
use crate::operand::{parse_register_token, split_top_level, ShiftAmount};
use crate::shift;
use crate::step::Simulator;

#[derive(Debug, Clone, Copy)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Rol,
    Ror,
    Rrx,
}

#[derive(Debug, Clone)]
pub struct ShiftInstr {
    pub kind: ShiftKind,
    pub dst: u8,
    pub src: u8,
    /// `None` for `rrx`, which always shifts by one bit through carry.
    pub amount: Option<ShiftAmount>,
    pub set_flags: bool,
}

pub fn recognizes(name: &str) -> bool {
    matches!(
        name,
        "lsl" | "lsls" | "lsr" | "lsrs" | "asr" | "asrs" | "rol" | "rols" | "ror" | "rors" | "rrx" | "rrxs"
    )
}

fn parse_amount(tok: &str) -> SimResult<ShiftAmount> {
    if tok.trim_start().starts_with('#') {
        Ok(ShiftAmount::Imm(crate::operand::parse_immediate(tok)?))
    } else {
        Ok(ShiftAmount::Reg(parse_register_token(tok)?))
    }
}

pub fn try_decode(base: &str, args: &str) -> SimResult<Option<ShiftInstr>> {
    let kind = match base {
        "lsl" | "lsls" => ShiftKind::Lsl,
        "lsr" | "lsrs" => ShiftKind::Lsr,
        "asr" | "asrs" => ShiftKind::Asr,
        "rol" | "rols" => ShiftKind::Rol,
        "ror" | "rors" => ShiftKind::Ror,
        "rrx" | "rrxs" => ShiftKind::Rrx,
        _ => return Ok(None),
    };
    let set_flags = base.ends_with('s');
    let tokens = split_top_level(args);
    let dst = parse_register_token(&tokens[0])?;
    let src = parse_register_token(&tokens[1])?;
    let amount = match kind {
        ShiftKind::Rrx => None,
        _ => Some(parse_amount(&tokens[2])?),
    };
    Ok(Some(ShiftInstr { kind, dst, src, amount, set_flags }))
}

pub fn execute(instr: &ShiftInstr, sim: &mut Simulator) -> SimResult<()> {
    let value = sim.registers.get(instr.src);
    let amt = match instr.amount {
        Some(ShiftAmount::Imm(n)) => n,
        Some(ShiftAmount::Reg(r)) => sim.registers.get(r) & 0xFF,
        None => 0,
    };
    let (result, carry) = match instr.kind {
        ShiftKind::Lsl => shift::lsl(value, amt),
        ShiftKind::Lsr => shift::lsr(value, amt),
        ShiftKind::Asr => shift::asr(value, amt),
        ShiftKind::Rol => shift::rol(value, amt),
        ShiftKind::Ror => shift::ror(value, amt),
        ShiftKind::Rrx => shift::rrx(value, 1, sim.registers.flags.c),
    };
    if instr.set_flags {
        sim.registers.flags.c = carry;
        sim.registers.flags.set_nz(result);
    }
    sim.write_dest(instr.dst, result);
    Ok(())
}
