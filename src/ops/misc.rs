//! Status-register mnemonics. The simulator does not model CPSR bits beyond
//! N/Z/C/V, so both are stubs (SPEC_FULL.md §4.5 "msr/mrs").

use crate::error::SimResult;
use crate::operand::{parse_register_token, split_top_level};
use crate::registers::STATUS_STUB;
use crate::step::Simulator;

#[derive(Debug, Clone)]
pub enum MiscInstr {
    /// Accepted for source compatibility; writes nowhere, since no banked
    /// status register beyond the four condition flags is modelled.
    Msr,
    Mrs { dst: u8 },
    /// `lambda: None` in `sim_arm_core.py`'s `op_nop` — does nothing.
    Nop,
}

pub fn recognizes(name: &str) -> bool {
    matches!(name, "msr" | "mrs" | "nop")
}

pub fn try_decode(base: &str, args: &str) -> SimResult<Option<MiscInstr>> {
    Ok(Some(match base {
        "msr" => MiscInstr::Msr,
        "mrs" => {
            let tokens = split_top_level(args);
            let dst = parse_register_token(&tokens[0])?;
            MiscInstr::Mrs { dst }
        }
        "nop" => MiscInstr::Nop,
        _ => return Ok(None),
    }))
}

pub fn execute(instr: &MiscInstr, sim: &mut Simulator) -> SimResult<()> {
    match *instr {
        MiscInstr::Msr => {}
        MiscInstr::Mrs { dst } => sim.write_dest(dst, STATUS_STUB),
        MiscInstr::Nop => {}
    }
    Ok(())
}
