//! Operation factories (SPEC_FULL.md §4.5) and the condition-code decorator
//! (§4.6), restructured per the REDESIGN FLAGS in §9: instead of a
//! string-keyed map of closures with 15 materialised conditional variants
//! per mnemonic, `decode` resolves a mnemonic once into a tagged
//! `DecodedInstr` plus a single `Condition`, and `execute` is one flat
//! dispatch over that tag.

pub mod branch;
pub mod data_processing;
pub mod loadstore;
pub mod misc;
pub mod multiply;
pub mod shifts;

use crate::condition::{split_condition, strip_near, Condition};
use crate::error::{SimError, SimResult};
use crate::step::Simulator;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub enum DecodedInstr {
    Data(data_processing::DataOp),
    Shift(shifts::ShiftInstr),
    Mul(multiply::MulInstr),
    Branch(branch::BranchInstr),
    Mem(loadstore::MemInstr),
    Misc(misc::MiscInstr),
}

fn is_base_mnemonic(name: &str) -> bool {
    data_processing::recognizes(name)
        || shifts::recognizes(name)
        || multiply::recognizes(name)
        || branch::recognizes(name)
        || loadstore::recognizes(name)
        || misc::recognizes(name)
}

fn decode_base(base: &str, args: &str) -> SimResult<DecodedInstr> {
    if let Some(d) = data_processing::try_decode(base, args)? {
        return Ok(DecodedInstr::Data(d));
    }
    if let Some(d) = shifts::try_decode(base, args)? {
        return Ok(DecodedInstr::Shift(d));
    }
    if let Some(d) = multiply::try_decode(base, args)? {
        return Ok(DecodedInstr::Mul(d));
    }
    if let Some(d) = branch::try_decode(base, args)? {
        return Ok(DecodedInstr::Branch(d));
    }
    if let Some(d) = loadstore::try_decode(base, args)? {
        return Ok(DecodedInstr::Mem(d));
    }
    if let Some(d) = misc::try_decode(base, args)? {
        return Ok(DecodedInstr::Misc(d));
    }
    Err(SimError::UnknownMnemonic { op: base.to_string() })
}

/// Splits the raw mnemonic text into base mnemonic + condition, then
/// decodes the base mnemonic's operands. Returns the base mnemonic (for
/// diagnostics), its condition, and the decoded instruction.
pub fn decode(raw_mnemonic: &str, args: &str) -> SimResult<(String, Condition, DecodedInstr)> {
    let (stripped, _near) = strip_near(raw_mnemonic);
    let (base, cond) = split_condition(stripped, is_base_mnemonic);
    let decoded = decode_base(&base, args)?;
    Ok((base, cond, decoded))
}

pub fn execute(
    instr: &DecodedInstr,
    sim: &mut Simulator,
    transport: &mut dyn Transport,
) -> SimResult<()> {
    match instr {
        DecodedInstr::Data(d) => data_processing::execute(d, sim),
        DecodedInstr::Shift(s) => shifts::execute(s, sim),
        DecodedInstr::Mul(m) => multiply::execute(m, sim),
        DecodedInstr::Branch(b) => branch::execute(b, sim),
        DecodedInstr::Mem(m) => loadstore::execute(m, sim, transport),
        DecodedInstr::Misc(m) => misc::execute(m, sim),
    }
}
