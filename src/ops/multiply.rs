//! Multiply and count-leading-zeros mnemonics (SPEC_FULL.md §4.5).

use crate::error::SimResult;
use crate::operand::{parse_register_token, split_top_level};
use crate::step::Simulator;

#[derive(Debug, Clone)]
pub enum MulInstr {
    Mul { dst: u8, a: u8, b: u8, set_flags: bool },
    Mla { dst: u8, a: u8, b: u8, addend: u8, set_flags: bool },
    /// Operands are pre-resolved register indices: writing the 64-bit
    /// product's two halves back to two distinct destinations needs no
    /// further decoding at execute time.
    Umull { dst_lo: u8, dst_hi: u8, a: u8, b: u8, set_flags: bool },
    Clz { dst: u8, src: u8 },
}

pub fn recognizes(name: &str) -> bool {
    matches!(
        name,
        "mul" | "muls" | "mla" | "mlas" | "umull" | "umulls" | "clz"
    )
}

pub fn try_decode(base: &str, args: &str) -> SimResult<Option<MulInstr>> {
    let tokens = split_top_level(args);
    Ok(Some(match base {
        "mul" | "muls" => {
            let dst = parse_register_token(&tokens[0])?;
            let a = parse_register_token(&tokens[1])?;
            let b = parse_register_token(&tokens[2])?;
            MulInstr::Mul { dst, a, b, set_flags: base.ends_with('s') }
        }
        "mla" | "mlas" => {
            let dst = parse_register_token(&tokens[0])?;
            let a = parse_register_token(&tokens[1])?;
            let b = parse_register_token(&tokens[2])?;
            let addend = parse_register_token(&tokens[3])?;
            MulInstr::Mla { dst, a, b, addend, set_flags: base.ends_with('s') }
        }
        "umull" | "umulls" => {
            let dst_lo = parse_register_token(&tokens[0])?;
            let dst_hi = parse_register_token(&tokens[1])?;
            let a = parse_register_token(&tokens[2])?;
            let b = parse_register_token(&tokens[3])?;
            MulInstr::Umull { dst_lo, dst_hi, a, b, set_flags: base.ends_with('s') }
        }
        "clz" => {
            let dst = parse_register_token(&tokens[0])?;
            let src = parse_register_token(&tokens[1])?;
            MulInstr::Clz { dst, src }
        }
        _ => return Ok(None),
    }))
}

pub fn execute(instr: &MulInstr, sim: &mut Simulator) -> SimResult<()> {
    match *instr {
        MulInstr::Mul { dst, a, b, set_flags } => {
            let result = sim.registers.get(a).wrapping_mul(sim.registers.get(b));
            if set_flags {
                sim.registers.flags.set_nz(result);
            }
            sim.write_dest(dst, result);
        }
        MulInstr::Mla { dst, a, b, addend, set_flags } => {
            let result = sim
                .registers
                .get(a)
                .wrapping_mul(sim.registers.get(b))
                .wrapping_add(sim.registers.get(addend));
            if set_flags {
                sim.registers.flags.set_nz(result);
            }
            sim.write_dest(dst, result);
        }
        MulInstr::Umull { dst_lo, dst_hi, a, b, set_flags } => {
            let product = sim.registers.get(a) as u64 * sim.registers.get(b) as u64;
            let lo = product as u32;
            let hi = (product >> 32) as u32;
            if set_flags {
                sim.registers.flags.n = (hi as i32) < 0;
                sim.registers.flags.z = product == 0;
            }
            sim.write_dest(dst_lo, lo);
            sim.write_dest(dst_hi, hi);
        }
        MulInstr::Clz { dst, src } => {
            // Matches `sim_arm_core.py`'s `op_clz`, which scans from bit 0
            // upward for the first set bit rather than counting from bit 31
            // down — despite the mnemonic, this is a trailing-zero count,
            // not a leading-zero count.
            let result = sim.registers.get(src).trailing_zeros();
            sim.write_dest(dst, result);
        }
    }
    Ok(())
}
