//! Data-processing operation factories (SPEC_FULL.md §4.5).

use crate::error::SimResult;
use crate::operand::{
    parse_register_token, parse_shifter_operand, split_top_level, Operand,
};
use crate::step::Simulator;

#[derive(Debug, Clone)]
pub enum DataOp {
    Mov { dst: u8, src: Operand, set_flags: bool },
    Mvn { dst: u8, src: Operand, set_flags: bool },
    And { dst: u8, a: u8, b: Operand, set_flags: bool },
    Orr { dst: u8, a: u8, b: Operand, set_flags: bool },
    Eor { dst: u8, a: u8, b: Operand, set_flags: bool },
    Bic { dst: u8, a: u8, b: Operand, set_flags: bool },
    Tst { a: u8, b: Operand },
    Teq { a: u8, b: Operand },
    Add { dst: u8, a: u8, b: Operand, set_flags: bool, with_carry: bool },
    /// `reverse` implements `rsb`/`rsbs` (`Operand2 - Rn` rather than `Rn - Operand2`).
    Sub { dst: u8, a: u8, b: Operand, set_flags: bool, with_carry: bool, reverse: bool },
    Cmp { a: u8, b: Operand },
    Cmn { a: u8, b: Operand },
    Neg { dst: u8, src: u8, set_flags: bool },
}

pub fn recognizes(name: &str) -> bool {
    matches!(
        name,
        "mov" | "movs" | "mvn" | "mvns" | "and" | "ands" | "orr" | "orrs" | "eor" | "eors"
            | "bic" | "bics" | "tst" | "teq" | "add" | "adds" | "adc" | "adcs" | "sub" | "subs"
            | "sbc" | "sbcs" | "rsb" | "rsbs" | "cmp" | "cmn" | "neg" | "negs"
    )
}

fn two_operand(args: &str) -> SimResult<(u8, Operand)> {
    let tokens = split_top_level(args);
    let dst = parse_register_token(&tokens[0])?;
    let (src, _) = parse_shifter_operand(&tokens, 1)?;
    Ok((dst, src))
}

fn three_operand(args: &str) -> SimResult<(u8, u8, Operand)> {
    let tokens = split_top_level(args);
    let dst = parse_register_token(&tokens[0])?;
    let a = parse_register_token(&tokens[1])?;
    let (b, _) = parse_shifter_operand(&tokens, 2)?;
    Ok((dst, a, b))
}

fn compare_operands(args: &str) -> SimResult<(u8, Operand)> {
    let tokens = split_top_level(args);
    let a = parse_register_token(&tokens[0])?;
    let (b, _) = parse_shifter_operand(&tokens, 1)?;
    Ok((a, b))
}

pub fn try_decode(base: &str, args: &str) -> SimResult<Option<DataOp>> {
    let s = base.ends_with('s');
    Ok(Some(match base {
        "mov" | "movs" => {
            let (dst, src) = two_operand(args)?;
            DataOp::Mov { dst, src, set_flags: s }
        }
        "mvn" | "mvns" => {
            let (dst, src) = two_operand(args)?;
            DataOp::Mvn { dst, src, set_flags: s }
        }
        "and" | "ands" => {
            let (dst, a, b) = three_operand(args)?;
            DataOp::And { dst, a, b, set_flags: s }
        }
        "orr" | "orrs" => {
            let (dst, a, b) = three_operand(args)?;
            DataOp::Orr { dst, a, b, set_flags: s }
        }
        "eor" | "eors" => {
            let (dst, a, b) = three_operand(args)?;
            DataOp::Eor { dst, a, b, set_flags: s }
        }
        "bic" | "bics" => {
            let (dst, a, b) = three_operand(args)?;
            DataOp::Bic { dst, a, b, set_flags: s }
        }
        "tst" => {
            let (a, b) = compare_operands(args)?;
            DataOp::Tst { a, b }
        }
        "teq" => {
            let (a, b) = compare_operands(args)?;
            DataOp::Teq { a, b }
        }
        "add" | "adds" => {
            let (dst, a, b) = three_operand(args)?;
            DataOp::Add { dst, a, b, set_flags: s, with_carry: false }
        }
        "adc" | "adcs" => {
            let (dst, a, b) = three_operand(args)?;
            DataOp::Add { dst, a, b, set_flags: s, with_carry: true }
        }
        "sub" | "subs" => {
            let (dst, a, b) = three_operand(args)?;
            DataOp::Sub { dst, a, b, set_flags: s, with_carry: false, reverse: false }
        }
        "sbc" | "sbcs" => {
            let (dst, a, b) = three_operand(args)?;
            DataOp::Sub { dst, a, b, set_flags: s, with_carry: true, reverse: false }
        }
        "rsb" | "rsbs" => {
            let (dst, a, b) = three_operand(args)?;
            DataOp::Sub { dst, a, b, set_flags: s, with_carry: false, reverse: true }
        }
        "cmp" => {
            let (a, b) = compare_operands(args)?;
            DataOp::Cmp { a, b }
        }
        "cmn" => {
            let (a, b) = compare_operands(args)?;
            DataOp::Cmn { a, b }
        }
        "neg" | "negs" => {
            let tokens = split_top_level(args);
            let dst = parse_register_token(&tokens[0])?;
            let src = parse_register_token(&tokens[1])?;
            DataOp::Neg { dst, src, set_flags: s }
        }
        _ => return Ok(None),
    }))
}

/// `r = a + b (+ carry_in if with_carry)`. Returns `(result, carry_out, overflow)`.
fn compute_add(a: u32, b: u32, with_carry: bool, carry_in: bool) -> (u32, bool, bool) {
    let extra = if with_carry { carry_in as u64 } else { 0 };
    let sum = a as u64 + b as u64 + extra;
    let result = sum as u32;
    let carry = sum > 0xFFFF_FFFF;
    let overflow = (!(a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    (result, carry, overflow)
}

/// `r = a - b (+ carry_in - 1 if with_carry)`. `carry_out` is `a >= b`
/// unsigned, deliberately ignoring `carry_in` even when `with_carry` is set:
/// this matches `sim_arm_core.py`'s `sbcs`, per the Open Question recorded
/// in DESIGN.md (some ARM references compute it differently).
fn compute_sub(a: u32, b: u32, with_carry: bool, carry_in: bool) -> (u32, bool, bool) {
    let result = if with_carry {
        a.wrapping_sub(b).wrapping_add(carry_in as u32).wrapping_sub(1)
    } else {
        a.wrapping_sub(b)
    };
    let carry = a >= b;
    let overflow = ((a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    (result, carry, overflow)
}

fn bitwise(sim: &mut Simulator, dst: u8, a: u8, b: &Operand, set_flags: bool, f: impl Fn(u32, u32) -> u32) {
    let av = sim.registers.get(a);
    let (bv, carry) = sim.eval_operand(b);
    let result = f(av, bv);
    if set_flags {
        sim.registers.flags.c = carry;
        sim.registers.flags.set_nz(result);
    }
    sim.write_dest(dst, result);
}

pub fn execute(op: &DataOp, sim: &mut Simulator) -> SimResult<()> {
    match op {
        DataOp::Mov { dst, src, set_flags } => {
            let (val, carry) = sim.eval_operand(src);
            if *set_flags {
                sim.registers.flags.c = carry;
                sim.registers.flags.set_nz(val);
            }
            sim.write_dest(*dst, val);
        }
        DataOp::Mvn { dst, src, set_flags } => {
            let (val, carry) = sim.eval_operand(src);
            let result = !val;
            if *set_flags {
                // Carry comes from the shifter, not the inverted result.
                sim.registers.flags.c = carry;
                sim.registers.flags.set_nz(result);
            }
            sim.write_dest(*dst, result);
        }
        DataOp::And { dst, a, b, set_flags } => bitwise(sim, *dst, *a, b, *set_flags, |x, y| x & y),
        DataOp::Orr { dst, a, b, set_flags } => bitwise(sim, *dst, *a, b, *set_flags, |x, y| x | y),
        DataOp::Eor { dst, a, b, set_flags } => bitwise(sim, *dst, *a, b, *set_flags, |x, y| x ^ y),
        DataOp::Bic { dst, a, b, set_flags } => bitwise(sim, *dst, *a, b, *set_flags, |x, y| x & !y),
        DataOp::Tst { a, b } => {
            let av = sim.registers.get(*a);
            let (bv, carry) = sim.eval_operand(b);
            sim.registers.flags.c = carry;
            sim.registers.flags.set_nz(av & bv);
        }
        DataOp::Teq { a, b } => {
            let av = sim.registers.get(*a);
            let (bv, carry) = sim.eval_operand(b);
            sim.registers.flags.c = carry;
            sim.registers.flags.set_nz(av ^ bv);
        }
        DataOp::Add { dst, a, b, set_flags, with_carry } => {
            let av = sim.registers.get(*a);
            let (bv, _) = sim.eval_operand(b);
            let (result, carry, overflow) = compute_add(av, bv, *with_carry, sim.registers.flags.c);
            if *set_flags {
                sim.registers.flags.set_nz(result);
                sim.registers.flags.c = carry;
                sim.registers.flags.v = overflow;
            }
            sim.write_dest(*dst, result);
        }
        DataOp::Sub { dst, a, b, set_flags, with_carry, reverse } => {
            let av = sim.registers.get(*a);
            let (bv, _) = sim.eval_operand(b);
            let (minuend, subtrahend) = if *reverse { (bv, av) } else { (av, bv) };
            let (result, carry, overflow) = compute_sub(minuend, subtrahend, *with_carry, sim.registers.flags.c);
            if *set_flags {
                sim.registers.flags.set_nz(result);
                sim.registers.flags.c = carry;
                sim.registers.flags.v = overflow;
            }
            sim.write_dest(*dst, result);
        }
        DataOp::Cmp { a, b } => {
            let av = sim.registers.get(*a);
            let (bv, _) = sim.eval_operand(b);
            let (result, carry, overflow) = compute_sub(av, bv, false, sim.registers.flags.c);
            sim.registers.flags.set_nz(result);
            sim.registers.flags.c = carry;
            sim.registers.flags.v = overflow;
        }
        DataOp::Cmn { a, b } => {
            let av = sim.registers.get(*a);
            let (bv, _) = sim.eval_operand(b);
            let (result, carry, overflow) = compute_add(av, bv, false, sim.registers.flags.c);
            sim.registers.flags.set_nz(result);
            sim.registers.flags.c = carry;
            sim.registers.flags.v = overflow;
        }
        DataOp::Neg { dst, src, set_flags } => {
            let v = sim.registers.get(*src);
            let (result, carry, overflow) = compute_sub(0, v, false, sim.registers.flags.c);
            if *set_flags {
                sim.registers.flags.set_nz(result);
                sim.registers.flags.c = carry;
                sim.registers.flags.v = overflow;
            }
            sim.write_dest(*dst, result);
        }
    }
    Ok(())
}
