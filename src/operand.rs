//! Parses the disassembler's operand strings into tagged operand values.
//!
//! Per the REDESIGN FLAG in SPEC_FULL.md §9, parsed operands are encoded as
//! a small tagged enum rather than a closure that closes over the original
//! text; operation factories consume these values directly.

use crate::error::SimError;
use crate::registers::reg_index;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Lsl,
    Lsr,
    Asr,
    Rol,
    Ror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftAmount {
    Imm(u32),
    Reg(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Imm(u32),
    Reg(u8),
    ShiftedReg(u8, ShiftOp, ShiftAmount),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrTiming {
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrOperand {
    pub base: u8,
    pub offset: Option<Operand>,
    pub negative: bool,
    pub timing: AddrTiming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegList {
    pub regs: Vec<u8>,
}

fn parse_error(args: &str, reason: &'static str) -> SimError {
    SimError::OperandParse {
        args: args.to_string(),
        reason,
    }
}

/// Splits an operand string on top-level commas, treating `[...]` and
/// `{...}` groups as atomic so addressing modes and register lists (which
/// contain commas of their own) survive intact.
pub fn split_top_level(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in args.chars() {
        match c {
            '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                out.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

pub fn parse_register_token(tok: &str) -> Result<u8, SimError> {
    reg_index(tok.trim()).ok_or_else(|| parse_error(tok, "not a register name"))
}

/// Strips a trailing `!` (writeback marker), returning whether it was present.
pub fn strip_writeback(tok: &str) -> (&str, bool) {
    match tok.trim().strip_suffix('!') {
        Some(rest) => (rest, true),
        None => (tok.trim(), false),
    }
}

/// Parses `#literal`, accepting `0x`-prefixed hex and decimal, with an
/// optional leading `-` for a negative decimal or hex literal.
pub fn parse_immediate(tok: &str) -> Result<u32, SimError> {
    let tok = tok.trim();
    let body = tok.strip_prefix('#').unwrap_or(tok);
    let (negative, body) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| parse_error(tok, "invalid hex immediate"))?
    } else {
        body.parse::<u32>()
            .map_err(|_| parse_error(tok, "invalid decimal immediate"))?
    };
    Ok(if negative {
        (magnitude as i64).wrapping_neg() as u32
    } else {
        magnitude
    })
}

pub fn parse_shift_op(tok: &str) -> Option<ShiftOp> {
    match tok.to_ascii_lowercase().as_str() {
        "lsl" => Some(ShiftOp::Lsl),
        "lsr" => Some(ShiftOp::Lsr),
        "asr" => Some(ShiftOp::Asr),
        "rol" => Some(ShiftOp::Rol),
        "ror" => Some(ShiftOp::Ror),
        _ => None,
    }
}

fn parse_shift_amount(tok: &str) -> Result<ShiftAmount, SimError> {
    if tok.trim_start().starts_with('#') {
        Ok(ShiftAmount::Imm(parse_immediate(tok)?))
    } else {
        Ok(ShiftAmount::Reg(parse_register_token(tok)?))
    }
}

/// Parses the trailing `<op> <operand>` shift field of a shifted-register
/// operand. A field whose first word is not a recognised shift mnemonic is
/// the "bare second token" case from SPEC_FULL.md §4.4/§9: the whole field
/// is the amount operand and the implied operation is ROR.
fn parse_shift_field(field: &str) -> Result<(ShiftOp, ShiftAmount), SimError> {
    let field = field.trim();
    let mut parts = field.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    match parse_shift_op(first) {
        Some(op) => {
            let rest = parts
                .next()
                .ok_or_else(|| parse_error(field, "missing shift amount"))?;
            Ok((op, parse_shift_amount(rest)?))
        }
        None => Ok((ShiftOp::Ror, parse_shift_amount(field)?)),
    }
}

/// Parses a shifter operand spanning one or two top-level fields starting at
/// `tokens[idx]`: a register or immediate, optionally followed by a shift
/// field. Returns the operand and the index just past what was consumed.
pub fn parse_shifter_operand(
    tokens: &[String],
    idx: usize,
) -> Result<(Operand, usize), SimError> {
    let first = tokens
        .get(idx)
        .ok_or_else(|| parse_error("", "missing operand"))?;
    if first.trim_start().starts_with('#') {
        return Ok((Operand::Imm(parse_immediate(first)?), idx + 1));
    }
    let reg = parse_register_token(first)?;
    if let Some(shift_field) = tokens.get(idx + 1) {
        // Only consume the next field as a shift if it isn't itself an
        // addressing-mode or register-list token belonging to something else.
        if !shift_field.starts_with('[') && !shift_field.starts_with('{') {
            if let Ok((op, amount)) = parse_shift_field(shift_field) {
                return Ok((Operand::ShiftedReg(reg, op, amount), idx + 2));
            }
        }
    }
    Ok((Operand::Reg(reg), idx + 1))
}

fn parse_plain_offset(tok: &str) -> Result<Operand, SimError> {
    let tok = tok.trim();
    if tok.starts_with('#') {
        Ok(Operand::Imm(parse_immediate(tok)?))
    } else {
        Ok(Operand::Reg(parse_register_token(tok)?))
    }
}

fn parse_signed_offset(tok: &str) -> Result<(bool, Operand), SimError> {
    let tok = tok.trim();
    match tok.strip_prefix('-') {
        Some(rest) => Ok((true, parse_plain_offset(rest)?)),
        None => Ok((false, parse_plain_offset(tok)?)),
    }
}

/// Parses `[Rn]`, `[Rn, offset]` (pre-indexed), or `[Rn], offset`
/// (post-indexed) starting at `tokens[idx]`. Returns the parsed operand and
/// the index just past what was consumed.
pub fn parse_addr_operand(
    tokens: &[String],
    idx: usize,
) -> Result<(AddrOperand, usize), SimError> {
    let bracket = tokens
        .get(idx)
        .ok_or_else(|| parse_error("", "missing address operand"))?;
    let inner = bracket
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| parse_error(bracket, "expected [Rn] addressing form"))?;
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    let base = parse_register_token(parts[0])?;

    if parts.len() > 1 {
        let (negative, offset) = parse_signed_offset(parts[1])?;
        return Ok((
            AddrOperand {
                base,
                offset: Some(offset),
                negative,
                timing: AddrTiming::Pre,
            },
            idx + 1,
        ));
    }

    if let Some(next) = tokens.get(idx + 1) {
        if !next.starts_with('[') && !next.starts_with('{') {
            let (negative, offset) = parse_signed_offset(next)?;
            return Ok((
                AddrOperand {
                    base,
                    offset: Some(offset),
                    negative,
                    timing: AddrTiming::Post,
                },
                idx + 2,
            ));
        }
    }

    Ok((
        AddrOperand {
            base,
            offset: None,
            negative: false,
            timing: AddrTiming::Pre,
        },
        idx + 1,
    ))
}

/// Parses `{r0, r1, ...}`, expanding `rX-rY` ranges in canonical order.
pub fn parse_reg_list(tok: &str) -> Result<RegList, SimError> {
    let inner = tok
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| parse_error(tok, "expected {reg list}"))?;
    let mut regs = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo = parse_register_token(lo.trim())?;
            let hi = parse_register_token(hi.trim())?;
            for n in lo..=hi {
                regs.push(n);
            }
        } else {
            regs.push(parse_register_token(part)?);
        }
    }
    Ok(RegList { regs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_fields() {
        assert_eq!(split_top_level("r0, r1, r2"), vec!["r0", "r1", "r2"]);
    }

    #[test]
    fn keeps_bracket_groups_atomic() {
        assert_eq!(
            split_top_level("r0, [r1, #4]"),
            vec!["r0", "[r1, #4]"]
        );
    }

    #[test]
    fn post_indexed_is_two_top_level_fields() {
        assert_eq!(split_top_level("r0, [r1], #4"), vec!["r0", "[r1]", "#4"]);
    }

    #[test]
    fn immediates_hex_decimal_negative() {
        assert_eq!(parse_immediate("#0x10").unwrap(), 16);
        assert_eq!(parse_immediate("#10").unwrap(), 10);
        assert_eq!(parse_immediate("#-1").unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn shifted_register_explicit_shift() {
        let tokens = split_top_level("r0, lsl #2");
        let (op, next) = parse_shifter_operand(&tokens, 0).unwrap();
        assert_eq!(next, 2);
        match op {
            Operand::ShiftedReg(r, ShiftOp::Lsl, ShiftAmount::Imm(2)) => assert_eq!(r, 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bare_second_token_implies_ror() {
        let tokens = split_top_level("r0, r3");
        let (op, next) = parse_shifter_operand(&tokens, 0).unwrap();
        assert_eq!(next, 2);
        match op {
            Operand::ShiftedReg(r0, ShiftOp::Ror, ShiftAmount::Reg(r3)) => {
                assert_eq!(r0, 0);
                assert_eq!(r3, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn explicit_ror_and_bare_ror_agree_on_amount() {
        let explicit = split_top_level("r0, ror #4");
        let (op_explicit, _) = parse_shifter_operand(&explicit, 0).unwrap();
        let bare = split_top_level("r0, #4");
        let (op_bare, _) = parse_shifter_operand(&bare, 0).unwrap();
        assert_eq!(op_explicit, Operand::ShiftedReg(0, ShiftOp::Ror, ShiftAmount::Imm(4)));
        match op_bare {
            Operand::Imm(4) => {}
            other => panic!("bare immediate must not acquire an implicit shift: {other:?}"),
        }
    }

    #[test]
    fn addr_pre_indexed() {
        let tokens = split_top_level("r0, [r1, #4]");
        let (addr, next) = parse_addr_operand(&tokens, 1).unwrap();
        assert_eq!(next, 2);
        assert_eq!(addr.base, 1);
        assert_eq!(addr.timing, AddrTiming::Pre);
        assert_eq!(addr.offset, Some(Operand::Imm(4)));
    }

    #[test]
    fn addr_post_indexed() {
        let tokens = split_top_level("r0, [r1], #4");
        let (addr, next) = parse_addr_operand(&tokens, 1).unwrap();
        assert_eq!(next, 3);
        assert_eq!(addr.timing, AddrTiming::Post);
        assert_eq!(addr.offset, Some(Operand::Imm(4)));
    }

    #[test]
    fn addr_negative_register_offset() {
        let tokens = split_top_level("r0, [r1, -r2]");
        let (addr, _) = parse_addr_operand(&tokens, 1).unwrap();
        assert!(addr.negative);
        assert_eq!(addr.offset, Some(Operand::Reg(2)));
    }

    #[test]
    fn reg_list_with_range() {
        let list = parse_reg_list("{r1-r3, lr}").unwrap();
        assert_eq!(list.regs, vec![1, 2, 3, 14]);
    }

    #[test]
    fn writeback_marker_stripped() {
        assert_eq!(strip_writeback("r0!"), ("r0", true));
        assert_eq!(strip_writeback("r0"), ("r0", false));
    }
}
