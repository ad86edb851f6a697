//! Load/store mnemonics, `push`/`pop`, and the block-transfer (`ldm`/`stm`)
//! family (SPEC_FULL.md §4.4/§4.5). These are the only operation factories
//! that need the `Transport`, since they route through `MemoryProxy`.

use crate::error::SimResult;
use crate::operand::{
    parse_addr_operand, parse_reg_list, parse_register_token, split_top_level, strip_writeback,
    AddrOperand, AddrTiming, RegList,
};
use crate::registers::PC;
use crate::step::Simulator;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Ia,
    Ib,
    Da,
    Db,
}

#[derive(Debug, Clone)]
pub enum MemInstr {
    Ldr { dst: u8, addr: AddrOperand, writeback: bool },
    Ldrh { dst: u8, addr: AddrOperand, writeback: bool },
    Ldrsh { dst: u8, addr: AddrOperand, writeback: bool },
    Ldrb { dst: u8, addr: AddrOperand, writeback: bool },
    Str { src: u8, addr: AddrOperand, writeback: bool },
    Strh { src: u8, addr: AddrOperand, writeback: bool },
    Strb { src: u8, addr: AddrOperand, writeback: bool },
    Push { regs: RegList },
    Pop { regs: RegList },
    Ldm { base: u8, regs: RegList, mode: BlockMode, writeback: bool },
    Stm { base: u8, regs: RegList, mode: BlockMode, writeback: bool },
}

pub fn recognizes(name: &str) -> bool {
    if matches!(
        name,
        "ldr" | "ldrh" | "ldrsh" | "ldrb" | "str" | "strh" | "strb" | "push" | "pop"
    ) {
        return true;
    }
    if let Some(suffix) = name.strip_prefix("ldm") {
        return block_mode(true, suffix).is_some();
    }
    if let Some(suffix) = name.strip_prefix("stm") {
        return block_mode(false, suffix).is_some();
    }
    false
}

/// Maps the stack-oriented mnemonic suffix (`fd`/`fa`/`ed`/`ea`) or the
/// direct addressing-mode suffix (`ia`/`ib`/`da`/`db`) to a `BlockMode`.
/// The stack suffixes are direction-dependent: `ldm`'s `fd` means the same
/// physical order as `stm`'s `ea` (SPEC_FULL.md §4.4 "ldm/stm aliases").
fn block_mode(is_load: bool, suffix: &str) -> Option<BlockMode> {
    use BlockMode::*;
    Some(match suffix {
        "ia" => Ia,
        "ib" => Ib,
        "da" => Da,
        "db" => Db,
        "fd" => {
            if is_load {
                Ia
            } else {
                Db
            }
        }
        "ed" => {
            if is_load {
                Ib
            } else {
                Da
            }
        }
        "fa" => {
            if is_load {
                Da
            } else {
                Ib
            }
        }
        "ea" => {
            if is_load {
                Db
            } else {
                Ia
            }
        }
        _ => return None,
    })
}

fn parse_mem_operand(args: &str) -> SimResult<(u8, AddrOperand, bool)> {
    let tokens = split_top_level(args);
    let dst = parse_register_token(&tokens[0])?;
    let (bracket, explicit_wb) = strip_writeback(&tokens[1]);
    let mut rest = vec![tokens[0].clone(), bracket.to_string()];
    rest.extend(tokens[2..].iter().cloned());
    let (addr, _) = parse_addr_operand(&rest, 1)?;
    let writeback = explicit_wb || addr.timing == AddrTiming::Post;
    Ok((dst, addr, writeback))
}

fn parse_block_operand(args: &str) -> SimResult<(u8, RegList, bool)> {
    let tokens = split_top_level(args);
    let (base_tok, writeback) = strip_writeback(&tokens[0]);
    let base = parse_register_token(base_tok)?;
    let regs = parse_reg_list(&tokens[1])?;
    Ok((base, regs, writeback))
}

pub fn try_decode(base: &str, args: &str) -> SimResult<Option<MemInstr>> {
    if let Some(suffix) = base.strip_prefix("ldm") {
        if let Some(mode) = block_mode(true, suffix) {
            let (b, regs, writeback) = parse_block_operand(args)?;
            return Ok(Some(MemInstr::Ldm { base: b, regs, mode, writeback }));
        }
    }
    if let Some(suffix) = base.strip_prefix("stm") {
        if let Some(mode) = block_mode(false, suffix) {
            let (b, regs, writeback) = parse_block_operand(args)?;
            return Ok(Some(MemInstr::Stm { base: b, regs, mode, writeback }));
        }
    }
    Ok(Some(match base {
        "ldr" => {
            let (dst, addr, writeback) = parse_mem_operand(args)?;
            MemInstr::Ldr { dst, addr, writeback }
        }
        "ldrh" => {
            let (dst, addr, writeback) = parse_mem_operand(args)?;
            MemInstr::Ldrh { dst, addr, writeback }
        }
        "ldrsh" => {
            let (dst, addr, writeback) = parse_mem_operand(args)?;
            MemInstr::Ldrsh { dst, addr, writeback }
        }
        "ldrb" => {
            let (dst, addr, writeback) = parse_mem_operand(args)?;
            MemInstr::Ldrb { dst, addr, writeback }
        }
        "str" => {
            let (src, addr, writeback) = parse_mem_operand(args)?;
            MemInstr::Str { src, addr, writeback }
        }
        "strh" => {
            let (src, addr, writeback) = parse_mem_operand(args)?;
            MemInstr::Strh { src, addr, writeback }
        }
        "strb" => {
            let (src, addr, writeback) = parse_mem_operand(args)?;
            MemInstr::Strb { src, addr, writeback }
        }
        "push" => MemInstr::Push { regs: parse_reg_list(split_top_level(args)[0].as_str())? },
        "pop" => MemInstr::Pop { regs: parse_reg_list(split_top_level(args)[0].as_str())? },
        _ => return Ok(None),
    }))
}

/// Ascending-address-order addresses for each register in a block transfer,
/// plus the base register's writeback value (SPEC_FULL.md §4.4).
fn block_addresses(mode: BlockMode, base: u32, n: u32) -> (u32, u32) {
    let low = match mode {
        BlockMode::Ia => base,
        BlockMode::Ib => base.wrapping_add(4),
        BlockMode::Da => base.wrapping_sub(4 * n.saturating_sub(1)),
        BlockMode::Db => base.wrapping_sub(4 * n),
    };
    let new_base = match mode {
        BlockMode::Ia | BlockMode::Ib => base.wrapping_add(4 * n),
        BlockMode::Da | BlockMode::Db => base.wrapping_sub(4 * n),
    };
    (low, new_base)
}

fn do_ldm(
    base: u8,
    regs: &RegList,
    mode: BlockMode,
    writeback: bool,
    sim: &mut Simulator,
    transport: &mut dyn Transport,
) -> SimResult<()> {
    let mut sorted = regs.regs.clone();
    sorted.sort_unstable();
    let n = sorted.len() as u32;
    let (low, new_base) = block_addresses(mode, sim.registers.get(base), n);
    for (i, &r) in sorted.iter().enumerate() {
        let addr = low.wrapping_add(4 * i as u32);
        let value = sim.memory.load(addr, transport)?;
        sim.write_dest(r, value);
    }
    if writeback {
        sim.registers.set(base, new_base);
    }
    Ok(())
}

fn do_stm(
    base: u8,
    regs: &RegList,
    mode: BlockMode,
    writeback: bool,
    sim: &mut Simulator,
    transport: &mut dyn Transport,
) -> SimResult<()> {
    let mut sorted = regs.regs.clone();
    sorted.sort_unstable();
    let n = sorted.len() as u32;
    let (low, new_base) = block_addresses(mode, sim.registers.get(base), n);
    for (i, &r) in sorted.iter().enumerate() {
        let addr = low.wrapping_add(4 * i as u32);
        let value = sim.registers.get(r);
        sim.memory.store(addr, value, transport)?;
    }
    if writeback {
        sim.registers.set(base, new_base);
    }
    Ok(())
}

pub fn execute(instr: &MemInstr, sim: &mut Simulator, transport: &mut dyn Transport) -> SimResult<()> {
    match instr {
        MemInstr::Ldr { dst, addr, writeback } => {
            let ea = sim.eval_addr(addr);
            let value = sim.memory.load(ea, transport)?;
            if let Some(new_base) = sim.post_index_update(addr) {
                sim.registers.set(addr.base, new_base);
            } else if *writeback {
                sim.registers.set(addr.base, ea);
            }
            sim.write_dest(*dst, value);
        }
        MemInstr::Ldrh { dst, addr, writeback } => {
            let ea = sim.eval_addr(addr);
            let value = sim.memory.load_half(ea, transport)? as u32;
            apply_writeback(sim, addr, *writeback, ea);
            sim.write_dest(*dst, value);
        }
        MemInstr::Ldrsh { dst, addr, writeback } => {
            let ea = sim.eval_addr(addr);
            let value = sim.memory.load_half(ea, transport)? as i16 as i32 as u32;
            apply_writeback(sim, addr, *writeback, ea);
            sim.write_dest(*dst, value);
        }
        MemInstr::Ldrb { dst, addr, writeback } => {
            let ea = sim.eval_addr(addr);
            let value = sim.memory.load_byte(ea, transport)? as u32;
            apply_writeback(sim, addr, *writeback, ea);
            sim.write_dest(*dst, value);
        }
        MemInstr::Str { src, addr, writeback } => {
            let ea = sim.eval_addr(addr);
            let value = sim.registers.get(*src);
            sim.memory.store(ea, value, transport)?;
            apply_writeback(sim, addr, *writeback, ea);
        }
        MemInstr::Strh { src, addr, writeback } => {
            let ea = sim.eval_addr(addr);
            let value = sim.registers.get(*src) as u16;
            sim.memory.store_half(ea, value, transport)?;
            apply_writeback(sim, addr, *writeback, ea);
        }
        MemInstr::Strb { src, addr, writeback } => {
            let ea = sim.eval_addr(addr);
            let value = sim.registers.get(*src) as u8;
            sim.memory.store_byte(ea, value, transport)?;
            apply_writeback(sim, addr, *writeback, ea);
        }
        MemInstr::Push { regs } => {
            let mut sorted = regs.regs.clone();
            sorted.sort_unstable();
            let n = sorted.len() as u32;
            let new_sp = sim.registers.sp().wrapping_sub(4 * n);
            for (i, &r) in sorted.iter().enumerate() {
                let addr = new_sp.wrapping_add(4 * i as u32);
                let value = sim.registers.get(r);
                sim.memory.store(addr, value, transport)?;
            }
            sim.registers.set_sp(new_sp);
        }
        MemInstr::Pop { regs } => {
            let mut sorted = regs.regs.clone();
            sorted.sort_unstable();
            let n = sorted.len() as u32;
            let base = sim.registers.sp();
            for (i, &r) in sorted.iter().enumerate() {
                let addr = base.wrapping_add(4 * i as u32);
                let value = sim.memory.load(addr, transport)?;
                sim.write_dest(r, value);
            }
            sim.registers.set_sp(base.wrapping_add(4 * n));
        }
        MemInstr::Ldm { base, regs, mode, writeback } => do_ldm(*base, regs, *mode, *writeback, sim, transport)?,
        MemInstr::Stm { base, regs, mode, writeback } => do_stm(*base, regs, *mode, *writeback, sim, transport)?,
    }
    Ok(())
}

fn apply_writeback(sim: &mut Simulator, addr: &AddrOperand, writeback: bool, ea: u32) {
    if let Some(new_base) = sim.post_index_update(addr) {
        sim.registers.set(addr.base, new_base);
    } else if writeback {
        sim.registers.set(addr.base, ea);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fakes::FakeTransport;

    #[test]
    fn str_then_ldr_round_trip_through_shadow() {
        let mut sim = Simulator::new();
        let mut t = FakeTransport::new();
        sim.memory.local_ram(0x2000000, 0x2000FFF);
        sim.registers.set(0, 0xCAFEBABE);
        sim.registers.set(1, 0x2000000);
        let addr = AddrOperand { base: 1, offset: None, negative: false, timing: AddrTiming::Pre };
        execute(&MemInstr::Str { src: 0, addr: addr.clone(), writeback: false }, &mut sim, &mut t).unwrap();
        execute(&MemInstr::Ldr { dst: 2, addr, writeback: false }, &mut sim, &mut t).unwrap();
        assert_eq!(sim.registers.get(2), 0xCAFEBABE);
    }

    #[test]
    fn push_then_pop_round_trips_pc_through_branch_sink() {
        let mut sim = Simulator::new();
        let mut t = FakeTransport::new();
        sim.memory.local_ram(0, 0xFFFF);
        sim.registers.set_sp(0x2000);
        sim.registers.set(4, 0x1234);
        sim.registers.set_pc(0x8001); // return address, thumb bit set
        execute(&MemInstr::Push { regs: RegList { regs: vec![4, crate::registers::LR] } }, &mut sim, &mut t).unwrap();
        sim.registers.set(crate::registers::LR, 0x8001);
        execute(&MemInstr::Pop { regs: RegList { regs: vec![4, PC] } }, &mut sim, &mut t).unwrap();
        assert_eq!(sim.registers.get(4), 0x1234);
    }

    #[test]
    fn stmia_writeback_advances_base_by_register_count() {
        let mut sim = Simulator::new();
        let mut t = FakeTransport::new();
        sim.memory.local_ram(0x2000000, 0x2000FFF);
        sim.registers.set(0, 0x2000000);
        sim.registers.set(1, 0xAAAA);
        sim.registers.set(2, 0xBBBB);
        sim.registers.set(3, 0xCCCC);
        let regs = RegList { regs: vec![1, 2, 3] };
        do_stm(0, &regs, BlockMode::Ia, true, &mut sim, &mut t).unwrap();
        assert_eq!(sim.registers.get(0), 0x200000C);
        assert_eq!(sim.memory.load(0x2000000, &mut t).unwrap(), 0xAAAA);
        assert_eq!(sim.memory.load(0x2000008, &mut t).unwrap(), 0xCCCC);
    }

    #[test]
    fn ldm_fd_matches_stm_ea_physical_order() {
        // SPEC_FULL.md §4.4: ldmfd and stmea name the same physical layout.
        assert_eq!(block_mode(true, "fd"), block_mode(false, "ea"));
        assert_eq!(block_mode(true, "ed"), block_mode(false, "fa"));
    }

    #[test]
    fn post_indexed_store_writes_back_unconditionally() {
        let mut sim = Simulator::new();
        let mut t = FakeTransport::new();
        sim.memory.local_ram(0x2000000, 0x2000FFF);
        sim.registers.set(0, 5);
        sim.registers.set(1, 0x2000000);
        let addr = AddrOperand {
            base: 1,
            offset: Some(crate::operand::Operand::Imm(4)),
            negative: false,
            timing: AddrTiming::Post,
        };
        execute(&MemInstr::Str { src: 0, addr, writeback: false }, &mut sim, &mut t).unwrap();
        assert_eq!(sim.registers.get(1), 0x2000004);
    }
}
