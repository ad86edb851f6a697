//! External ports (SPEC_FULL.md §6). Both the remote device transport and
//! the disassembler/assembler toolchain are out of scope (§1); they are
//! modelled here purely as traits so the simulator can be driven against a
//! real backend or a deterministic test double without caring which.

use crate::error::TransportError;
use std::collections::HashMap;

/// A decoded instruction as produced by the external disassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionRecord {
    pub address: u32,
    pub next_address: u32,
    pub op: String,
    pub args: String,
    pub size_bytes: u8,
}

/// The remote device link. `peek`/`poke` operate on aligned words;
/// `fill_words`/`fill_bytes` are the bulk-store primitives the run encoder
/// targets once it has coalesced a run (SPEC_FULL.md §4.2).
pub trait Transport {
    fn peek(&mut self, addr: u32) -> Result<u32, TransportError>;
    fn poke(&mut self, addr: u32, value: u32) -> Result<(), TransportError>;
    fn peek_byte(&mut self, addr: u32) -> Result<u8, TransportError>;
    fn poke_byte(&mut self, addr: u32, value: u8) -> Result<(), TransportError>;
    fn fill_words(&mut self, addr: u32, pattern: u32, count: u32) -> Result<(), TransportError>;
    fn fill_bytes(&mut self, addr: u32, pattern: u8, count: u32) -> Result<(), TransportError>;
    fn block_read(&mut self, addr: u32, length: u32) -> Result<Vec<u8>, TransportError>;
    /// Invokes compiled HLE code at `entry` with `r0` as its argument,
    /// returning the handler's `r0` result.
    fn blx(&mut self, entry: u32, r0: u32) -> Result<u32, TransportError>;
}

/// The disassembler/assembler toolchain. `disassemble` reads `size` bytes
/// from the device at `addr` and returns the raw bytes; `disassembly_lines`
/// decodes a byte buffer already in hand into instruction records.
pub trait Disassembler {
    fn disassemble(
        &mut self,
        transport: &mut dyn Transport,
        addr: u32,
        size: u32,
        thumb: bool,
    ) -> Result<Vec<u8>, TransportError>;

    fn disassembly_lines(&self, bytes: &[u8], addr: u32, thumb: bool) -> Vec<InstructionRecord>;

    fn disassemble_string(&self, bytes: &[u8], address: u32, thumb: bool) -> String;

    fn assemble_string(&self, address: u32, source: &str, thumb: bool) -> Result<Vec<u8>, String>;

    /// Compiles HLE handler bodies and returns their entry addresses.
    fn compile_library(
        &mut self,
        transport: &mut dyn Transport,
        code_address: u32,
        bodies: &HashMap<String, String>,
    ) -> Result<HashMap<String, u32>, String>;
}
