//! ARM assembly-level instruction interpreter.
//!
//! This crate is the execution engine of a remote firmware debugger. It
//! does not decode machine code itself; it consumes pre-disassembled
//! instruction records (mnemonic, argument string, address, size) from a
//! [`Disassembler`] and simulates their effect on a small register/flag
//! machine, proxying every memory access through a [`MemoryProxy`] to a
//! [`Transport`] representing the remote target device.
//!
//! # Architecture
//!
//! - [`Simulator`]: owns the register file and the scratch branch sink;
//!   drives the step loop (`Simulator::step`).
//! - [`MemoryProxy`]: shadow RAM/flash cache, write-combining run encoder,
//!   instruction cache, skip/patch/hook tables, HLE handler registry.
//! - [`ops`]: per-mnemonic decode/execute factories, dispatched through a
//!   single tagged [`ops::DecodedInstr`] rather than per-mnemonic closures.
//! - [`Transport`]/[`Disassembler`]: the two external ports this crate is
//!   driven against; both out of scope to implement here (see SPEC_FULL.md
//!   §1), so only trait definitions and test doubles live in this crate.
//! - [`state`]: register/flag/shadow-memory snapshot save and restore.

pub mod condition;
pub mod error;
pub mod memory;
pub mod operand;
pub mod ops;
pub mod registers;
pub mod rle;
#[cfg(test)]
mod scenarios;
pub mod shift;
pub mod state;
pub mod step;
pub mod transport;

pub use error::{SimError, SimResult};
pub use memory::MemoryProxy;
pub use step::Simulator;
pub use transport::{Disassembler, InstructionRecord, Transport};
