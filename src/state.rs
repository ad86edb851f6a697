//! State snapshot save/load (SPEC_FULL.md §6). A snapshot is three parts:
//! a `<base>.core` JSON document (register file, flags, step count) via
//! `serde`/`serde_json`, and `<base>.addr`/`<base>.data` binary streams
//! covering the shadow memory's populated pages (page-sparse, per §9,
//! rather than one dense 4 GiB blob).
//!
//! Persisting the three parts under their `<base>.*` names is the caller's
//! job (this crate does no filesystem I/O); `save_state`/`load_state`
//! produce and consume the three byte buffers directly.

use crate::error::{SimError, SimResult};
use crate::step::Simulator;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct CoreDocument {
    thumb: bool,
    #[serde(rename = "cpsrN")]
    cpsr_n: bool,
    #[serde(rename = "cpsrZ")]
    cpsr_z: bool,
    #[serde(rename = "cpsrC")]
    cpsr_c: bool,
    #[serde(rename = "cpsrV")]
    cpsr_v: bool,
    step_count: u64,
    regs: [u32; 16],
}

/// The three serialised parts of a snapshot, named after the `<base>.*`
/// streams in SPEC_FULL.md §6. Writing them to `<base>.addr`/`.data`/`.core`
/// under a common base name is left to the caller.
pub struct Snapshot {
    pub addr: Vec<u8>,
    pub data: Vec<u8>,
    pub core: String,
}

pub fn save_state(sim: &Simulator) -> Snapshot {
    let doc = CoreDocument {
        thumb: sim.registers.thumb,
        cpsr_n: sim.registers.flags.n,
        cpsr_z: sim.registers.flags.z,
        cpsr_c: sim.registers.flags.c,
        cpsr_v: sim.registers.flags.v,
        step_count: sim.registers.step_count,
        regs: std::array::from_fn(|i| sim.registers.get(i as u8)),
    };
    // `to_string` on a hand-built struct of primitive fields cannot fail.
    let core = serde_json::to_string(&doc).expect("CoreDocument always serialises");

    let mut addr = Vec::new();
    let mut data = Vec::new();
    for (page_index, present_bits, page_data) in sim.memory.save_pages() {
        addr.extend_from_slice(&page_index.to_le_bytes());
        addr.extend_from_slice(&(present_bits.len() as u32).to_le_bytes());
        addr.extend_from_slice(&present_bits);

        data.extend_from_slice(&page_index.to_le_bytes());
        data.extend_from_slice(&(page_data.len() as u32).to_le_bytes());
        data.extend_from_slice(&page_data);
    }

    Snapshot { addr, data, core }
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> SimResult<u32> {
    let slice = bytes
        .get(*cursor..*cursor + 4)
        .ok_or(SimError::StateFormat { reason: "truncated stream" })?;
    *cursor += 4;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_chunk<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> SimResult<&'a [u8]> {
    let slice = bytes
        .get(*cursor..*cursor + len)
        .ok_or(SimError::StateFormat { reason: "truncated stream" })?;
    *cursor += len;
    Ok(slice)
}

pub fn load_state(sim: &mut Simulator, snapshot: &Snapshot) -> SimResult<()> {
    let doc: CoreDocument = serde_json::from_str(&snapshot.core)
        .map_err(|_| SimError::StateFormat { reason: "malformed .core JSON document" })?;

    let mut addr_cursor = 0usize;
    let mut data_cursor = 0usize;
    let mut pages = Vec::new();
    while addr_cursor < snapshot.addr.len() {
        let page_index = read_u32(&snapshot.addr, &mut addr_cursor)?;
        let present_len = read_u32(&snapshot.addr, &mut addr_cursor)? as usize;
        let present_bits = read_chunk(&snapshot.addr, &mut addr_cursor, present_len)?.to_vec();

        let data_page_index = read_u32(&snapshot.data, &mut data_cursor)?;
        let data_len = read_u32(&snapshot.data, &mut data_cursor)? as usize;
        let page_data = read_chunk(&snapshot.data, &mut data_cursor, data_len)?.to_vec();
        if data_page_index != page_index {
            return Err(SimError::StateFormat { reason: ".addr/.data page streams are out of sync" });
        }
        pages.push((page_index, present_bits, page_data));
    }
    sim.memory.load_pages(pages);

    sim.registers.thumb = doc.thumb;
    sim.registers.flags.n = doc.cpsr_n;
    sim.registers.flags.z = doc.cpsr_z;
    sim.registers.flags.c = doc.cpsr_c;
    sim.registers.flags.v = doc.cpsr_v;
    sim.registers.step_count = doc.step_count;
    for (i, &value) in doc.regs.iter().enumerate() {
        sim.registers.set(i as u8, value);
    }
    Ok(())
}
