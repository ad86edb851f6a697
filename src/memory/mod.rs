//! The memory proxy (SPEC_FULL.md §4.3): owns the shadow RAM/flash cache,
//! the instruction cache, the skip/patch/hook tables, the RLE encoder, and
//! the HLE handler registry, translating simulator-level loads/stores/
//! fetches into (possibly batched) remote device calls.

pub mod log;
pub mod shadow;

use crate::condition::Condition;
use crate::error::{SimError, SimResult};
use crate::ops::DecodedInstr;
use crate::rle::{Run, RunEncoder};
use crate::step::Simulator;
use crate::transport::{Disassembler, InstructionRecord, Transport};
use log::{LogFormat, MemoryLogSink};
use shadow::ShadowMemory;
use std::collections::{HashMap, HashSet};

/// Below this address, reads are treated as flash and may trigger a
/// prefetch (SPEC_FULL.md §4.3, §6).
pub const FLASH_BOUNDARY: u32 = 0x0020_0000;
/// Addresses at or above this are a simulator-bug-grade sanity failure.
pub const ADDRESS_SANITY_CEILING: u32 = 0x0500_0000;
/// Minimum locally-available window before a flash read is satisfied
/// without a device round trip.
pub const FLASH_PREFETCH_MIN_WINDOW: u32 = 8;
/// Size of one flash prefetch round trip.
pub const FLASH_PREFETCH_CHUNK: u32 = 256;

pub struct CachedInstruction {
    pub record: InstructionRecord,
    pub opfunc: Option<(DecodedInstr, Condition)>,
    pub hle: Option<String>,
}

/// A hook callback. Hooks may re-enter `Simulator::step`, so they take the
/// whole simulator rather than just the memory proxy or register file.
pub type HookFn = Box<dyn FnMut(&mut Simulator) -> SimResult<()>>;

#[derive(Default)]
pub struct MemoryProxy {
    shadow: ShadowMemory,
    rle: RunEncoder,
    cache: HashMap<u32, CachedInstruction>,
    skip: HashMap<u32, String>,
    patch_note: HashMap<u32, String>,
    patch_hle: HashMap<u32, String>,
    hle_handlers: HashMap<String, String>,
    hle_entries: HashMap<String, u32>,
    hooks: HashMap<u32, HookFn>,
    hook_addrs: HashSet<u32>,
    log_sink: Option<Box<dyn MemoryLogSink>>,
    log_format: LogFormat,
}

fn check_address(a: u32) -> SimResult<()> {
    if a >= ADDRESS_SANITY_CEILING {
        ::log::error!("address {a:#010x} exceeds sanity ceiling {ADDRESS_SANITY_CEILING:#010x}");
        Err(SimError::AddressOutOfRange { address: a })
    } else {
        Ok(())
    }
}

impl MemoryProxy {
    pub fn new() -> Self {
        MemoryProxy::default()
    }

    pub fn set_log_sink(&mut self, sink: Box<dyn MemoryLogSink>) {
        self.log_sink = Some(sink);
    }

    /// Selects which of the two SPEC_FULL.md §6 line formats subsequent
    /// store/fill traffic renders as. Defaults to `Human`.
    pub fn set_log_format(&mut self, format: LogFormat) {
        self.log_format = format;
    }

    fn emit(&mut self, line: String) {
        if let Some(sink) = &mut self.log_sink {
            sink.line(&line);
        }
    }

    fn all_present(&self, addr: u32, len: u32) -> bool {
        (0..len).all(|i| self.shadow.is_present(addr.wrapping_add(i)))
    }

    fn read_shadow(&self, addr: u32, len: u32) -> Vec<u8> {
        (0..len).map(|i| self.shadow.read_byte(addr.wrapping_add(i)).unwrap_or(0)).collect()
    }

    fn write_shadow(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.shadow.write_byte(addr.wrapping_add(i as u32), b);
        }
    }

    /// Flash prefetch is the *only* device read that persists into the
    /// shadow: a non-flash (MMIO/RAM) address is read straight off the
    /// device and handed back uncached, so a later `load` re-reads the
    /// device and a later `store` is not suppressed by `is_present`
    /// (SPEC_FULL.md §3, §8 property 4; matches `sim_arm_core.py`'s `load`,
    /// which only ever caches through `flash_prefetch_hint`/`fetch_local_data`,
    /// never through the direct `device.peek` fallback).
    fn fill_from_device(
        &mut self,
        addr: u32,
        len: u32,
        transport: &mut dyn Transport,
    ) -> SimResult<Option<Vec<u8>>> {
        if addr < FLASH_BOUNDARY
            && self.shadow.contiguous_present(addr, FLASH_PREFETCH_MIN_WINDOW)
                < FLASH_PREFETCH_MIN_WINDOW
        {
            let bytes = transport.block_read(addr, FLASH_PREFETCH_CHUNK)?;
            self.write_shadow(addr, &bytes);
            ::log::debug!("flash prefetch at {addr:#010x}");
            self.emit(log::human_prefetch(addr));
            Ok(None)
        } else {
            let bytes = transport.block_read(addr, len)?;
            Ok(Some(bytes))
        }
    }

    fn load_n(&mut self, addr: u32, len: u32, transport: &mut dyn Transport) -> SimResult<Vec<u8>> {
        check_address(addr)?;
        if !self.all_present(addr, len) {
            self.flush(transport)?;
            if let Some(bytes) = self.fill_from_device(addr, len, transport)? {
                return Ok(bytes);
            }
        }
        Ok(self.read_shadow(addr, len))
    }

    pub fn load(&mut self, addr: u32, transport: &mut dyn Transport) -> SimResult<u32> {
        let bytes = self.load_n(addr, 4, transport)?;
        let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        self.emit(log::human_load(4, addr, value));
        Ok(value)
    }

    pub fn load_half(&mut self, addr: u32, transport: &mut dyn Transport) -> SimResult<u16> {
        let bytes = self.load_n(addr, 2, transport)?;
        let value = u16::from_le_bytes([bytes[0], bytes[1]]);
        self.emit(log::human_load(2, addr, value as u32));
        Ok(value)
    }

    pub fn load_byte(&mut self, addr: u32, transport: &mut dyn Transport) -> SimResult<u8> {
        let bytes = self.load_n(addr, 1, transport)?;
        let value = bytes[0];
        self.emit(log::human_load(1, addr, value as u32));
        Ok(value)
    }

    fn store_n(
        &mut self,
        addr: u32,
        bytes: &[u8],
        size: u8,
        pattern: u32,
        transport: &mut dyn Transport,
    ) -> SimResult<()> {
        check_address(addr)?;
        if self.shadow.is_present(addr) {
            self.write_shadow(addr, bytes);
            return Ok(());
        }
        if let Some(reason) = self.skip.get(&addr).cloned() {
            self.emit(format!("arm-mem-SKIP  [{addr:#010x}] {reason}"));
            return Ok(());
        }
        let run = self.rle.write(addr, pattern, size);
        self.dispatch_run(run, transport)
    }

    pub fn store(&mut self, addr: u32, value: u32, transport: &mut dyn Transport) -> SimResult<()> {
        self.store_n(addr, &value.to_le_bytes(), 4, value, transport)
    }

    pub fn store_half(
        &mut self,
        addr: u32,
        value: u16,
        transport: &mut dyn Transport,
    ) -> SimResult<()> {
        self.store_n(addr, &value.to_le_bytes(), 2, value as u32, transport)
    }

    pub fn store_byte(
        &mut self,
        addr: u32,
        value: u8,
        transport: &mut dyn Transport,
    ) -> SimResult<()> {
        self.store_n(addr, &[value], 1, value as u32, transport)
    }

    fn dispatch_run(&mut self, run: Run, transport: &mut dyn Transport) -> SimResult<()> {
        match (run.count, run.size) {
            (0, _) => return Ok(()),
            (1, 1) => transport.poke_byte(run.address, run.pattern as u8)?,
            (1, 4) => transport.poke(run.address, run.pattern)?,
            (1, 2) => {
                transport.poke_byte(run.address, run.pattern as u8)?;
                transport.poke_byte(run.address + 1, (run.pattern >> 8) as u8)?;
            }
            (n, 4) => transport.fill_words(run.address, run.pattern, n)?,
            (n, 1) => transport.fill_bytes(run.address, run.pattern as u8, n)?,
            (n, 2) => {
                for i in 0..n {
                    let a = run.address + i * 2;
                    transport.poke_byte(a, run.pattern as u8)?;
                    transport.poke_byte(a + 1, (run.pattern >> 8) as u8)?;
                }
            }
            _ => {}
        }
        self.emit_run_line(run);
        Ok(())
    }

    /// Renders a dispatched run into whichever of the two SPEC_FULL.md §6
    /// line formats is selected. `Replayable` emits one `%wr`/`%wrb` line
    /// per element of a fill, since the replay format has no bulk-fill verb
    /// of its own (half-words decompose into two byte lines either way).
    fn emit_run_line(&mut self, run: Run) {
        if run.count == 0 || self.log_sink.is_none() {
            return;
        }
        match self.log_format {
            LogFormat::Human => {
                if run.count == 1 {
                    self.emit(log::human_store(run.size, run.address, run.pattern, ""));
                } else {
                    self.emit(log::human_fill(run.size, run.address, run.pattern, run.count));
                }
            }
            LogFormat::Replayable => {
                for n in 0..run.count {
                    let addr = run.address.wrapping_add(n * run.size as u32);
                    match run.size {
                        4 => self.emit(log::replayable_word(addr, run.pattern)),
                        2 => {
                            self.emit(log::replayable_byte(addr, run.pattern as u8));
                            self.emit(log::replayable_byte(addr + 1, (run.pattern >> 8) as u8));
                        }
                        _ => self.emit(log::replayable_byte(addr, run.pattern as u8)),
                    }
                }
            }
        }
    }

    /// Forces any in-progress run to the transport. Called before every
    /// load, fetch, direct device primitive, HLE invocation, and state
    /// snapshot (SPEC_FULL.md §3, §5).
    pub fn flush(&mut self, transport: &mut dyn Transport) -> SimResult<()> {
        let run = self.rle.flush();
        self.dispatch_run(run, transport)
    }

    /// Marks `[start, end]` as locally resolved, suppressing all further
    /// transport traffic for that range.
    pub fn local_ram(&mut self, start: u32, end: u32) {
        self.shadow.mark_range_present(start, end);
    }

    pub fn skip(&mut self, addr: u32, reason: impl Into<String>) {
        self.skip.insert(addr, reason.into());
    }

    pub fn hook(&mut self, addr: u32, f: HookFn) {
        let key = addr & !1;
        self.hook_addrs.insert(key);
        self.hooks.insert(key, f);
    }

    pub fn has_hook(&self, addr: u32) -> bool {
        self.hook_addrs.contains(&(addr & !1))
    }

    /// Temporarily removes the hook for `addr` so the step driver can
    /// invoke it with `&mut Simulator` without the hook table (owned by
    /// this proxy, owned in turn by the simulator) being borrowed twice.
    pub fn take_hook(&mut self, addr: u32) -> Option<HookFn> {
        self.hooks.remove(&(addr & !1))
    }

    pub fn restore_hook(&mut self, addr: u32, f: HookFn) {
        self.hooks.insert(addr & !1, f);
    }

    /// Installs a patch note and invalidates any cached instruction at
    /// `addr` in both ISA modes (SPEC_FULL.md §9 "Instruction cache
    /// invalidation").
    pub fn patch(&mut self, addr: u32, note: impl Into<String>, hle: Option<String>) {
        let key = addr & !1;
        self.patch_note.insert(key, note.into());
        if let Some(name) = hle {
            self.patch_hle.insert(key, name.clone());
            self.patch_hle.insert(key | 1, name);
        }
        self.cache.remove(&key);
        self.cache.remove(&(key | 1));
    }

    fn cache_key(addr: u32, thumb: bool) -> u32 {
        (addr & !1) | thumb as u32
    }

    /// Resolves the instruction at `(addr, thumb)`, consulting the cache
    /// first and falling back to the disassembler on a miss.
    pub fn fetch(
        &mut self,
        addr: u32,
        thumb: bool,
        transport: &mut dyn Transport,
        disasm: &mut dyn Disassembler,
    ) -> SimResult<InstructionRecord> {
        let key = Self::cache_key(addr, thumb);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.record.clone());
        }
        self.flush(transport)?;
        let size = if addr < FLASH_BOUNDARY { FLASH_PREFETCH_CHUNK } else { FLASH_PREFETCH_MIN_WINDOW };
        if addr < FLASH_BOUNDARY
            && self.shadow.contiguous_present(addr, FLASH_PREFETCH_MIN_WINDOW)
                < FLASH_PREFETCH_MIN_WINDOW
        {
            self.fill_from_device(addr, size, transport)?;
        }
        let bytes = disasm.disassemble(transport, addr, size, thumb)?;
        let lines = disasm.disassembly_lines(&bytes, addr, thumb);
        let mut found = None;
        for record in lines {
            let rec_key = Self::cache_key(record.address, thumb);
            let hle = self.patch_hle.get(&rec_key).cloned();
            if rec_key == key {
                found = Some(record.clone());
            }
            self.cache.insert(
                rec_key,
                CachedInstruction { record, opfunc: None, hle },
            );
        }
        found.ok_or(SimError::OperandParse {
            args: String::new(),
            reason: "disassembler produced no instruction at the requested address",
        })
    }

    pub fn cached_opfunc(&self, addr: u32, thumb: bool) -> Option<(DecodedInstr, Condition)> {
        self.cache.get(&Self::cache_key(addr, thumb)).and_then(|c| c.opfunc.clone())
    }

    pub fn install_opfunc(&mut self, addr: u32, thumb: bool, decoded: DecodedInstr, cond: Condition) {
        if let Some(entry) = self.cache.get_mut(&Self::cache_key(addr, thumb)) {
            entry.opfunc = Some((decoded, cond));
        }
    }

    pub fn hle_tag(&self, addr: u32, thumb: bool) -> Option<String> {
        self.cache.get(&Self::cache_key(addr, thumb)).and_then(|c| c.hle.clone())
    }

    pub fn register_hle_body(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.hle_handlers.insert(name.into(), body.into());
    }

    /// Hands accumulated HLE handler bodies to the external compiler.
    pub fn hle_init(
        &mut self,
        code_address: u32,
        transport: &mut dyn Transport,
        disasm: &mut dyn Disassembler,
    ) -> SimResult<()> {
        let entries = disasm
            .compile_library(transport, code_address, &self.hle_handlers)
            .map_err(SimError::CompileFailed)?;
        self.hle_entries = entries;
        Ok(())
    }

    /// Invokes the named HLE handler, returning its `r0` result.
    pub fn hle_invoke(
        &mut self,
        name: &str,
        r0: u32,
        transport: &mut dyn Transport,
    ) -> SimResult<u32> {
        self.flush(transport)?;
        let entry = *self
            .hle_entries
            .get(name)
            .ok_or_else(|| SimError::HleNotCompiled { name: name.to_string() })?;
        let result = transport.blx(entry, r0)?;
        self.emit(log::human_hle(&format!("{name} -> r0={result:#x}")));
        Ok(result)
    }

    pub fn save_pages(&self) -> Vec<(u32, Vec<u8>, Vec<u8>)> {
        self.shadow.save_pages()
    }

    pub fn load_pages(&mut self, pages: Vec<(u32, Vec<u8>, Vec<u8>)>) {
        self.shadow.load_pages(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fakes::FakeTransport;

    struct Collector(std::rc::Rc<std::cell::RefCell<Vec<String>>>);
    impl log::MemoryLogSink for Collector {
        fn line(&mut self, text: &str) {
            self.0.borrow_mut().push(text.to_string());
        }
    }

    #[test]
    fn load_emits_human_log_line() {
        let mut mem = MemoryProxy::new();
        let mut t = FakeTransport::new();
        let lines = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        mem.set_log_sink(Box::new(Collector(lines.clone())));
        mem.local_ram(0x2000000, 0x2000FFF);
        mem.store(0x2000000, 0x1234, &mut t).unwrap();
        mem.load(0x2000000, &mut t).unwrap();
        assert!(lines.borrow().iter().any(|l| l.contains("arm-mem-LOAD")));
    }

    #[test]
    fn store_then_load_round_trips() {
        let mut mem = MemoryProxy::new();
        let mut t = FakeTransport::new();
        mem.local_ram(0x2000000, 0x2000FFF);
        mem.store(0x2000000, 0xDEAD_BEEF, &mut t).unwrap();
        assert_eq!(mem.load(0x2000000, &mut t).unwrap(), 0xDEAD_BEEF);
        assert!(t.calls.is_empty(), "shadow-resident store/load must not touch the transport");
    }

    #[test]
    fn non_flash_load_is_not_cached() {
        // MMIO/RAM addresses (at or above FLASH_BOUNDARY) are never marked
        // present by a plain load: only flash prefetch and explicit
        // `local_ram` persist into the shadow (SPEC_FULL.md §3, §8 property 4).
        let mut mem = MemoryProxy::new();
        let mut t = FakeTransport::new();
        t.poke(0x0400_2000, 0xAAAA_AAAA).unwrap();
        t.calls.clear();

        assert_eq!(mem.load(0x0400_2000, &mut t).unwrap(), 0xAAAA_AAAA);
        assert!(!mem.shadow.is_present(0x0400_2000));

        t.poke(0x0400_2000, 0xBBBB_BBBB).unwrap();
        assert_eq!(
            mem.load(0x0400_2000, &mut t).unwrap(),
            0xBBBB_BBBB,
            "a second load of an uncached device address must re-read the device, not a stale shadow copy"
        );
    }

    #[test]
    fn non_flash_store_after_load_still_reaches_transport() {
        let mut mem = MemoryProxy::new();
        let mut t = FakeTransport::new();
        mem.load(0x0400_2000, &mut t).unwrap();
        t.calls.clear();

        mem.store(0x0400_2000, 0x1234, &mut t).unwrap();
        mem.flush(&mut t).unwrap();
        assert!(
            !t.calls.is_empty(),
            "a store to a device address read but never locally captured must not be suppressed"
        );
    }

    #[test]
    fn skip_suppresses_transport_traffic() {
        let mut mem = MemoryProxy::new();
        let mut t = FakeTransport::new();
        mem.skip(0x0400_2088, "known side-effecting register");
        mem.store(0x0400_2088, 1, &mut t).unwrap();
        assert!(t.calls.is_empty());
    }

    #[test]
    fn replayable_format_emits_one_line_per_fill_element() {
        let mut mem = MemoryProxy::new();
        let mut t = FakeTransport::new();
        let lines = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        mem.set_log_sink(Box::new(Collector(lines.clone())));
        mem.set_log_format(log::LogFormat::Replayable);
        mem.store(0x2000000, 0x1234, &mut t).unwrap();
        mem.store(0x2000004, 0x1234, &mut t).unwrap();
        mem.flush(&mut t).unwrap();
        assert_eq!(
            *lines.borrow(),
            vec![
                log::replayable_word(0x2000000, 0x1234),
                log::replayable_word(0x2000004, 0x1234),
            ]
        );
    }

    #[test]
    fn fill_coalescing_produces_one_fill_words_call() {
        let mut mem = MemoryProxy::new();
        let mut t = FakeTransport::new();
        mem.store(0x2000000, 0x1234, &mut t).unwrap();
        mem.store(0x2000004, 0x1234, &mut t).unwrap();
        mem.store(0x2000008, 0x1234, &mut t).unwrap();
        mem.flush(&mut t).unwrap();
        assert_eq!(t.calls, vec!["fill_words 0x2000000 0x1234 3".to_string()]);
    }

    #[test]
    fn address_above_ceiling_is_rejected() {
        let mut mem = MemoryProxy::new();
        let mut t = FakeTransport::new();
        let err = mem.store(0x0500_0000, 1, &mut t).unwrap_err();
        assert_eq!(err, SimError::AddressOutOfRange { address: 0x0500_0000 });
    }

    #[test]
    fn patch_invalidates_both_isa_mode_cache_entries() {
        let mut mem = MemoryProxy::new();
        mem.cache.insert(
            0x1000,
            CachedInstruction {
                record: InstructionRecord {
                    address: 0x1000,
                    next_address: 0x1002,
                    op: "nop".into(),
                    args: String::new(),
                    size_bytes: 2,
                },
                opfunc: None,
                hle: None,
            },
        );
        mem.cache.insert(
            0x1001,
            CachedInstruction {
                record: InstructionRecord {
                    address: 0x1000,
                    next_address: 0x1004,
                    op: "nop".into(),
                    args: String::new(),
                    size_bytes: 4,
                },
                opfunc: None,
                hle: None,
            },
        );
        mem.patch(0x1000, "patched", None);
        assert!(mem.cache.get(&0x1000).is_none());
        assert!(mem.cache.get(&0x1001).is_none());
    }
}
