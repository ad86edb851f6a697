//! The memory proxy's first-class log sink (SPEC_FULL.md §6), distinct from
//! the `log` crate facade used for ambient diagnostics (SPEC_FULL.md §10.1).
//! A sink is optional: with none configured, the memory proxy emits nothing
//! here (it may still emit `log::trace!`/`log::debug!` diagnostics).

/// Implemented by whatever the host wires up to receive memory-proxy trace
/// output: a file, a ring buffer, stdout, a test collector.
pub trait MemoryLogSink {
    fn line(&mut self, text: &str);
}

/// Which of the two SPEC_FULL.md §6 line formats a sink receives. A sink
/// wired up for interactive reading wants `Human`; one feeding a replay
/// tool (to reproduce the exact device writes of a session) wants
/// `Replayable`. The memory proxy renders every store/fill in whichever
/// format is selected; it never emits both for the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Replayable,
}

/// Writes the "Human" format from SPEC_FULL.md §6.
pub fn human_store(size: u8, addr: u32, value: u32, note: &str) -> String {
    let note = if note.is_empty() {
        String::new()
    } else {
        format!("  {note}")
    };
    format!("arm-mem-STORE  {size}[{addr:#010x}] <- {value:#x}{note}")
}

pub fn human_fill(size: u8, addr: u32, pattern: u32, count: u32) -> String {
    format!("arm-mem-FILL  {size}[{addr:#010x}] <- {pattern:#x} * {count}")
}

pub fn human_load(size: u8, addr: u32, value: u32) -> String {
    format!("arm-mem-LOAD  {size}[{addr:#010x}] -> {value:#x}")
}

pub fn human_prefetch(addr: u32) -> String {
    format!("arm-prefetch [{addr:#010x}]")
}

pub fn human_hle(text: &str) -> String {
    format!("HLE: {text}")
}

/// Writes the "Replayable" format from SPEC_FULL.md §6. Half-words decompose
/// into two byte lines by the caller before reaching this module; fills
/// likewise emit one line per element.
pub fn replayable_word(addr: u32, value: u32) -> String {
    format!("%wr  {addr:#010x} {value:#010x}")
}

pub fn replayable_byte(addr: u32, value: u8) -> String {
    format!("%wrb {addr:#010x} {value:#04x}")
}
