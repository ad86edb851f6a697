//! Write-combining run encoder (SPEC_FULL.md §4.2). Consecutive stores of
//! the same pattern to consecutive addresses are coalesced into a single
//! run, so the memory proxy can forward them to the transport as one bulk
//! fill instead of many single pokes.

/// An emitted run. `count == 0` carries no information and is produced for
/// every `write()` call that merely extends the in-progress run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub count: u32,
    pub address: u32,
    pub pattern: u32,
    pub size: u8,
}

impl Run {
    fn empty() -> Self {
        Run {
            count: 0,
            address: 0,
            pattern: 0,
            size: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunEncoder {
    count: u32,
    address: u32,
    pattern: u32,
    size: u8,
}

impl RunEncoder {
    pub fn new() -> Self {
        RunEncoder::default()
    }

    /// Accepts one store. Returns a completed run if this write did not
    /// continue the in-progress one (in which case the previous run is
    /// emitted and a new one of length 1 begins), or a zero-count `Run` if
    /// it merely extended the current run.
    pub fn write(&mut self, address: u32, pattern: u32, size: u8) -> Run {
        let continues = self.count > 0
            && address == self.address.wrapping_add(self.count * size as u32)
            && pattern == self.pattern
            && size == self.size;

        if continues {
            self.count += 1;
            return Run::empty();
        }

        let emitted = if self.count > 0 {
            Run {
                count: self.count,
                address: self.address,
                pattern: self.pattern,
                size: self.size,
            }
        } else {
            Run::empty()
        };

        self.count = 1;
        self.address = address;
        self.pattern = pattern;
        self.size = size;
        emitted
    }

    /// Emits and clears any in-progress run.
    pub fn flush(&mut self) -> Run {
        if self.count == 0 {
            return Run::empty();
        }
        let run = Run {
            count: self.count,
            address: self.address,
            pattern: self.pattern,
            size: self.size,
        };
        self.count = 0;
        run
    }
}
