/*!
LocalCache: a PE's private L1 view.

128 blocks of 16 bytes plus one invalid bit per block. The owning PE is
the only writer during a run; the interconnect sees cache data only as
the payload a PE attaches to WRITE_MEM before submission.

The dump format is one text line of 32 hex digits per block, with a
sibling file of `0`/`1` lines for the invalid bits. Dumps are behavioral
snapshots produced through a `DumpSink`, not persistence.
*/

use rand::Rng;

use crate::error::MemoryError;
use crate::message::{CacheLine, LINE_SIZE};

/// Number of 16-byte blocks per cache.
pub const CACHE_BLOCKS: usize = 128;

/// Private line-addressed store with invalid-bit tracking.
#[derive(Clone)]
pub struct LocalCache {
    id: usize,
    blocks: [CacheLine; CACHE_BLOCKS],
    invalid: [bool; CACHE_BLOCKS],
}

impl LocalCache {
    /// A zeroed cache with all lines valid, owned by PE `id`.
    pub fn new(id: usize) -> Self {
        LocalCache {
            id,
            blocks: [[0; LINE_SIZE]; CACHE_BLOCKS],
            invalid: [false; CACHE_BLOCKS],
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Fill every block from `rng`, matching the original
    /// initialize-with-entropy flow. Clears all invalid bits.
    pub fn fill_random(&mut self, rng: &mut impl Rng) {
        for block in &mut self.blocks {
            rng.fill(&mut block[..]);
        }
        self.invalid = [false; CACHE_BLOCKS];
    }

    /// Read `count` consecutive lines starting at `start`.
    pub fn read_lines(&self, start: u32, count: u32) -> Result<Vec<CacheLine>, MemoryError> {
        let (start_idx, end) = self.line_span(start, count)?;
        Ok(self.blocks[start_idx..end].to_vec())
    }

    /// Overwrite consecutive lines starting at `start`. A written line is
    /// a refill: its invalid bit clears.
    pub fn write_lines(&mut self, start: u32, lines: &[CacheLine]) -> Result<(), MemoryError> {
        let (start_idx, end) = self.line_span(start, lines.len() as u32)?;
        self.blocks[start_idx..end].copy_from_slice(lines);
        for flag in &mut self.invalid[start_idx..end] {
            *flag = false;
        }
        Ok(())
    }

    /// Flip the invalid bit for one line.
    pub fn invalidate(&mut self, line: u32) -> Result<(), MemoryError> {
        let idx = line as usize;
        if idx >= CACHE_BLOCKS {
            return Err(MemoryError::LineOutOfRange {
                start: line,
                count: 1,
            });
        }
        self.invalid[idx] = true;
        Ok(())
    }

    /// One block's bytes; panics only on an out-of-range test index.
    pub fn line(&self, idx: usize) -> &CacheLine {
        &self.blocks[idx]
    }

    /// Install one block's bytes directly (test setup and loaders).
    pub fn set_line(&mut self, idx: usize, line: CacheLine) {
        self.blocks[idx] = line;
    }

    pub fn is_invalid(&self, idx: usize) -> bool {
        self.invalid[idx]
    }

    /// True when any line in `start..start+count` carries the invalid bit.
    pub fn any_invalid(&self, start: u32, count: u32) -> bool {
        match self.line_span(start, count) {
            Ok((s, e)) => self.invalid[s..e].iter().any(|&f| f),
            Err(_) => false,
        }
    }

    /// Text dump: 128 lines of 32 hex digits.
    pub fn dump_text(&self) -> String {
        let mut out = String::with_capacity(CACHE_BLOCKS * (LINE_SIZE * 2 + 1));
        for block in &self.blocks {
            for byte in block {
                out.push_str(&format!("{byte:02x}"));
            }
            out.push('\n');
        }
        out
    }

    /// Sibling dump of the invalid bits: 128 lines of `0` or `1`.
    pub fn dump_flags(&self) -> String {
        let mut out = String::with_capacity(CACHE_BLOCKS * 2);
        for &flag in &self.invalid {
            out.push(if flag { '1' } else { '0' });
            out.push('\n');
        }
        out
    }

    fn line_span(&self, start: u32, count: u32) -> Result<(usize, usize), MemoryError> {
        let start_idx = start as usize;
        let end = start_idx + count as usize;
        if end > CACHE_BLOCKS {
            return Err(MemoryError::LineOutOfRange { start, count });
        }
        Ok((start_idx, end))
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("id", &self.id)
            .field("blocks", &CACHE_BLOCKS)
            .field(
                "invalid_lines",
                &self.invalid.iter().filter(|&&b| b).count(),
            )
            .finish()
    }
}
