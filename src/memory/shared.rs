/*!
SharedMemory: the single word-addressed main memory.

4096 words of 32 bits, touched exclusively by the interconnect worker.
Range IO speaks the interconnect's payload currency of 16-byte lines:
a line packs four big-endian words, so the text dump (8 hex digits per
word) reads as the same byte stream the caches hold.

Addresses arriving from instructions are byte addresses; they must be
word aligned and in range or the operation is refused.
*/

use rand::Rng;

use crate::error::MemoryError;
use crate::message::{CacheLine, LINE_SIZE};

/// 32-bit words in the shared store.
pub const MEMORY_WORDS: usize = 4096;

const WORD_BYTES: usize = 4;
const WORDS_PER_LINE: usize = LINE_SIZE / WORD_BYTES;

/// The shared main memory behind the interconnect.
#[derive(Clone)]
pub struct SharedMemory {
    words: Vec<u32>,
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedMemory {
    /// A zeroed store.
    pub fn new() -> Self {
        SharedMemory {
            words: vec![0; MEMORY_WORDS],
        }
    }

    /// Fill every word from `rng`.
    pub fn fill_random(&mut self, rng: &mut impl Rng) {
        for word in &mut self.words {
            *word = rng.r#gen();
        }
    }

    pub fn word(&self, idx: usize) -> u32 {
        self.words[idx]
    }

    pub fn set_word(&mut self, idx: usize, value: u32) {
        self.words[idx] = value;
    }

    /// Read `byte_len` bytes starting at `byte_addr`, rounded up to whole
    /// words, delivered as 16-byte lines with the tail zero-padded to a
    /// full line.
    pub fn read_range(&self, byte_addr: u64, byte_len: u32) -> Result<Vec<CacheLine>, MemoryError> {
        let start = self.word_index(byte_addr)?;
        let word_count = (byte_len as usize).div_ceil(WORD_BYTES);
        if start + word_count > MEMORY_WORDS {
            return Err(MemoryError::OutOfRange {
                addr: byte_addr,
                len: byte_len,
            });
        }

        let mut lines = Vec::with_capacity(word_count.div_ceil(WORDS_PER_LINE));
        for chunk in self.words[start..start + word_count].chunks(WORDS_PER_LINE) {
            let mut line: CacheLine = [0; LINE_SIZE];
            for (i, word) in chunk.iter().enumerate() {
                line[i * WORD_BYTES..(i + 1) * WORD_BYTES].copy_from_slice(&word.to_be_bytes());
            }
            lines.push(line);
        }
        Ok(lines)
    }

    /// Write whole 16-byte lines starting at `byte_addr`.
    pub fn write_range(&mut self, byte_addr: u64, lines: &[CacheLine]) -> Result<(), MemoryError> {
        let start = self.word_index(byte_addr)?;
        let word_count = lines.len() * WORDS_PER_LINE;
        if start + word_count > MEMORY_WORDS {
            return Err(MemoryError::OutOfRange {
                addr: byte_addr,
                len: (lines.len() * LINE_SIZE) as u32,
            });
        }

        for (li, line) in lines.iter().enumerate() {
            for wi in 0..WORDS_PER_LINE {
                let o = wi * WORD_BYTES;
                self.words[start + li * WORDS_PER_LINE + wi] =
                    u32::from_be_bytes([line[o], line[o + 1], line[o + 2], line[o + 3]]);
            }
        }
        Ok(())
    }

    /// Text dump: 4096 lines of 8 hex digits.
    pub fn dump_text(&self) -> String {
        let mut out = String::with_capacity(MEMORY_WORDS * 9);
        for word in &self.words {
            out.push_str(&format!("{word:08x}\n"));
        }
        out
    }

    /// Binary dump: raw little-endian words.
    pub fn dump_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MEMORY_WORDS * WORD_BYTES);
        for word in &self.words {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }

    fn word_index(&self, byte_addr: u64) -> Result<usize, MemoryError> {
        if byte_addr % WORD_BYTES as u64 != 0 {
            return Err(MemoryError::Misaligned { addr: byte_addr });
        }
        let idx = (byte_addr / WORD_BYTES as u64) as usize;
        if idx >= MEMORY_WORDS {
            return Err(MemoryError::OutOfRange {
                addr: byte_addr,
                len: 0,
            });
        }
        Ok(idx)
    }
}

impl std::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("words", &MEMORY_WORDS)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_line() {
        let mut mem = SharedMemory::new();
        let line: CacheLine = [
            0xc8, 0x0b, 0x1d, 0x10, 0xa6, 0xdd, 0x47, 0xe4, 0x7d, 0xd5, 0xaa, 0xf1, 0x25, 0xdc,
            0x99, 0xe2,
        ];
        mem.write_range(0, &[line]).expect("in range");

        // Big-endian packing: the text dump reads as the byte stream.
        assert_eq!(mem.word(0), 0xc80b1d10);
        assert_eq!(mem.word(1), 0xa6dd47e4);
        assert_eq!(mem.word(2), 0x7dd5aaf1);
        assert_eq!(mem.word(3), 0x25dc99e2);

        let back = mem.read_range(0, 16).expect("in range");
        assert_eq!(back, vec![line]);
    }

    #[test]
    fn partial_read_pads_tail_with_zeros() {
        let mut mem = SharedMemory::new();
        mem.set_word(0, 0x01020304);
        mem.set_word(1, 0x05060708);

        // 5 bytes rounds up to 2 words, padded out to one full line.
        let lines = mem.read_range(0, 5).expect("in range");
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            [1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn alignment_and_range_checks() {
        let mut mem = SharedMemory::new();
        assert!(matches!(
            mem.read_range(2, 4),
            Err(MemoryError::Misaligned { .. })
        ));
        assert!(matches!(
            mem.read_range(16384, 4),
            Err(MemoryError::OutOfRange { .. })
        ));
        // Last word is readable...
        assert!(mem.read_range(16380, 4).is_ok());
        // ...but a whole line starting there runs off the end.
        assert!(matches!(
            mem.write_range(16380, &[[0; LINE_SIZE]]),
            Err(MemoryError::OutOfRange { .. })
        ));
    }

    #[test]
    fn dumps() {
        let mut mem = SharedMemory::new();
        mem.set_word(0, 0xdeadbeef);
        let text = mem.dump_text();
        assert_eq!(text.lines().count(), MEMORY_WORDS);
        assert_eq!(text.lines().next(), Some("deadbeef"));

        let bin = mem.dump_binary();
        assert_eq!(bin.len(), MEMORY_WORDS * 4);
        assert_eq!(&bin[..4], &[0xef, 0xbe, 0xad, 0xde]);
    }
}
