/*!
Instruction-binary loader.

The on-disk format is one instruction per line: 64 characters of '0'/'1'.
Lines starting `0x`/`0X` are accepted as hexadecimal, matching the
historical tooling. Blank lines are skipped. The meaningful payload is
the low 43 bits; higher bits are reserved and ignored here, and decode
never reads them.
*/

use std::fs;
use std::path::Path;

use crate::error::ProgramError;

/// Parse a program text into instruction words.
pub fn parse_program(text: &str) -> Result<Vec<u64>, ProgramError> {
    let mut words = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        words.push(parse_word(line_no, line)?);
    }
    Ok(words)
}

/// Load a program file.
pub fn load_program(path: impl AsRef<Path>) -> Result<Vec<u64>, ProgramError> {
    parse_program(&fs::read_to_string(path)?)
}

/// Write instruction words in the 64-digit binary format.
pub fn write_program(path: impl AsRef<Path>, words: &[u64]) -> Result<(), ProgramError> {
    Ok(fs::write(path, crate::asm::encode_binary(words))?)
}

fn parse_word(line: usize, text: &str) -> Result<u64, ProgramError> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_err(|_| ProgramError::BadHex {
            line,
            text: text.to_string(),
        });
    }

    if text.len() != 64 {
        return Err(ProgramError::BadLength {
            line,
            len: text.len(),
        });
    }
    let mut value = 0u64;
    for ch in text.chars() {
        value = match ch {
            '0' => value << 1,
            '1' => (value << 1) | 1,
            _ => return Err(ProgramError::BadChar { line, ch }),
        };
    }
    Ok(value)
}
