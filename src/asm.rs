/*!
Assembler: mnemonic text into 64-bit instruction words.

Grammar: tokens separated by whitespace or commas, `;` starts a line
comment. Integers accept the standard textual forms (decimal, `0x`, `0o`,
`0b`). Three mnemonics:

```text
WRITE_MEM src, addr, num_lines, start_line, qos
READ_MEM src, addr, size_words, qos
BROADCAST_INVALIDATE src, cache_line, qos
```

Out-of-range fields and misaligned addresses are rejected with the
offending line number. Encoded words carry the payload in the low 43
bits; `encode_binary` renders them as the 64-digit binary lines the
loader consumes.
*/

use crate::error::AsmError;
use crate::memory::{CACHE_BLOCKS, MEMORY_WORDS};

const MAX_SRC: i64 = 31;
const MAX_QOS: i64 = 15;

const OPCODE_WRITE: u64 = 0b00;
const OPCODE_READ: u64 = 0b01;
const OPCODE_BROADCAST: u64 = 0b10;

/// Assemble a whole source text into instruction words.
pub fn assemble_str(src: &str) -> Result<Vec<u64>, AsmError> {
    let mut words = Vec::new();
    for (idx, raw) in src.lines().enumerate() {
        let line_no = idx + 1;
        let tokens = tokenize(raw);
        if tokens.is_empty() {
            continue;
        }
        words.push(assemble_tokens(line_no, &tokens)?);
    }
    Ok(words)
}

/// Render instruction words as 64-character binary lines.
pub fn encode_binary(words: &[u64]) -> String {
    let mut out = String::with_capacity(words.len() * 65);
    for word in words {
        out.push_str(&format!("{word:064b}\n"));
    }
    out
}

/// Encode a WRITE_MEM instruction.
pub fn encode_write_mem(
    src: i64,
    addr: i64,
    num_lines: i64,
    start_line: i64,
    qos: i64,
) -> Result<u64, AsmError> {
    let tokens = [
        "WRITE_MEM".to_string(),
        src.to_string(),
        addr.to_string(),
        num_lines.to_string(),
        start_line.to_string(),
        qos.to_string(),
    ];
    assemble_tokens(0, &tokens)
}

/// Encode a READ_MEM instruction.
pub fn encode_read_mem(src: i64, addr: i64, size_words: i64, qos: i64) -> Result<u64, AsmError> {
    let tokens = [
        "READ_MEM".to_string(),
        src.to_string(),
        addr.to_string(),
        size_words.to_string(),
        qos.to_string(),
    ];
    assemble_tokens(0, &tokens)
}

/// Encode a BROADCAST_INVALIDATE instruction.
pub fn encode_broadcast_invalidate(src: i64, cache_line: i64, qos: i64) -> Result<u64, AsmError> {
    let tokens = [
        "BROADCAST_INVALIDATE".to_string(),
        src.to_string(),
        cache_line.to_string(),
        qos.to_string(),
    ];
    assemble_tokens(0, &tokens)
}

fn tokenize(raw: &str) -> Vec<String> {
    let code = raw.split(';').next().unwrap_or("");
    code.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn assemble_tokens(line: usize, tokens: &[String]) -> Result<u64, AsmError> {
    let mnemonic = tokens[0].as_str();
    match mnemonic {
        "WRITE_MEM" => {
            let [src, addr, num_lines, start_line, qos] = operands::<5>(line, tokens)?;
            let src = check_src(line, src)?;
            let addr = check_addr(line, addr)?;
            let num_lines = check_range(line, "num_lines", num_lines, 1, CACHE_BLOCKS as i64)?;
            let start_line =
                check_range(line, "start_line", start_line, 0, CACHE_BLOCKS as i64 - 1)?;
            let qos = check_range(line, "qos", qos, 0, MAX_QOS)?;
            Ok((OPCODE_WRITE << 41)
                | (src << 36)
                | (addr << 20)
                | (num_lines << 12)
                | (start_line << 4)
                | qos)
        }
        "READ_MEM" => {
            let [src, addr, size_words, qos] = operands::<4>(line, tokens)?;
            let src = check_src(line, src)?;
            let addr = check_addr(line, addr)?;
            let size_words =
                check_range(line, "size_words", size_words, 1, CACHE_BLOCKS as i64)?;
            let qos = check_range(line, "qos", qos, 0, MAX_QOS)?;
            Ok((OPCODE_READ << 41) | (src << 36) | (addr << 20) | (size_words << 12) | qos)
        }
        "BROADCAST_INVALIDATE" => {
            let [src, cache_line, qos] = operands::<3>(line, tokens)?;
            let src = check_src(line, src)?;
            let cache_line =
                check_range(line, "cache_line", cache_line, 0, CACHE_BLOCKS as i64 - 1)?;
            let qos = check_range(line, "qos", qos, 0, MAX_QOS)?;
            Ok((OPCODE_BROADCAST << 41) | (src << 36) | (cache_line << 20) | qos)
        }
        _ => Err(AsmError::UnknownMnemonic {
            line,
            mnemonic: mnemonic.to_string(),
        }),
    }
}

/// Parse exactly `N` integer operands after the mnemonic.
fn operands<const N: usize>(line: usize, tokens: &[String]) -> Result<[i64; N], AsmError> {
    if tokens.len() != N + 1 {
        return Err(AsmError::OperandCount {
            line,
            expected: N,
            found: tokens.len() - 1,
        });
    }
    let mut out = [0i64; N];
    for (i, token) in tokens[1..].iter().enumerate() {
        out[i] = parse_int(line, token)?;
    }
    Ok(out)
}

/// Standard textual integer forms: decimal, 0x, 0o, 0b.
fn parse_int(line: usize, token: &str) -> Result<i64, AsmError> {
    let bad = || AsmError::BadInteger {
        line,
        token: token.to_string(),
    };
    let (neg, body) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).map_err(|_| bad())?
    } else if let Some(oct) = body.strip_prefix("0o").or_else(|| body.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).map_err(|_| bad())?
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).map_err(|_| bad())?
    } else {
        body.parse::<i64>().map_err(|_| bad())?
    };
    Ok(if neg { -value } else { value })
}

fn check_src(line: usize, value: i64) -> Result<u64, AsmError> {
    check_range(line, "src", value, 0, MAX_SRC)
}

fn check_addr(line: usize, value: i64) -> Result<u64, AsmError> {
    if !(0..(MEMORY_WORDS as i64 * 4)).contains(&value) {
        return Err(AsmError::FieldRange {
            line,
            field: "addr",
            value,
        });
    }
    if value % 4 != 0 {
        return Err(AsmError::MisalignedAddr { line, value });
    }
    Ok(value as u64)
}

fn check_range(
    line: usize,
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<u64, AsmError> {
    if !(min..=max).contains(&value) {
        return Err(AsmError::FieldRange { line, field, value });
    }
    Ok(value as u64)
}
