/*!
Instruction decode: 64-bit words into request messages.

The meaningful payload sits in the low 43 bits; anything above is
reserved and ignored. Field layout (bit 0 = LSB):

```text
bits 42..=41  opcode: 00 WRITE_MEM, 01 READ_MEM, 10 BROADCAST_INVALIDATE
bits 40..=36  src PE id (0..=31)
WRITE_MEM:    35..=20 addr, 19..=12 num_lines, 11..=4 start_line, 3..=0 qos
READ_MEM:     35..=20 addr, 19..=12 size_words, 11..=4 reserved, 3..=0 qos
BROADCAST:    35..=28 reserved, 27..=20 cache_line, 19..=4 reserved, 3..=0 qos
```

Decode validates the same ranges the assembler enforces, because a binary
stream need not have come from our assembler. A violation is fatal to the
fetching PE only.
*/

use crate::error::DecodeError;
use crate::memory::{CACHE_BLOCKS, MEMORY_WORDS};
use crate::message::{Message, NO_PE, Operation};

const OPCODE_WRITE: u8 = 0b00;
const OPCODE_READ: u8 = 0b01;
const OPCODE_BROADCAST: u8 = 0b10;

fn field(word: u64, shift: u32, bits: u32) -> u64 {
    (word >> shift) & ((1u64 << bits) - 1)
}

/// Decode one instruction word into a request message.
pub fn decode(word: u64) -> Result<Message, DecodeError> {
    let opcode = field(word, 41, 2) as u8;
    let src = field(word, 36, 5);
    let qos = field(word, 0, 4) as u8;

    let mut msg = match opcode {
        OPCODE_WRITE => {
            let addr = field(word, 20, 16);
            let num_lines = field(word, 12, 8);
            let start_line = field(word, 4, 8);
            check_addr(addr)?;
            if num_lines == 0 || num_lines > CACHE_BLOCKS as u64 {
                return Err(DecodeError::FieldRange {
                    field: "num_lines",
                    value: num_lines,
                });
            }
            if start_line >= CACHE_BLOCKS as u64 {
                return Err(DecodeError::FieldRange {
                    field: "start_line",
                    value: start_line,
                });
            }
            let mut m = Message::new(Operation::WriteMem, src as i32, NO_PE);
            m.addr = addr;
            m.num_lines = num_lines as u32;
            m.start_line = start_line as u32;
            m
        }
        OPCODE_READ => {
            let addr = field(word, 20, 16);
            let size_words = field(word, 12, 8);
            check_addr(addr)?;
            if size_words == 0 {
                return Err(DecodeError::FieldRange {
                    field: "size_words",
                    value: size_words,
                });
            }
            let mut m = Message::new(Operation::ReadMem, src as i32, NO_PE);
            m.addr = addr;
            m.size_words = size_words as u32;
            m
        }
        OPCODE_BROADCAST => {
            let cache_line = field(word, 20, 8);
            if cache_line >= CACHE_BLOCKS as u64 {
                return Err(DecodeError::FieldRange {
                    field: "cache_line",
                    value: cache_line,
                });
            }
            let mut m = Message::new(Operation::BroadcastInvalidate, src as i32, NO_PE);
            m.cache_line = cache_line as u32;
            m
        }
        bits => return Err(DecodeError::UnknownOpcode { bits, word }),
    };

    msg.qos = qos;
    Ok(msg)
}

fn check_addr(addr: u64) -> Result<(), DecodeError> {
    if addr % 4 != 0 {
        return Err(DecodeError::MisalignedAddr { addr });
    }
    if addr >= (MEMORY_WORDS * 4) as u64 {
        return Err(DecodeError::FieldRange {
            field: "addr",
            value: addr,
        });
    }
    Ok(())
}
