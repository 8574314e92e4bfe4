/*!
QoS configuration: `id: 0xHH` lines, one PE per line.

Missing entries default to 0. Bad lines and out-of-range values are
warned about and skipped rather than failing the run, matching the
original tool's lenient reader. QoS is a 4-bit class, so values above 15
are rejected.
*/

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;

/// Parse QoS config text into an id -> class map.
pub fn parse_qos(text: &str) -> HashMap<usize, u8> {
    let mut map = HashMap::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match parse_entry(line) {
            Some((id, qos)) if qos <= 0xf => {
                map.insert(id, qos);
            }
            Some((id, qos)) => {
                warn!(line = idx + 1, id, qos, "QoS above 0xf ignored");
            }
            None => {
                warn!(line = idx + 1, text = line, "invalid QoS entry ignored");
            }
        }
    }
    map
}

/// Load a QoS config file.
pub fn load_qos(path: impl AsRef<Path>) -> io::Result<HashMap<usize, u8>> {
    Ok(parse_qos(&fs::read_to_string(path)?))
}

/// Flatten the map into a per-PE vector with 0 defaults.
pub fn qos_vec(map: &HashMap<usize, u8>, pe_count: usize) -> Vec<u8> {
    (0..pe_count).map(|i| map.get(&i).copied().unwrap_or(0)).collect()
}

fn parse_entry(line: &str) -> Option<(usize, u8)> {
    let (id, value) = line.split_once(':')?;
    let id = id.trim().parse().ok()?;
    let value = value.trim();
    let value = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
    let qos = u8::from_str_radix(value, 16).ok()?;
    Some((id, qos))
}
