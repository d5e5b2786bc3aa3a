//! Hex/ASCII memory dumps, used to trace packets on the wire

use crate::types::bytes_to_hex;

const LINE_WIDTH: usize = 16;

/// Format `buf` as hex/ASCII lines, 16 bytes per line.
///
/// Each line reads `<prefix>: <addr>: <hex bytes> <ascii>`, for example
/// `  W: 0000: ff ff 01 02 01 fb` followed by the padded ASCII column.
/// An empty buffer yields the single line `<prefix>:No data`.
pub fn dump_mem(buf: &[u8], prefix: &str, addr: usize) -> Vec<String> {
    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{}:", prefix)
    };
    if buf.is_empty() {
        return vec![format!("{}No data", prefix)];
    }

    let sep = if prefix.is_empty() { "" } else { " " };
    buf.chunks(LINE_WIDTH)
        .enumerate()
        .map(|(i, chunk)| {
            let ascii: String = chunk
                .iter()
                .map(|&b| if (0x20..=0x7e).contains(&b) { b as char } else { '.' })
                .collect();
            format!(
                "{}{}{:04x}: {:<width$} {}",
                prefix,
                sep,
                addr + i * LINE_WIDTH,
                bytes_to_hex(chunk),
                ascii,
                width = LINE_WIDTH * 3 - 1
            )
        })
        .collect()
}
