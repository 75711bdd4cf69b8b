use std::fmt::Write;

/// Offset-prefixed hex dump, 16 bytes per line, for trace logging.
pub fn hexdump(buf: &[u8]) -> String {
    let mut string = String::new();

    buf.chunks(16).enumerate().for_each(|(i, chunk)| {
        let _ = write!(string, "{:04x} ", i * 16);

        chunk.iter().for_each(|c| {
            let _ = write!(string, "{:02x} ", c);
        });

        string.push('\n');
    });

    string
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump() {
        let buf: Vec<u8> = (0u8..18).collect();
        let dump = hexdump(&buf);

        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000 00 01 02"));
        assert_eq!(lines[1], "0010 10 11 ");
    }
}
