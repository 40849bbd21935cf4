use std::cmp;
use std::fmt::Write;

/// Renders `data` in the canonical hex+ASCII layout:
///
/// ```text
/// 00000000  45 46 49 20 50 41 52 54  00 00 01 00 5c 00 00 00  |EFI PART....\...|
/// ```
///
/// Every line, including the last, ends with a newline. Empty input renders as an empty string.
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() / 16 * 79 + 79);
    let mut address = 0;

    while address < data.len() {
        let end = cmp::min(address + 16, data.len());
        write_line(&mut out, &data[address..end], address);
        address += 16;
    }

    out
}

fn write_line(out: &mut String, line: &[u8], address: usize) {
    // Writing to a `String` cannot fail.
    let _ = write!(out, "{:08x}  ", address);

    for i in 0..16 {
        match line.get(i) {
            Some(b) => {
                let _ = write!(out, "{:02x} ", b);
            }
            None => out.push_str("   "),
        }
        if i == 7 {
            out.push(' ');
        }
    }

    out.push_str(" |");
    for &c in line {
        // replace all non printable chars with dots
        if (0x20..=0x7e).contains(&c) {
            out.push(c as char);
        } else {
            out.push('.');
        }
    }
    out.push_str("|\n");
}
