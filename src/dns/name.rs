//! conversion between wire form and dotted text form of domain names
//!
//! A name on the wire is a run of labels, each a length octet followed by
//! that many octets, closed by the zero length root label. The two high bits
//! of a length octet select the label type; only the plain `00` type is
//! understood here. Compressed names (`11`) are refused outright.
//!
//! Labels are arbitrary octets. In the text form a space, dot or backslash
//! inside a label is preceded by a backslash, and any other octet outside
//! printable ASCII is written as `\DDD` in decimal. Decoding followed by
//! encoding gives back the exact wire name.

use crate::dns::protocol::{Result, WireError};

pub const MAX_LABEL_LEN: usize = 63;
pub const MAX_NAME_LEN: usize = 255;

const LABEL_TYPE_MASK: u8 = 0xC0;
const POINTER_MARKER: u8 = 0xC0;

fn push_label(outstr: &mut String, label: &[u8]) {
    for &ch in label {
        match ch {
            b' ' | b'.' | b'\\' => {
                outstr.push('\\');
                outstr.push(ch as char);
            }
            0x21..=0x7E => outstr.push(ch as char),
            _ => outstr.push_str(&format!("\\{:03}", ch)),
        }
    }
}

/// Decodes the name starting at `offset`, returning its text form and the
/// number of octets consumed including the root label.
pub fn decode_name(bytes: &[u8], offset: usize) -> Result<(String, usize)> {
    let mut pos = offset;
    let mut outstr = String::new();

    let mut delim = "";
    loop {
        let len = *bytes.get(pos).ok_or(WireError::MalformedName)?;

        match len & LABEL_TYPE_MASK {
            0 => {}
            POINTER_MARKER => return Err(WireError::CompressionUnsupported),
            _ => return Err(WireError::LabelTooLong),
        }

        pos += 1;

        // Names are terminated by an empty label of length 0
        if len == 0 {
            break;
        }

        let label = bytes
            .get(pos..pos + len as usize)
            .ok_or(WireError::MalformedName)?;

        outstr.push_str(delim);
        push_label(&mut outstr, label);
        delim = ".";

        pos += len as usize;

        // leave room for the root label
        if pos - offset + 1 > MAX_NAME_LEN {
            return Err(WireError::NameTooLong);
        }
    }

    Ok((outstr, pos - offset))
}

/// Reads the escape following a backslash, returning the octet and how many
/// characters it took.
fn unescape(rest: &[u8]) -> Result<(u8, usize)> {
    match *rest {
        [a, b, c, ..] if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() => {
            let value =
                u16::from(a - b'0') * 100 + u16::from(b - b'0') * 10 + u16::from(c - b'0');
            if value > 0xFF {
                return Err(WireError::MalformedName);
            }
            Ok((value as u8, 3))
        }
        [ch, ..] => Ok((ch, 1)),
        [] => Err(WireError::MalformedName),
    }
}

/// Splits the text form into unescaped labels. A single unescaped trailing
/// dot is dropped; other empty labels are kept for the caller to reject.
fn parse_labels(qname: &str) -> Result<Vec<Vec<u8>>> {
    let text = qname.as_bytes();
    let mut labels = Vec::new();
    if text.is_empty() || text == b"." {
        return Ok(labels);
    }

    let mut label = Vec::new();
    let mut dotted = false;
    let mut pos = 0;
    while let Some(&ch) = text.get(pos) {
        pos += 1;
        dotted = false;

        match ch {
            b'.' => {
                labels.push(std::mem::take(&mut label));
                dotted = true;
            }
            b'\\' => {
                let (octet, used) = unescape(&text[pos..])?;
                label.push(octet);
                pos += used;
            }
            _ => label.push(ch),
        }
    }
    if !dotted {
        labels.push(label);
    }

    Ok(labels)
}

/// Encodes a dotted name. An empty name, or a lone `.`, is the root.
pub fn encode_name(qname: &str) -> Result<Vec<u8>> {
    let labels = parse_labels(qname)?;

    let mut out = Vec::with_capacity(name_len(qname));
    for label in labels.iter() {
        let len = label.len();
        if len == 0 {
            return Err(WireError::MalformedName);
        }
        if len > MAX_LABEL_LEN {
            return Err(WireError::LabelTooLong);
        }

        out.push(len as u8);
        out.extend_from_slice(label);
    }
    out.push(0);

    if out.len() > MAX_NAME_LEN {
        return Err(WireError::NameTooLong);
    }

    Ok(out)
}

/// Appends the wire form of `qname` to `out`. Nothing is written on error.
pub fn write_name(qname: &str, out: &mut Vec<u8>) -> Result<()> {
    let encoded = encode_name(qname)?;
    out.extend_from_slice(&encoded);

    Ok(())
}

/// Length of the wire form, without checking label or name limits. A name
/// with a broken escape is measured by its text.
pub fn name_len(qname: &str) -> usize {
    match parse_labels(qname) {
        Ok(labels) => labels.iter().map(|x| x.len() + 1).sum::<usize>() + 1,
        Err(_) => qname.len() + 2,
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_round_trip() {
        let names = [
            "",
            "com",
            "example.com",
            "a.b.c.d.e.f.g",
            "xn--bcher-kva.example",
            "_sip._udp.example.org",
        ];

        for name in names.iter() {
            let encoded = encode_name(name).unwrap();
            assert_eq!(name_len(name), encoded.len());

            let (decoded, consumed) = decode_name(&encoded, 0).unwrap();
            assert_eq!(*name, decoded);
            assert_eq!(encoded.len(), consumed);
        }
    }

    #[test]
    fn test_round_trip_at_limits() {
        let label = "a".repeat(MAX_LABEL_LEN);
        let name = vec![label.as_str(); 3].join(".");
        let longest = format!("{}.{}", name, "b".repeat(61));
        assert_eq!(MAX_NAME_LEN, name_len(&longest));

        let encoded = encode_name(&longest).unwrap();
        let (decoded, consumed) = decode_name(&encoded, 0).unwrap();
        assert_eq!(longest, decoded);
        assert_eq!(MAX_NAME_LEN, consumed);
    }

    #[test]
    fn test_decode_escapes_label_octets() {
        // one label holding a dot is not the two label name a.b
        let (name, _) = decode_name(b"\x03a.b\x00", 0).unwrap();
        assert_eq!("a\\.b", name);

        let (name, _) = decode_name(b"\x04a b\\\x03com\x00", 0).unwrap();
        assert_eq!("a\\ b\\\\.com", name);

        let (name, _) = decode_name(b"\x02\x00\xff\x00", 0).unwrap();
        assert_eq!("\\000\\255", name);
    }

    #[test]
    fn test_escaped_round_trip() {
        let mut binary = vec![63u8];
        binary.extend_from_slice(&[0xFF; 63]);
        binary.push(0);

        let wire_names = [
            b"\x03a.b\x00".to_vec(),
            b"\x01.\x00".to_vec(),
            b"\x03a\\b\x07example\x00".to_vec(),
            b"\x05a b c\x00".to_vec(),
            b"\x03\x00\x7f\x80\x00".to_vec(),
            binary,
        ];

        for wire in wire_names.iter() {
            let (name, consumed) = decode_name(wire, 0).unwrap();
            assert_eq!(wire.len(), consumed);
            assert_eq!(wire.len(), name_len(&name), "{}", name);
            assert_eq!(*wire, encode_name(&name).unwrap(), "{}", name);
        }
    }

    #[test]
    fn test_encode_escapes() {
        assert_eq!(b"\x03a.b\x00".to_vec(), encode_name("a\\.b").unwrap());
        assert_eq!(b"\x03a.b\x00".to_vec(), encode_name("a\\.b.").unwrap());
        assert_eq!(b"\x02a.\x00".to_vec(), encode_name("a\\.").unwrap());
        assert_eq!(b"\x01A\x00".to_vec(), encode_name("\\065").unwrap());
        assert_eq!(b"\x01x\x00".to_vec(), encode_name("\\x").unwrap());

        assert!(matches!(encode_name("a\\256"), Err(WireError::MalformedName)));
        assert!(matches!(encode_name("a\\"), Err(WireError::MalformedName)));

        let long_label = "\\255".repeat(64);
        assert!(matches!(
            encode_name(&long_label),
            Err(WireError::LabelTooLong)
        ));
    }

    #[test]
    fn test_encode() {
        assert_eq!(vec![0], encode_name("").unwrap());
        assert_eq!(vec![0], encode_name(".").unwrap());
        assert_eq!(
            b"\x07example\x03com\x00".to_vec(),
            encode_name("example.com").unwrap()
        );
        assert_eq!(
            encode_name("example.com").unwrap(),
            encode_name("example.com.").unwrap()
        );
    }

    #[test]
    fn test_encode_rejects_invalid_names() {
        let long_label = format!("{}.com", "a".repeat(64));
        assert!(matches!(
            encode_name(&long_label),
            Err(WireError::LabelTooLong)
        ));

        let long_name = vec!["abcdefghi"; 26].join(".");
        assert!(matches!(
            encode_name(&long_name),
            Err(WireError::NameTooLong)
        ));

        assert!(matches!(
            encode_name("a..b"),
            Err(WireError::MalformedName)
        ));
        assert!(matches!(
            encode_name(".com"),
            Err(WireError::MalformedName)
        ));
    }

    #[test]
    fn test_write_name_leaves_output_untouched_on_error() {
        let mut out = vec![0xAA];
        assert!(write_name("a..b", &mut out).is_err());
        assert_eq!(vec![0xAA], out);

        write_name("a", &mut out).unwrap();
        assert_eq!(vec![0xAA, 1, b'a', 0], out);
    }

    #[test]
    fn test_decode_at_offset() {
        let data = b"\xff\xff\x03www\x00\x00\x01";
        let (name, consumed) = decode_name(data, 2).unwrap();

        assert_eq!("www", name);
        assert_eq!(5, consumed);
    }

    #[test]
    fn test_decode_rejects_compression_pointer() {
        // "www" followed by a pointer to offset 12
        let data = b"\x03www\xc0\x0c";
        assert!(matches!(
            decode_name(data, 0),
            Err(WireError::CompressionUnsupported)
        ));

        // a pointer as the very last octet must not be followed
        let data = b"\xc0";
        assert!(matches!(
            decode_name(data, 0),
            Err(WireError::CompressionUnsupported)
        ));
    }

    #[test]
    fn test_decode_rejects_reserved_label_types() {
        assert!(matches!(
            decode_name(b"\x40abc\x00", 0),
            Err(WireError::LabelTooLong)
        ));
        assert!(matches!(
            decode_name(b"\x80abc\x00", 0),
            Err(WireError::LabelTooLong)
        ));
    }

    #[test]
    fn test_decode_unterminated() {
        assert!(matches!(
            decode_name(b"\x03www", 0),
            Err(WireError::MalformedName)
        ));
        assert!(matches!(
            decode_name(b"\x05ww", 0),
            Err(WireError::MalformedName)
        ));
        assert!(matches!(decode_name(b"", 0), Err(WireError::MalformedName)));
        assert!(matches!(
            decode_name(b"\x00", 5),
            Err(WireError::MalformedName)
        ));
    }

    #[test]
    fn test_decode_rejects_overlong_names() {
        let mut data = Vec::new();
        for _ in 0..5 {
            data.push(63);
            data.extend_from_slice(&[b'x'; 63]);
        }
        data.push(0);

        assert!(matches!(
            decode_name(&data, 0),
            Err(WireError::NameTooLong)
        ));
    }
}
