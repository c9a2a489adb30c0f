//! # Bit packing and self-describing integers
//!
//! Fields narrower than a byte are packed most-significant-bit first. A byte counts
//! as consumed only once all 8 of its bits are accounted for, so four 2-bit fields
//! consume exactly one byte and report the same `[p, p+1)` span. A field that crosses
//! a byte boundary spans every byte it touches.
//!
//! ## Wire format
//!
//! - **Sub-byte fields**: `(byte >> (8 - consumed - n)) & ((1 << n) - 1)`; a field may
//!   straddle a byte boundary (e.g. 4 bits then 8 bits).
//! - **varint**: top 2 bits of the first byte select 1, 2, 4 or 8 bytes; those bits
//!   are masked out of the value.
//! - **pn**: `00` 1 byte, `10` 2 bytes, `11` 4 bytes, `01` invalid.
//!
//! ## Test index
//!
//! | Test | Expected |
//! |------|----------|
//! | `four_two_bit_fields_consume_one_byte` | values `[b7b6, b5b4, b3b2, b1b0]`, tree ends at 1 |
//! | `nibble_then_byte_straddles` | 12 bits across two bytes, 2 bytes consumed, spans cover touched bytes |
//! | `partial_final_byte_counts_as_consumed` | 3 bits in a 1-byte buffer fully consume it |
//! | `varint_in_grammar` | widths 1/2/4/8 reported as spans |
//! | `prop_varint_prefix_masked` | prefix bits never change the magnitude |
//! | `prop_packet_number_widths` | `00`/`10`/`11` read 1/2/4 bytes, `01` fails |
//! | `prop_reencoded_tree_parses_identically` | leaves re-encoded from a tree rebuild the buffer and the same tree |

use proptest::prelude::*;
use protodissect::reader::BitCursor;
use protodissect::{parse, parse_top_level, Options, ParseError, StreamContext, Value};

const QUAD: &str = r#"
top: [Quad]
Quad:
  - a: {length: 2}
  - b: {length: 2}
  - c: {length: 2}
  - d: {length: 2}
"#;

const STRADDLE: &str = r#"
top: [S]
S:
  - hi: {length: 4}
  - mid: {length: 8}
  - lo: {length: 4}
"#;

const SHORT: &str = r#"
top: [T]
T:
  - x: {length: 3}
"#;

const MESSAGE: &str = r#"
top: [Msg]
Msg:
  - Kind: {length: 8}
  - Size: {length: varint}
  - Items: {parse: Item, length: '*'}
Item:
  - Tag: {length: 16}
  - Val: {length: varint}
"#;

const VARINTS: &str = r#"
top: [V]
V:
  - v: {length: varint, repeated: true}
"#;

fn encode_varint(v: u64, width: usize) -> Vec<u8> {
    let masked = v & (u64::MAX >> (66 - 8 * width as u32));
    let mut out = masked.to_be_bytes()[8 - width..].to_vec();
    out[0] |= (width.trailing_zeros() as u8) << 6;
    out
}

/// Rebuild wire bytes from the byte-aligned leaves of a `MESSAGE` tree.
fn reencode(tree: &protodissect::ParseTree) -> Vec<u8> {
    let mut out = Vec::new();
    for leaf in tree.root().expect("root").leaves() {
        let v = leaf.value().and_then(Value::as_u64).expect("integer leaf");
        match leaf.name.as_str() {
            "Size" | "Val" => out.extend(encode_varint(v, leaf.width())),
            _ => out.extend_from_slice(&v.to_be_bytes()[8 - leaf.width()..]),
        }
    }
    out
}

fn leaf_summary(tree: &protodissect::ParseTree) -> Vec<(String, Value, usize, usize)> {
    tree.root()
        .expect("root")
        .leaves()
        .iter()
        .map(|f| (f.name.clone(), f.value().cloned().expect("scalar"), f.start, f.end))
        .collect()
}

fn dissect_one(src: &str, buf: &[u8]) -> Result<protodissect::ParseTree, ParseError> {
    let g = parse(src).expect("parse");
    parse_top_level(buf, &g, Options::default(), &mut StreamContext::new())
}

#[test]
fn four_two_bit_fields_consume_one_byte() {
    let tree = dissect_one(QUAD, &[0b11_01_10_00]).expect("dissect");
    let root = tree.root().expect("root");
    let values: Vec<_> = root.leaves().iter().filter_map(|f| f.value()).cloned().collect();
    assert_eq!(values, vec![Value::Uint(3), Value::Uint(1), Value::Uint(2), Value::Uint(0)]);
    assert!(root.leaves().iter().all(|f| (f.start, f.end) == (0, 1)));
    assert_eq!(tree.end(), 1);
}

#[test]
fn four_two_bit_fields_reject_second_byte() {
    assert!(matches!(
        dissect_one(QUAD, &[0xff, 0x00]),
        Err(ParseError::TrailingBytes { consumed: 1, total: 2, .. })
    ));
}

#[test]
fn nibble_then_byte_straddles() {
    let tree = dissect_one(STRADDLE, &[0xab, 0xcd]).expect("dissect");
    let root = tree.root().expect("root");
    assert_eq!(root.get("hi"), Some(&Value::Uint(0xa)));
    assert_eq!(root.get("mid"), Some(&Value::Uint(0xbc)));
    assert_eq!(root.get("lo"), Some(&Value::Uint(0xd)));
    let spans: Vec<_> = root.leaves().iter().map(|f| (f.start, f.end)).collect();
    assert_eq!(spans, vec![(0, 1), (0, 2), (1, 2)]);
    assert_eq!(tree.end(), 2);
}

#[test]
fn partial_final_byte_counts_as_consumed() {
    let tree = dissect_one(SHORT, &[0b101_00000]).expect("dissect");
    assert_eq!(tree.find("x"), Some(&Value::Uint(0b101)));
    assert_eq!(tree.end(), 1);
}

#[test]
fn varint_in_grammar() {
    let buf = [
        0x25, // 1 byte: 0x25
        0x7b, 0xbd, // 2 bytes: 0x3bbd
        0x9d, 0x7f, 0x3e, 0x7d, // 4 bytes: 0x1d7f3e7d
        0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c, // 8 bytes
    ];
    let tree = dissect_one(VARINTS, &buf).expect("dissect");
    let root = tree.root().expect("root");
    let got: Vec<_> = root
        .leaves()
        .iter()
        .map(|f| (f.value().and_then(Value::as_u64), f.start, f.end))
        .collect();
    assert_eq!(
        got,
        vec![
            (Some(0x25), 0, 1),
            (Some(0x3bbd), 1, 3),
            (Some(0x1d7f3e7d), 3, 7),
            (Some(0x02197c5eff14e88c), 7, 15),
        ]
    );
}

#[test]
fn varint_truncated() {
    assert!(matches!(
        dissect_one(VARINTS, &[0x40]),
        Err(ParseError::InsufficientBytes { needed: 2, available: 1, .. })
    ));
}

proptest! {
    #[test]
    fn prop_varint_prefix_masked(class in 0u8..4, body in prop::collection::vec(any::<u8>(), 8)) {
        let width = 1usize << class;
        let mut bytes = body[..width].to_vec();
        bytes[0] = (bytes[0] & 0x3f) | (class << 6);
        let mut expected = 0u64;
        for (i, b) in bytes.iter().enumerate() {
            let b = if i == 0 { b & 0x3f } else { *b };
            expected = (expected << 8) | b as u64;
        }
        let mut c = BitCursor::new(&bytes);
        let (v, bits) = c.read_varint("v").expect("varint");
        prop_assert_eq!(v, expected);
        prop_assert_eq!(bits, width as u64 * 8);
        prop_assert!(c.is_exhausted());
    }

    #[test]
    fn prop_packet_number_widths(first in any::<u8>(), rest in prop::collection::vec(any::<u8>(), 3)) {
        let mut bytes = vec![first];
        bytes.extend_from_slice(&rest);
        let mut c = BitCursor::new(&bytes);
        match first >> 6 {
            0b01 => {
                let is_unknown_pattern =
                    matches!(c.read_packet_number("pn"), Err(ParseError::UnknownEncodingPattern { .. }));
                prop_assert!(is_unknown_pattern);
            }
            pattern => {
                let width = match pattern {
                    0b00 => 1,
                    0b10 => 2,
                    _ => 4,
                };
                let (_, bits) = c.read_packet_number("pn").expect("pn");
                prop_assert_eq!(bits, width * 8);
                prop_assert_eq!(c.position(), width as usize);
            }
        }
    }

    #[test]
    fn prop_reencoded_tree_parses_identically(
        kind in any::<u8>(),
        size in (0u32..4, any::<u64>()),
        items in prop::collection::vec((any::<u16>(), 0u32..4, any::<u64>()), 0..6),
    ) {
        let mut buf = vec![kind];
        buf.extend(encode_varint(size.1, 1 << size.0));
        for (tag, class, val) in &items {
            buf.extend_from_slice(&tag.to_be_bytes());
            buf.extend(encode_varint(*val, 1 << class));
        }

        let first = dissect_one(MESSAGE, &buf).expect("dissect");
        prop_assert_eq!(first.end(), buf.len());
        let rebuilt = reencode(&first);
        prop_assert_eq!(&rebuilt, &buf);
        let second = dissect_one(MESSAGE, &rebuilt).expect("dissect rebuilt");
        prop_assert_eq!(leaf_summary(&first), leaf_summary(&second));
        prop_assert_eq!(first.root().expect("root").all("Items").count(), items.len());
    }

    #[test]
    fn prop_repeated_bytes_cover_buffer(buf in prop::collection::vec(any::<u8>(), 1..64)) {
        let g = parse("top: [B]\nB:\n  - v: {length: 8, repeated: true}\n").expect("parse");
        let tree = parse_top_level(&buf, &g, Options::default(), &mut StreamContext::new()).expect("dissect");
        let root = tree.root().expect("root");
        let total: usize = root.leaves().iter().map(|f| f.width()).sum();
        prop_assert_eq!(total, buf.len());
        prop_assert_eq!(root.leaves().len(), buf.len());
    }
}
