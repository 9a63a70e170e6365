//! Bencode decoder
//!
//! Recursive-descent parsing over a byte cursor. Every call reports how
//! many bytes it consumed so callers can advance past embedded values.

use anyhow::Result;
use tracing::trace;

use crate::bencode::value::BencodeValue;
use crate::error::TorrentError;

/// Maximum nesting depth accepted before decoding fails
pub const MAX_DEPTH: usize = 200;

/// Decode a single bencode value from the front of `data`
///
/// Returns the value together with the number of bytes consumed. Trailing
/// bytes are left for the caller to interpret.
pub fn decode(data: &[u8]) -> Result<(BencodeValue, usize)> {
    trace!("Decoding bencode value from {} bytes", data.len());
    let (value, pos) = decode_value(data, 0, 0)?;
    Ok((value, pos))
}

fn decode_value(data: &[u8], pos: usize, depth: usize) -> Result<(BencodeValue, usize)> {
    if depth > MAX_DEPTH {
        return Err(TorrentError::format_error_with_source(
            "Bencode nesting too deep",
            format!("depth limit: {}", MAX_DEPTH),
        )
        .into());
    }

    let byte = *data
        .get(pos)
        .ok_or_else(|| TorrentError::format_error("Unexpected end of bencode data"))?;

    match byte {
        b'i' => decode_integer(data, pos),
        b'l' => decode_list(data, pos, depth),
        b'd' => decode_dict(data, pos, depth),
        b'0'..=b'9' => decode_bytes(data, pos),
        _ => Err(TorrentError::format_error_with_source(
            "Unknown bencode token",
            format!("byte: 0x{:02x}", byte),
        )
        .into()),
    }
}

fn decode_integer(data: &[u8], pos: usize) -> Result<(BencodeValue, usize)> {
    let end = data[pos + 1..]
        .iter()
        .position(|&b| b == b'e')
        .map(|off| pos + 1 + off)
        .ok_or_else(|| TorrentError::format_error("Unterminated integer"))?;

    let token = std::str::from_utf8(&data[pos + 1..end])
        .map_err(|e| TorrentError::format_error_with_source("Invalid integer token", e.to_string()))?;
    let value: i64 = token
        .parse()
        .map_err(|_| TorrentError::format_error_with_source("Malformed integer", token.to_string()))?;

    Ok((BencodeValue::Int(value), end + 1))
}

fn decode_bytes(data: &[u8], pos: usize) -> Result<(BencodeValue, usize)> {
    let colon = data[pos..]
        .iter()
        .position(|&b| b == b':')
        .map(|off| pos + off)
        .ok_or_else(|| TorrentError::format_error("Missing ':' in byte string"))?;

    let len_token = std::str::from_utf8(&data[pos..colon])
        .map_err(|e| TorrentError::format_error_with_source("Invalid string length", e.to_string()))?;
    let length: usize = len_token
        .parse()
        .map_err(|_| TorrentError::format_error_with_source("Malformed string length", len_token.to_string()))?;

    let start = colon + 1;
    let end = start
        .checked_add(length)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| {
            TorrentError::format_error_with_source(
                "String length exceeds remaining input",
                format!("declared: {}, remaining: {}", length, data.len().saturating_sub(start)),
            )
        })?;

    Ok((BencodeValue::Bytes(data[start..end].to_vec()), end))
}

fn decode_list(data: &[u8], pos: usize, depth: usize) -> Result<(BencodeValue, usize)> {
    let mut items = Vec::new();
    let mut cursor = pos + 1;

    loop {
        match data.get(cursor) {
            Some(b'e') => return Ok((BencodeValue::List(items), cursor + 1)),
            Some(_) => {
                let (item, next) = decode_value(data, cursor, depth + 1)?;
                items.push(item);
                cursor = next;
            }
            None => return Err(TorrentError::format_error("Unterminated list").into()),
        }
    }
}

fn decode_dict(data: &[u8], pos: usize, depth: usize) -> Result<(BencodeValue, usize)> {
    let mut entries: Vec<(Vec<u8>, BencodeValue)> = Vec::new();
    let mut cursor = pos + 1;

    loop {
        match data.get(cursor) {
            Some(b'e') => return Ok((BencodeValue::Dict(entries), cursor + 1)),
            Some(_) => {
                let (key, after_key) = decode_value(data, cursor, depth + 1)?;
                let key = match key {
                    BencodeValue::Bytes(b) => b,
                    _ => {
                        return Err(TorrentError::format_error("Dictionary key must be a byte string").into())
                    }
                };
                let (value, after_value) = decode_value(data, after_key, depth + 1)?;
                entries.push((key, value));
                cursor = after_value;
            }
            None => return Err(TorrentError::format_error("Unterminated dictionary").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::encode;

    #[test]
    fn test_decode_string() {
        let (value, consumed) = decode(b"4:spam").unwrap();
        assert_eq!(value, BencodeValue::Bytes(b"spam".to_vec()));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_decode_integer() {
        let (value, consumed) = decode(b"i52e").unwrap();
        assert_eq!(value, BencodeValue::Int(52));
        assert_eq!(consumed, 4);

        let (value, _) = decode(b"i-7e").unwrap();
        assert_eq!(value, BencodeValue::Int(-7));
    }

    #[test]
    fn test_decode_list() {
        let (value, consumed) = decode(b"l4:spam4:eggse").unwrap();
        assert_eq!(consumed, 14);
        let items = value.as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_str(), Some("spam"));
        assert_eq!(items[1].as_str(), Some("eggs"));
    }

    #[test]
    fn test_decode_empty_list() {
        let (value, consumed) = decode(b"le").unwrap();
        assert_eq!(value, BencodeValue::List(vec![]));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_decode_dict_preserves_key_order() {
        let (value, consumed) = decode(b"d3:cow3:moo4:spam4:eggse").unwrap();
        assert_eq!(consumed, 24);
        let entries = value.as_dict().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b"cow".to_vec());
        assert_eq!(entries[1].0, b"spam".to_vec());

        // Keys out of lexicographic order must also survive as encountered.
        let (reversed, _) = decode(b"d4:spam4:eggs3:cow3:mooe").unwrap();
        let entries = reversed.as_dict().unwrap();
        assert_eq!(entries[0].0, b"spam".to_vec());
        assert_eq!(entries[1].0, b"cow".to_vec());
    }

    #[test]
    fn test_decode_nested() {
        let (value, _) = decode(b"d4:infod6:lengthi1024e4:name4:testee").unwrap();
        let info = value.get(b"info").unwrap();
        assert_eq!(info.get(b"length").and_then(|v| v.as_int()), Some(1024));
        assert_eq!(info.get(b"name").and_then(|v| v.as_str()), Some("test"));
    }

    #[test]
    fn test_decode_truncated_string() {
        assert!(decode(b"4:sp").is_err());
    }

    #[test]
    fn test_decode_unterminated_list() {
        assert!(decode(b"l4:spam").is_err());
    }

    #[test]
    fn test_decode_unterminated_integer() {
        assert!(decode(b"i5").is_err());
    }

    #[test]
    fn test_decode_unterminated_dict() {
        assert!(decode(b"d3:cow3:moo").is_err());
    }

    #[test]
    fn test_decode_malformed_integer() {
        assert!(decode(b"i5x2e").is_err());
        assert!(decode(b"ie").is_err());
    }

    #[test]
    fn test_decode_integer_overflow() {
        assert!(decode(b"i92233720368547758089e").is_err());
    }

    #[test]
    fn test_decode_non_string_dict_key() {
        assert!(decode(b"di1e4:spame").is_err());
    }

    #[test]
    fn test_decode_missing_string_delimiter() {
        assert!(decode(b"4spam").is_err());
    }

    #[test]
    fn test_decode_empty_input() {
        assert!(decode(b"").is_err());
    }

    #[test]
    fn test_decode_depth_cap() {
        let mut hostile = vec![b'l'; MAX_DEPTH + 10];
        hostile.extend(vec![b'e'; MAX_DEPTH + 10]);
        assert!(decode(&hostile).is_err());
    }

    #[test]
    fn test_decode_within_depth_cap() {
        let mut nested = vec![b'l'; 50];
        nested.extend(vec![b'e'; 50]);
        assert!(decode(&nested).is_ok());
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let inputs: &[&[u8]] = &[
            b"4:spam",
            b"0:",
            b"i52e",
            b"i-1e",
            b"le",
            b"l4:spam4:eggse",
            b"d3:cow3:moo4:spam4:eggse",
            b"d4:spam4:eggs3:cow3:mooe",
            b"d4:infod6:lengthi1024e4:name4:testee",
        ];

        for input in inputs {
            let (value, consumed) = decode(input).unwrap();
            assert_eq!(consumed, input.len());
            assert_eq!(encode(&value), input.to_vec());
        }
    }
}
