//! Conversions between the DAP's base64 memory payloads and MI's hex, plus
//! memory-reference parsing.

use base64::engine::general_purpose as base64_engine;
use base64::Engine as _;

use crate::DebuggerError;

/// Decode an even-length hex string and re-encode it as base64.
pub fn hex_to_base64(hex: &str) -> Result<String, DebuggerError> {
    Ok(base64_engine::STANDARD.encode(hex_to_bytes(hex)?))
}

/// Decode base64 and re-encode as lowercase hex. Dangling bits that would
/// not round-trip are an error, not silently dropped.
pub fn base64_to_hex(base64: &str) -> Result<String, DebuggerError> {
    let bytes = base64_engine::STANDARD.decode(base64).map_err(|error| {
        DebuggerError::UserMessage(format!("Invalid base64 payload: {error}"))
    })?;
    Ok(bytes_to_hex(&bytes))
}

pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, DebuggerError> {
    if hex.len() % 2 != 0 {
        return Err(DebuggerError::UserMessage(format!(
            "Odd-length hex string ({} digits)",
            hex.len()
        )));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| {
                DebuggerError::UserMessage(format!("Invalid hex digits at offset {i}"))
            })
        })
        .collect()
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Memory references arrive as strings: `0x…` hex or decimal.
pub fn parse_memory_reference(reference: &str) -> Result<u64, DebuggerError> {
    let trimmed = reference.trim();
    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else {
        trimmed.parse()
    };
    parsed.map_err(|_| {
        DebuggerError::UserMessage(format!("Invalid memory reference {reference:?}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test]
    fn hex_and_base64_round_trip() {
        for hex in ["", "00", "deadbeef", "0102030405060708090a0b0c0d0e0f10"] {
            assert_eq!(base64_to_hex(&hex_to_base64(hex).unwrap()).unwrap(), hex);
        }
    }

    #[test]
    fn random_round_trip() {
        let mut rng = fastrand::Rng::with_seed(0xb64);
        for _ in 0..200 {
            let bytes: Vec<u8> = (0..rng.usize(0..64)).map(|_| rng.u8(..)).collect();
            let hex = bytes_to_hex(&bytes);
            assert_eq!(base64_to_hex(&hex_to_base64(&hex).unwrap()).unwrap(), hex);
        }
    }

    #[test_case("abc"; "odd length")]
    #[test_case("zz"; "not hex")]
    fn bad_hex_is_rejected(hex: &str) {
        assert!(hex_to_base64(hex).is_err());
    }

    #[test]
    fn dangling_base64_bits_are_rejected() {
        // "QUJDRA" decodes cleanly without padding only if the engine is
        // lax; with canonical padding required it must fail.
        assert!(base64_to_hex("QUJDR").is_err());
        assert!(base64_to_hex("????").is_err());
    }

    #[test]
    fn memory_references() {
        assert_eq!(parse_memory_reference("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_memory_reference("4096").unwrap(), 4096);
        assert!(parse_memory_reference("&main").is_err());
    }
}
