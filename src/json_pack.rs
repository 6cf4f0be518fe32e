//! Base64url and boolean-array packing for MWA JSON-RPC wire fields.
//!
//! MWA payloads, signatures, and signed payloads are carried on the wire as
//! unpadded base64url strings (`payloads`, `signed_payloads`, `signatures`);
//! validity and commitment vectors are carried as plain JSON booleans
//! (`valid`, `committed`). This module is the single place that performs
//! those conversions, so every method handler in [`crate::mwa`] goes through
//! it rather than calling `base64` directly.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;

use crate::mwa::error::ParamError;

/// Encodes a list of byte arrays as a JSON array of unpadded base64url strings.
pub fn pack_bytes(items: &[Vec<u8>]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|bytes| Value::String(URL_SAFE_NO_PAD.encode(bytes)))
            .collect(),
    )
}

/// Decodes a JSON array of base64url strings into byte arrays.
///
/// Fails with [`ParamError::MalformedEncoding`] if the value is not an array,
/// or if any element is not a string or not valid base64url.
pub fn unpack_bytes(value: &Value) -> Result<Vec<Vec<u8>>, ParamError> {
    let array = value
        .as_array()
        .ok_or(ParamError::MalformedEncoding("expected a JSON array"))?;

    array
        .iter()
        .map(|item| {
            let s = item
                .as_str()
                .ok_or(ParamError::MalformedEncoding("expected a base64url string"))?;
            URL_SAFE_NO_PAD
                .decode(s)
                .map_err(|_| ParamError::MalformedEncoding("invalid base64url"))
        })
        .collect()
}

/// Encodes a list of booleans as a JSON array of booleans.
pub fn pack_bools(items: &[bool]) -> Value {
    Value::Array(items.iter().copied().map(Value::Bool).collect())
}

/// Decodes a JSON array of booleans.
///
/// Fails with [`ParamError::MalformedEncoding`] if the value is not an array,
/// or if any element is not a JSON boolean.
pub fn unpack_bools(value: &Value) -> Result<Vec<bool>, ParamError> {
    let array = value
        .as_array()
        .ok_or(ParamError::MalformedEncoding("expected a JSON array"))?;

    array
        .iter()
        .map(|item| {
            item.as_bool()
                .ok_or(ParamError::MalformedEncoding("expected a JSON boolean"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let items = vec![vec![0xDE, 0xAD], vec![], vec![1, 2, 3, 4, 5]];
        let packed = pack_bytes(&items);
        let unpacked = unpack_bytes(&packed).unwrap();
        assert_eq!(unpacked, items);
    }

    #[test]
    fn bools_round_trip() {
        let items = vec![true, false, false, true];
        let packed = pack_bools(&items);
        let unpacked = unpack_bools(&packed).unwrap();
        assert_eq!(unpacked, items);
    }

    #[test]
    fn known_vectors_encode_as_expected() {
        // 0xDEAD -> "3q0" in unpadded base64url.
        let packed = pack_bytes(&[vec![0xDE, 0xAD]]);
        assert_eq!(packed, serde_json::json!(["3q0"]));

        let packed = pack_bytes(&[vec![0xBE, 0xEF]]);
        assert_eq!(packed, serde_json::json!(["vu8"]));
    }

    #[test]
    fn unpack_bytes_rejects_non_array() {
        let err = unpack_bytes(&serde_json::json!("not an array")).unwrap_err();
        assert!(matches!(err, ParamError::MalformedEncoding(_)));
    }

    #[test]
    fn unpack_bytes_rejects_non_string_element() {
        let err = unpack_bytes(&serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, ParamError::MalformedEncoding(_)));
    }

    #[test]
    fn unpack_bytes_rejects_invalid_base64() {
        let err = unpack_bytes(&serde_json::json!(["not-valid-base64!!"])).unwrap_err();
        assert!(matches!(err, ParamError::MalformedEncoding(_)));
    }

    #[test]
    fn unpack_bools_rejects_non_bool_element() {
        let err = unpack_bools(&serde_json::json!([true, "false"])).unwrap_err();
        assert!(matches!(err, ParamError::MalformedEncoding(_)));
    }
}
