//! # ASN.1 Signature Codec
//!
//! Tokens produce and consume DSA/ECDSA signatures as `r || s` with equal
//! fixed-width halves. Callers see `SEQUENCE { INTEGER r, INTEGER s }`.

use super::algorithm::RAW_DSA_LEN;
use super::errors::{EngineError, SignatureFormatError};
use der::asn1::UintRef;
use der::{Decode, Encode, Sequence};

/// `Dss-Sig-Value` / `ECDSA-Sig-Value` (RFC 3279).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
struct SignatureValue<'a> {
    r: UintRef<'a>,
    s: UintRef<'a>,
}

/// Encode a token `r || s` block as DER.
///
/// # Errors
/// `MalformedTokenSignature` for an empty or odd-length block.
pub fn raw_to_der(raw: &[u8]) -> Result<Vec<u8>, EngineError> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(EngineError::MalformedTokenSignature(format!(
            "r || s block of {} bytes",
            raw.len()
        )));
    }
    let (r, s) = raw.split_at(raw.len() / 2);
    let value = SignatureValue {
        r: UintRef::new(r).map_err(malformed)?,
        s: UintRef::new(s).map_err(malformed)?,
    };
    value.to_der().map_err(malformed)
}

fn malformed(err: der::Error) -> EngineError {
    EngineError::MalformedTokenSignature(err.to_string())
}

/// Parse DER into the magnitudes of r and s.
///
/// Exactly one SEQUENCE holding exactly two non-negative INTEGERs; anything
/// else, trailing bytes included, is rejected.
pub fn decode_der(signature: &[u8]) -> Result<(&[u8], &[u8]), SignatureFormatError> {
    let value = SignatureValue::from_der(signature)?;
    Ok((value.r.as_bytes(), value.s.as_bytes()))
}

/// DER to the 40-byte DSA token format (two 20-byte halves).
pub fn der_to_dsa(signature: &[u8]) -> Result<Vec<u8>, SignatureFormatError> {
    let (r, s) = decode_der(signature)?;
    let mut out = vec![0u8; 2 * RAW_DSA_LEN];
    right_justify(&mut out[..RAW_DSA_LEN], r)?;
    right_justify(&mut out[RAW_DSA_LEN..], s)?;
    Ok(out)
}

/// DER to the ECDSA token format.
///
/// Each half is as wide as the longer of r and s with leading zeros removed
/// (never narrower than one byte).
pub fn der_to_ecdsa(signature: &[u8]) -> Result<Vec<u8>, SignatureFormatError> {
    let (r, s) = decode_der(signature)?;
    let width = r.len().max(s.len());
    let mut out = vec![0u8; 2 * width];
    right_justify(&mut out[..width], r)?;
    right_justify(&mut out[width..], s)?;
    Ok(out)
}

/// Copy a minimal magnitude into the low end of a fixed-width field.
fn right_justify(field: &mut [u8], magnitude: &[u8]) -> Result<(), SignatureFormatError> {
    if magnitude.len() > field.len() {
        return Err(SignatureFormatError::ComponentTooLarge {
            len: magnitude.len(),
            width: field.len(),
        });
    }
    let offset = field.len() - magnitude.len();
    field[offset..].copy_from_slice(magnitude);
    Ok(())
}
