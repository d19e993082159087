//! # PKCS#1 v1.5 Signature Encoding
//!
//! DigestInfo construction and block-type-1 padding (RFC 8017, Section 9.2).
//!
//! ```text
//! EM = 0x00 || 0x01 || 0xFF.. (>= 8) || 0x00 || DigestInfo
//! ```

use crate::digest::DigestAlgorithm;
use crate::CryptoError;
use der::asn1::{AnyRef, Null, OctetStringRef};
use der::{Encode, Sequence};
use spki::AlgorithmIdentifierRef;

/// Smallest padded block accepted (512-bit modulus).
pub const MIN_PADDED_SIZE: usize = 64;

/// Fixed overhead of block-type-1 padding: 00 01 <8 x FF> 00.
pub const PADDING_OVERHEAD: usize = 11;

/// `DigestInfo ::= SEQUENCE { digestAlgorithm AlgorithmIdentifier, digest OCTET STRING }`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct DigestInfo<'a> {
    algorithm: AlgorithmIdentifierRef<'a>,
    digest: OctetStringRef<'a>,
}

impl<'a> DigestInfo<'a> {
    fn new(algorithm: DigestAlgorithm, digest: &'a [u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            algorithm: AlgorithmIdentifierRef {
                oid: algorithm.oid(),
                parameters: Some(AnyRef::from(Null)),
            },
            digest: OctetStringRef::new(digest)?,
        })
    }
}

/// Encode the DigestInfo for `digest`.
///
/// The AlgorithmIdentifier carries an explicit NULL parameter.
pub fn encode_digest_info(
    algorithm: DigestAlgorithm,
    digest: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    Ok(DigestInfo::new(algorithm, digest)?.to_der()?)
}

/// Length of the DigestInfo for `algorithm`, in bytes.
pub fn digest_info_len(algorithm: DigestAlgorithm) -> Result<usize, CryptoError> {
    let digest = vec![0u8; algorithm.output_len()];
    let len = DigestInfo::new(algorithm, &digest)?.encoded_len()?;
    Ok(usize::try_from(len)?)
}

/// Block-type-1 padding for a modulus of `padded_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Type1Padding {
    padded_size: usize,
}

impl Type1Padding {
    /// Padding for a modulus of `padded_size` bytes.
    pub fn new(padded_size: usize) -> Result<Self, CryptoError> {
        if padded_size < MIN_PADDED_SIZE {
            return Err(CryptoError::PaddedSizeTooSmall {
                size: padded_size,
                min: MIN_PADDED_SIZE,
            });
        }
        Ok(Self { padded_size })
    }

    /// Padding for a modulus of `bits` bits.
    pub fn for_modulus_bits(bits: usize) -> Result<Self, CryptoError> {
        Self::new((bits + 7) >> 3)
    }

    /// Total block size in bytes.
    pub fn padded_size(&self) -> usize {
        self.padded_size
    }

    /// Largest payload that fits.
    pub fn max_data_size(&self) -> usize {
        self.padded_size - PADDING_OVERHEAD
    }

    /// Pad `data` into a full block.
    pub fn pad(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() > self.max_data_size() {
            return Err(CryptoError::DataTooLong {
                len: data.len(),
                max: self.max_data_size(),
            });
        }
        let fill = self.padded_size - 3 - data.len();
        let mut block = Vec::with_capacity(self.padded_size);
        block.extend_from_slice(&[0x00, 0x01]);
        block.resize(2 + fill, 0xFF);
        block.push(0x00);
        block.extend_from_slice(data);
        Ok(block)
    }

    /// Strip the padding from a full block and return the payload.
    pub fn unpad<'a>(&self, block: &'a [u8]) -> Result<&'a [u8], CryptoError> {
        if block.len() != self.padded_size {
            return Err(CryptoError::InvalidPadding);
        }
        let body = match block {
            [0x00, 0x01, body @ ..] => body,
            _ => return Err(CryptoError::InvalidPadding),
        };
        let fill = body.iter().take_while(|&&b| b == 0xFF).count();
        if fill < PADDING_OVERHEAD - 3 || body.get(fill) != Some(&0x00) {
            return Err(CryptoError::InvalidPadding);
        }
        Ok(&body[fill + 1..])
    }
}
