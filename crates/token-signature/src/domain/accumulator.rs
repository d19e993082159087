//! # Update Accumulator
//!
//! Holds whatever `update` produced between init and finish, in one of
//! three shapes fixed by the processing type.
//!
//! Raw buffers never fail on `update`. Bytes past capacity set a sticky
//! overflow flag and are dropped; the length contract is checked at finish.

use super::algorithm::{ProcessingType, RawInput};
use super::errors::EngineError;
use shared_crypto::MessageDigest;
use zeroize::Zeroizing;

/// Per-operation input state.
#[derive(Debug)]
pub enum Accumulator {
    /// Running local digest
    Digest {
        /// Digest state
        md: MessageDigest,
        /// Bytes hashed so far
        processed: usize,
    },
    /// Bytes already forwarded to the token
    Stream {
        /// Bytes forwarded so far
        processed: usize,
    },
    /// Fixed-capacity raw block
    Raw {
        /// Buffered input, at most `rule.capacity()` bytes
        buffer: Zeroizing<Vec<u8>>,
        /// Length contract checked at finish
        rule: RawInput,
        /// Set once input exceeded capacity; cleared only by `reset`
        overflow: bool,
    },
}

impl Accumulator {
    /// Empty accumulator for `processing`.
    pub fn new(processing: ProcessingType) -> Self {
        match processing {
            ProcessingType::DigestLocal(algorithm) => Accumulator::Digest {
                md: MessageDigest::new(algorithm),
                processed: 0,
            },
            ProcessingType::StreamToBackend => Accumulator::Stream { processed: 0 },
            ProcessingType::RawFixedBlock(rule) => Accumulator::Raw {
                buffer: Zeroizing::new(Vec::with_capacity(rule.capacity())),
                rule,
                overflow: false,
            },
        }
    }

    /// Discard all input.
    pub fn reset(&mut self) {
        match self {
            Accumulator::Digest { md, processed } => {
                md.reset();
                *processed = 0;
            }
            Accumulator::Stream { processed } => *processed = 0,
            Accumulator::Raw {
                buffer, overflow, ..
            } => {
                // Vec::clear keeps the old bytes in the allocation
                buffer.iter_mut().for_each(|b| *b = 0);
                buffer.clear();
                *overflow = false;
            }
        }
    }

    /// Absorb `data` locally. Streaming accumulators only count it; the
    /// engine forwards the bytes itself.
    pub fn absorb(&mut self, data: &[u8]) {
        match self {
            Accumulator::Digest { md, processed } => {
                md.update(data);
                *processed += data.len();
            }
            Accumulator::Stream { processed } => *processed += data.len(),
            Accumulator::Raw {
                buffer,
                rule,
                overflow,
            } => {
                if *overflow {
                    return;
                }
                if buffer.len() + data.len() > rule.capacity() {
                    *overflow = true;
                    return;
                }
                buffer.extend_from_slice(data);
            }
        }
    }

    /// Bytes accepted since the last reset.
    pub fn processed(&self) -> usize {
        match self {
            Accumulator::Digest { processed, .. } | Accumulator::Stream { processed } => {
                *processed
            }
            Accumulator::Raw { buffer, .. } => buffer.len(),
        }
    }

    /// True once raw input exceeded capacity.
    pub fn overflowed(&self) -> bool {
        matches!(self, Accumulator::Raw { overflow: true, .. })
    }

    /// Finish the local digest and reset it.
    ///
    /// # Errors
    /// `InvalidState` if this is not a digesting accumulator.
    pub fn finish_digest(&mut self) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        match self {
            Accumulator::Digest { md, processed } => {
                *processed = 0;
                Ok(md.finalize_reset())
            }
            _ => Err(EngineError::InvalidState("no local digest in progress")),
        }
    }

    /// The buffered raw block, checked against its length contract.
    ///
    /// # Errors
    /// `InvalidSignatureData` on overflow or a length mismatch;
    /// `InvalidState` if this is not a raw accumulator.
    pub fn raw_input(&self) -> Result<&[u8], EngineError> {
        let Accumulator::Raw {
            buffer,
            rule,
            overflow,
        } = self
        else {
            return Err(EngineError::InvalidState("no raw input buffer"));
        };
        match *rule {
            RawInput::Exact(len) if *overflow || buffer.len() != len => {
                Err(EngineError::InvalidSignatureData(format!(
                    "Data for RawDSA must be exactly {len} bytes long"
                )))
            }
            RawInput::AtMost(max) if *overflow => Err(EngineError::InvalidSignatureData(
                format!("Data for NONEwithECDSA must be at most {max} bytes long"),
            )),
            _ => Ok(buffer.as_slice()),
        }
    }

    /// Input a cancelling finish can hand to the token, if any.
    ///
    /// Takes the local digest, or the raw block zero-filled to its exact
    /// length. `None` when nothing usable was accumulated.
    pub fn cancel_input(&mut self) -> Option<Zeroizing<Vec<u8>>> {
        match self {
            Accumulator::Digest { md, processed } => {
                *processed = 0;
                Some(md.finalize_reset())
            }
            Accumulator::Stream { .. } => None,
            Accumulator::Raw {
                buffer,
                rule,
                overflow,
            } => {
                if *overflow || buffer.is_empty() {
                    return None;
                }
                let mut block = Zeroizing::new(buffer.to_vec());
                if let RawInput::Exact(len) = *rule {
                    block.resize(len, 0);
                }
                Some(block)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::{digest, DigestAlgorithm};

    fn raw_dsa() -> Accumulator {
        Accumulator::new(ProcessingType::RawFixedBlock(RawInput::Exact(20)))
    }

    #[test]
    fn test_digest_accumulates_across_updates() {
        let mut acc = Accumulator::new(ProcessingType::DigestLocal(DigestAlgorithm::Sha256));
        acc.absorb(b"hello ");
        acc.absorb(b"world");
        assert_eq!(acc.processed(), 11);
        let out = acc.finish_digest().unwrap();
        assert_eq!(*out, *digest(DigestAlgorithm::Sha256, b"hello world"));
        assert_eq!(acc.processed(), 0);
    }

    #[test]
    fn test_raw_exact_length() {
        let mut acc = raw_dsa();
        acc.absorb(&[1u8; 12]);
        acc.absorb(&[2u8; 8]);
        assert_eq!(acc.raw_input().unwrap().len(), 20);

        let mut short = raw_dsa();
        short.absorb(&[1u8; 19]);
        assert!(matches!(
            short.raw_input(),
            Err(EngineError::InvalidSignatureData(_))
        ));
    }

    #[test]
    fn test_raw_overflow_is_sticky() {
        let mut acc = raw_dsa();
        acc.absorb(&[1u8; 21]);
        assert!(acc.overflowed());
        // further small updates are dropped, not appended
        acc.absorb(&[1u8; 1]);
        assert_eq!(acc.processed(), 0);
        assert!(acc.raw_input().is_err());

        acc.reset();
        assert!(!acc.overflowed());
        acc.absorb(&[3u8; 20]);
        assert!(acc.raw_input().is_ok());
    }

    #[test]
    fn test_raw_ecdsa_bound() {
        let mut acc = Accumulator::new(ProcessingType::RawFixedBlock(RawInput::AtMost(128)));
        acc.absorb(&[0u8; 128]);
        assert!(acc.raw_input().is_ok());
        acc.absorb(&[0u8; 1]);
        assert!(matches!(
            acc.raw_input(),
            Err(EngineError::InvalidSignatureData(_))
        ));
    }

    #[test]
    fn test_cancel_input() {
        let mut stream = Accumulator::new(ProcessingType::StreamToBackend);
        stream.absorb(b"abc");
        assert!(stream.cancel_input().is_none());

        let mut empty = raw_dsa();
        assert!(empty.cancel_input().is_none());

        let mut partial = raw_dsa();
        partial.absorb(&[9u8; 5]);
        let block = partial.cancel_input().unwrap();
        assert_eq!(block.len(), 20);
        assert_eq!(&block[..5], &[9u8; 5]);

        let mut md = Accumulator::new(ProcessingType::DigestLocal(DigestAlgorithm::Sha1));
        assert_eq!(md.cancel_input().unwrap().len(), 20);
    }
}
