//! # Signature Engine Errors
//!
//! Token result codes and the engine's error taxonomy.

use shared_crypto::CryptoError;
use std::fmt;
use thiserror::Error;

/// Result code reported by a token primitive (`CKR_*`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// CKR_GENERAL_ERROR
    GeneralError,
    /// CKR_FUNCTION_FAILED
    FunctionFailed,
    /// CKR_DATA_LEN_RANGE
    DataLenRange,
    /// CKR_DEVICE_ERROR
    DeviceError,
    /// CKR_KEY_HANDLE_INVALID
    KeyHandleInvalid,
    /// CKR_KEY_SIZE_RANGE
    KeySizeRange,
    /// CKR_KEY_TYPE_INCONSISTENT
    KeyTypeInconsistent,
    /// CKR_KEY_FUNCTION_NOT_PERMITTED
    KeyFunctionNotPermitted,
    /// CKR_MECHANISM_INVALID
    MechanismInvalid,
    /// CKR_OPERATION_ACTIVE
    OperationActive,
    /// CKR_OPERATION_NOT_INITIALIZED
    OperationNotInitialized,
    /// CKR_SESSION_COUNT
    SessionCount,
    /// CKR_SESSION_HANDLE_INVALID
    SessionHandleInvalid,
    /// CKR_SIGNATURE_INVALID
    SignatureInvalid,
    /// CKR_SIGNATURE_LEN_RANGE
    SignatureLenRange,
    /// Any other (possibly vendor-defined) code
    Other(u64),
}

impl ReturnCode {
    /// Numeric `CKR_*` value.
    pub fn code(&self) -> u64 {
        match self {
            Self::GeneralError => 0x05,
            Self::FunctionFailed => 0x06,
            Self::DataLenRange => 0x21,
            Self::DeviceError => 0x30,
            Self::KeyHandleInvalid => 0x60,
            Self::KeySizeRange => 0x62,
            Self::KeyTypeInconsistent => 0x63,
            Self::KeyFunctionNotPermitted => 0x68,
            Self::MechanismInvalid => 0x70,
            Self::OperationActive => 0x90,
            Self::OperationNotInitialized => 0x91,
            Self::SessionCount => 0xB1,
            Self::SessionHandleInvalid => 0xB3,
            Self::SignatureInvalid => 0xC0,
            Self::SignatureLenRange => 0xC1,
            Self::Other(code) => *code,
        }
    }

    /// Map a numeric `CKR_*` value onto a known code where possible.
    pub fn from_code(code: u64) -> Self {
        match code {
            0x05 => Self::GeneralError,
            0x06 => Self::FunctionFailed,
            0x21 => Self::DataLenRange,
            0x30 => Self::DeviceError,
            0x60 => Self::KeyHandleInvalid,
            0x62 => Self::KeySizeRange,
            0x63 => Self::KeyTypeInconsistent,
            0x68 => Self::KeyFunctionNotPermitted,
            0x70 => Self::MechanismInvalid,
            0x90 => Self::OperationActive,
            0x91 => Self::OperationNotInitialized,
            0xB1 => Self::SessionCount,
            0xB3 => Self::SessionHandleInvalid,
            0xC0 => Self::SignatureInvalid,
            0xC1 => Self::SignatureLenRange,
            other => Self::Other(other),
        }
    }

    /// Codes that mean "this signature does not verify" rather than a
    /// token fault.
    ///
    /// Some tokens report a mismatching signature as a data length error,
    /// so `DataLenRange` is included.
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(
            self,
            Self::SignatureInvalid | Self::SignatureLenRange | Self::DataLenRange
        )
    }

    /// Codes that reject the key rather than the operation.
    pub fn is_key_rejection(&self) -> bool {
        matches!(
            self,
            Self::KeyHandleInvalid
                | Self::KeySizeRange
                | Self::KeyTypeInconsistent
                | Self::KeyFunctionNotPermitted
        )
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "CKR 0x{code:08X}"),
            known => write!(f, "{known:?} (0x{:08X})", known.code()),
        }
    }
}

/// Failure of a single token primitive.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("token returned {code}")]
pub struct TokenError {
    /// Result code reported by the token
    pub code: ReturnCode,
}

impl TokenError {
    /// Wrap a result code.
    pub fn new(code: ReturnCode) -> Self {
        Self { code }
    }
}

impl From<ReturnCode> for TokenError {
    fn from(code: ReturnCode) -> Self {
        Self::new(code)
    }
}

/// Malformed DER on a signature handed to `verify`.
///
/// Never surfaces to callers: verification reports it as `false`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureFormatError {
    /// Not a SEQUENCE of exactly two non-negative INTEGERs
    #[error("Invalid signature encoding: {0}")]
    Der(#[from] der::Error),

    /// r or s does not fit the fixed field width
    #[error("Signature component is {len} bytes, field width is {width}")]
    ComponentTooLarge {
        /// Length of the component magnitude
        len: usize,
        /// Fixed field width
        width: usize,
    },
}

/// Errors surfaced by the signature engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Algorithm name / mechanism pair not supported (construction only)
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key rejected; the engine is left uninitialized
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No token session could be obtained; retry later
    #[error("Token sessions exhausted: {0}")]
    ResourceExhausted(String),

    /// Caller-supplied data violates the algorithm's length contract
    #[error("Invalid signature data: {0}")]
    InvalidSignatureData(String),

    /// Token primitive failed
    #[error("Token failure during {operation}: {source}")]
    ProviderFailure {
        /// Primitive that failed
        operation: &'static str,
        /// Underlying token error
        #[source]
        source: TokenError,
    },

    /// Token produced a signature block the codec cannot split into r and s
    #[error("Token returned a malformed signature: {0}")]
    MalformedTokenSignature(String),

    /// Local encoding step failed
    #[error("Signature encoding failed: {0}")]
    Encoding(#[from] CryptoError),

    /// Operation invoked in a state that does not allow it
    #[error("Invalid engine state: {0}")]
    InvalidState(&'static str),
}

impl EngineError {
    /// Wrap a token error raised by `operation`.
    pub fn provider(operation: &'static str, source: TokenError) -> Self {
        Self::ProviderFailure { operation, source }
    }

    /// True for failures a caller may retry after backing off.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_mismatch_codes() {
        assert!(ReturnCode::SignatureInvalid.is_signature_mismatch());
        assert!(ReturnCode::SignatureLenRange.is_signature_mismatch());
        assert!(ReturnCode::DataLenRange.is_signature_mismatch());
        assert!(!ReturnCode::DeviceError.is_signature_mismatch());
        assert!(ReturnCode::from_code(0xC1).is_signature_mismatch());
    }

    #[test]
    fn test_code_round_trip_for_known_values() {
        for code in [0x05, 0x21, 0x63, 0x91, 0xB1, 0xC0] {
            assert_eq!(ReturnCode::from_code(code).code(), code);
        }
        assert_eq!(ReturnCode::from_code(0x8000_0000), ReturnCode::Other(0x8000_0000));
    }

    #[test]
    fn test_provider_failure_keeps_code() {
        let err = EngineError::provider("C_SignFinal", ReturnCode::DeviceError.into());
        match &err {
            EngineError::ProviderFailure { source, .. } => {
                assert_eq!(source.code.code(), 0x30)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("C_SignFinal"));
        assert!(!err.is_transient());
    }
}
