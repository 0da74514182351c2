//! Error taxonomy shared by every layer of the stack (spec §7).
//!
//! Each variant corresponds to one row of the kind/origin table; callers at
//! the CLI boundary map a variant to a process exit code via [`Error::exit_code`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("no card in field")]
    NoCard,

    #[error("transport timed out")]
    TransportTimeout,

    #[error("malformed APDU: {0}")]
    ApduMalformed(String),

    #[error("APDU body or expected length overflows the encodable range")]
    LengthOverflow,

    #[error("unexpected chained response")]
    UnexpectedChainResponse,

    #[error("malformed TLV/ASN.1 data: {0}")]
    TlvMalformed(String),

    #[error("crypto operation failed: {0}")]
    Crypto(String),

    #[error("application identifier not present on card")]
    AidNotPresent,

    #[error("file not found: {0:04X}")]
    FileNotFound(u16),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("secure messaging MAC invalid")]
    MacInvalid,

    #[error("cryptogram invalid: {0}")]
    CryptogramInvalid(String),

    #[error("no live session; refusing to send an unprotected APDU")]
    NoSession,

    #[error("operation cancelled by user")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Process exit code per spec §6's CLI surface table.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => 1,
            Error::Transport(_) | Error::NoCard | Error::TransportTimeout => 2,
            Error::AuthFailed(_) | Error::NoSession => 3,
            Error::ApduMalformed(_)
            | Error::LengthOverflow
            | Error::UnexpectedChainResponse
            | Error::TlvMalformed(_)
            | Error::CryptogramInvalid(_) => 4,
            Error::Crypto(_) | Error::MacInvalid => 5,
            Error::AidNotPresent | Error::FileNotFound(_) => 7,
            Error::Cancelled => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
