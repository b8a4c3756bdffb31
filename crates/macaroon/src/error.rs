use thiserror::Error;

/// Failures that can occur while minting, binding or verifying a [`crate::Macaroon`].
#[derive(Debug, Error)]
pub enum MacaroonError {
    #[error("macaroon has no identifier")]
    EmptyIdentifier,

    #[error("third-party caveat sealed for a different public key")]
    WrongRecipient,

    #[error("failed to seal third-party caveat payload")]
    Seal,

    #[error("failed to open third-party caveat payload")]
    Open,

    #[error("malformed verification id")]
    MalformedVerificationId,

    #[error("could not serialize macaroon")]
    Serialize(#[from] serde_json::Error),
}

/// Why a [`crate::Macaroon::verify`] call rejected a token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("root signature mismatch")]
    SignatureMismatch,

    #[error("first-party caveat rejected: {0:?}")]
    CaveatRejected(String),

    #[error("no discharge macaroon presented for caveat id {0:?}")]
    DischargeNotFound(String),

    #[error("discharge macaroon {0:?} is not bound to this root")]
    NotBound(String),

    #[error("discharge macaroon {0:?} was presented more than once")]
    DuplicateDischarge(String),
}
