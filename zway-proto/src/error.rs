//! Crate-wide error hierarchy, grouped exactly as the categories the relay
//! distinguishes: transport errors close the session, everything else is
//! converted into a `{status: 0, error: msg}` response and the session
//! stays open.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- Transport --------------------------------------------------
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
    #[error("peer disconnected")]
    Disconnected,
    #[error("transport I/O error: {0}")]
    TransportIo(#[from] std::io::Error),

    // --- Protocol -----------------------------------------------------
    #[error("malformed packet head")]
    MalformedHead,
    #[error("malformed request body: {0}")]
    MalformedRequestBody(String),
    #[error("unknown request type {0}")]
    UnknownRequestType(u32),

    // --- Auth -----------------------------------------------------------
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("already authenticated")]
    AlreadyAuthenticated,
    #[error("invalid credentials")]
    InvalidCredentials,

    // --- Validation -------------------------------------------------------
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("invalid name")]
    InvalidName,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid add code")]
    InvalidAddCode,

    // --- Store ------------------------------------------------------------
    #[error("store unavailable")]
    StoreUnavailable,
    #[error("store error: {0}")]
    StoreError(String),

    // --- Resource -----------------------------------------------------------
    #[error("duplicate resource")]
    Duplicate,
    #[error("not found")]
    NotFound,
}

impl Error {
    /// Transport errors terminate the session; every other kind leaves it
    /// open and is surfaced as a failed response instead.
    #[inline]
    pub fn closes_session(&self) -> bool {
        matches!(
            self,
            Error::TlsHandshakeFailed(_) | Error::Disconnected | Error::TransportIo(_)
        )
    }

    /// `Disconnected` (a clean peer close) and cancellation are not bugs and
    /// should not be logged as errors.
    #[inline]
    pub fn is_silent(&self) -> bool {
        matches!(self, Error::Disconnected)
    }

    /// Message sent back to the client in a failed response. Store errors
    /// are deliberately generic so internals never leak on the wire.
    pub fn client_message(&self) -> String {
        match self {
            Error::StoreUnavailable | Error::StoreError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
