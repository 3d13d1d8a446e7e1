use thiserror::Error;

/// The error taxonomy of the signaling protocol handler.
///
/// Every variant maps to exactly one `{error: string}` ack payload; the
/// `Display` impl *is* the wire message, so wording changes here are wire
/// changes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("session has not joined a room")]
    NotJoined,

    #[error("session has already joined a room")]
    AlreadyJoined,

    #[error("client id {0} is already connected")]
    DuplicateClientId(String),

    #[error("{0} transport already exists for this session")]
    TransportAlreadyExists(&'static str),

    #[error("transport not found")]
    TransportNotFound,

    #[error("transport does not belong to this session")]
    TransportNotOwned,

    #[error("transport is not connected")]
    TransportNotConnected,

    #[error("transport is closed")]
    TransportClosed,

    #[error("wrong transport direction: expected {expected}")]
    WrongDirection { expected: &'static str },

    #[error("producer not found")]
    ProducerNotFound,

    #[error("producer is closed")]
    ProducerClosed,

    #[error("consumer not found")]
    ConsumerNotFound,

    #[error("cannot consume producer with given rtp capabilities")]
    CannotConsume,

    #[error("missing client rtp capabilities")]
    MissingRtpCapabilities,

    #[error("request timed out")]
    Timeout,

    #[error("internal error")]
    Internal,
}

impl SignalError {
    /// Render as the payload placed under the ack's `error` field.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<anyhow::Error> for SignalError {
    fn from(err: anyhow::Error) -> Self {
        log::error!("unexpected error in signaling handler: {:#}", err);
        SignalError::Internal
    }
}

impl From<mediasoup::worker::RequestError> for SignalError {
    fn from(err: mediasoup::worker::RequestError) -> Self {
        log::error!("mediasoup request error: {:#}", err);
        SignalError::Internal
    }
}

impl From<crate::registry::ReadyTransportError> for SignalError {
    fn from(err: crate::registry::ReadyTransportError) -> Self {
        match err {
            crate::registry::ReadyTransportError::NotFound => SignalError::TransportNotFound,
            crate::registry::ReadyTransportError::NotOwned => SignalError::TransportNotOwned,
            crate::registry::ReadyTransportError::WrongDirection => SignalError::WrongDirection {
                expected: "the other direction",
            },
            crate::registry::ReadyTransportError::NotConnected => SignalError::TransportNotConnected,
        }
    }
}
