//! Delivery error types.

use thiserror::Error;

use crate::client::DeliveryOutcome;

/// Failure of a single sink call.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Connection, DNS or TLS failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The per-call timeout elapsed.
    #[error("Request timed out")]
    Timeout,

    /// The sink asked us to slow down.
    #[error("Throttled by sink: {0}")]
    Throttled(String),

    /// The sink failed internally (5xx).
    #[error("Sink server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// Credentials were missing, invalid or lacked permission.
    #[error("Sink rejected credentials: {status} - {message}")]
    Auth { status: u16, message: String },

    /// The sink refused the request itself (malformed payload, unknown stream).
    #[error("Sink rejected request: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// The sink answered with a body we could not read.
    #[error("Invalid sink response: {0}")]
    InvalidResponse(String),
}

impl SinkError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout | Self::Throttled(_) | Self::Server { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Result type alias using SinkError.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors surfaced by the delivery client.
///
/// Partial failures are never errors; they are counted in the outcome.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Invalid configuration or failed preflight.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The sink rejected our credentials while sending. `partial` accounts
    /// for every input record: chunks finished before the rejection keep
    /// their results, the rest are counted as failed.
    #[error(
        "Sink authentication failed after {} of {} records were delivered: {source}",
        .partial.delivered,
        .partial.total()
    )]
    Auth {
        #[source]
        source: SinkError,
        partial: Box<DeliveryOutcome>,
    },

    /// Every chunk exhausted its retries on transient failures.
    #[error("Sink unreachable: {records} records undelivered after {attempts} attempts per chunk: {last_error}")]
    Unreachable {
        records: usize,
        attempts: u32,
        #[source]
        last_error: SinkError,
    },
}

impl DeliveryError {
    /// Number of records the failed call was carrying, when known.
    pub fn undelivered_records(&self) -> Option<usize> {
        match self {
            Self::Unreachable { records, .. } => Some(*records),
            Self::Auth { partial, .. } => Some(partial.failed),
            _ => None,
        }
    }
}

/// Result type alias using DeliveryError.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SinkError::Timeout.is_transient());
        assert!(SinkError::Transport("reset".into()).is_transient());
        assert!(SinkError::Throttled("slow down".into()).is_transient());
        assert!(SinkError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());

        let auth = SinkError::Auth {
            status: 403,
            message: "denied".into(),
        };
        assert!(!auth.is_transient());
        assert!(auth.is_auth());
        assert!(!SinkError::Rejected {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
        assert!(!SinkError::InvalidResponse("eof".into()).is_transient());
    }

    #[test]
    fn unreachable_display_and_count() {
        let err = DeliveryError::Unreachable {
            records: 4,
            attempts: 3,
            last_error: SinkError::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "Sink unreachable: 4 records undelivered after 3 attempts per chunk: Request timed out"
        );
        assert_eq!(err.undelivered_records(), Some(4));
        assert_eq!(DeliveryError::Config("x".into()).undelivered_records(), None);
    }

    #[test]
    fn auth_error_reports_what_got_through() {
        let err = DeliveryError::Auth {
            source: SinkError::Auth {
                status: 401,
                message: "expired".into(),
            },
            partial: Box::new(DeliveryOutcome {
                delivered: 25,
                failed: 7,
                ..Default::default()
            }),
        };
        assert_eq!(
            err.to_string(),
            "Sink authentication failed after 25 of 32 records were delivered: \
             Sink rejected credentials: 401 - expired"
        );
        assert_eq!(err.undelivered_records(), Some(7));
    }
}
