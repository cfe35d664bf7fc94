//! Fetch errors: transport failures and the terminal error returned to callers.

use std::error::Error as _;
use std::fmt;
use thiserror::Error;

/// Class of a transport failure. Decides whether another attempt is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Request timed out.
    Timeout,
    /// Could not connect (DNS, refused, TLS handshake).
    Connect,
    /// Connection failed while sending the request.
    Request,
    /// Connection failed while reading the response body.
    Body,
    /// The request could not be built or followed (bad URL, unsupported scheme, redirect loop).
    Invalid,
}

impl TransportErrorKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, TransportErrorKind::Invalid)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Timeout => "timed out",
            TransportErrorKind::Connect => "connection failed",
            TransportErrorKind::Request => "request failed",
            TransportErrorKind::Body => "failed to read response body",
            TransportErrorKind::Invalid => "invalid request",
        };
        f.write_str(s)
    }
}

/// A GET that produced no HTTP response.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a reqwest error and flatten its cause chain into the message.
    pub(crate) fn from_reqwest(e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else if e.is_body() || e.is_decode() {
            TransportErrorKind::Body
        } else if e.is_builder() || e.is_redirect() {
            TransportErrorKind::Invalid
        } else {
            TransportErrorKind::Request
        };
        let mut message = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(kind, message)
    }
}

/// Terminal failure of one logical fetch: a non-retryable outcome, or attempts exhausted.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} when fetching {url} (attempt {attempts})")]
    HttpStatus { url: String, status: u16, attempts: u32 },

    #[error("Network error: could not fetch {url} (attempt {attempts}): {source}")]
    Network {
        url: String,
        attempts: u32,
        source: TransportError,
    },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::HttpStatus { url, .. } | FetchError::Network { url, .. } => url,
        }
    }

    /// Number of GETs issued before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::HttpStatus { attempts, .. } | FetchError::Network { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Final HTTP status, if the last attempt got a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            FetchError::Network { .. } => None,
        }
    }
}
