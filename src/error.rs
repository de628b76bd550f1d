use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::wire::WireError;
use crate::Frame;

/// This enum contains all error messages this library can return. Most API
/// functions will generally return a [`Result<(), NetplayError>`].
///
/// Note that the everyday failure modes of the protocol — packet loss,
/// reordering, peer silence, a full pending-input window — are *not* errors:
/// they surface through events or through [`SendInputResult`] instead. This
/// type covers genuine misuse and environment failures.
///
/// [`Result<(), NetplayError>`]: std::result::Result
/// [`SendInputResult`]: crate::SendInputResult
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetplayError {
    /// You made an invalid request, usually by using wrong parameters for
    /// function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// The connection is not synchronized yet. Call `synchronize()` and wait
    /// a few ms to let the peers complete the handshake.
    NotSynchronized,
    /// An invalid frame number was provided. Frames must be non-negative and
    /// within valid ranges.
    InvalidFrame {
        /// The frame that was invalid.
        frame: Frame,
        /// A description of why the frame was invalid.
        reason: String,
    },
    /// Encoding or decoding a wire message failed.
    Wire(WireError),
    /// A network socket operation failed.
    SocketError {
        /// A description of the socket error.
        context: String,
    },
}

impl Display for NetplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetplayError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            }
            NetplayError::NotSynchronized => {
                write!(
                    f,
                    "The connection is not yet synchronized with the remote peer."
                )
            }
            NetplayError::InvalidFrame { frame, reason } => {
                write!(f, "Invalid frame {}: {}", frame, reason)
            }
            NetplayError::Wire(err) => {
                write!(f, "Wire codec error: {}", err)
            }
            NetplayError::SocketError { context } => {
                write!(f, "Socket error: {}", context)
            }
        }
    }
}

impl Error for NetplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NetplayError::Wire(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WireError> for NetplayError {
    fn from(err: WireError) -> Self {
        NetplayError::Wire(err)
    }
}

// #########
// # TESTS #
// #########
