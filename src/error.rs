use crate::conn::ConnId;
use std::fmt;
use std::io;
use std::result::Result as StdResult;

pub type Result<T> = StdResult<T, NetError>;

#[derive(Debug)]
pub enum NetError {
    /// Host/port could not be resolved to any socket address.
    AddressResolution(String),
    BindFailed(io::Error),
    ListenFailed(io::Error),
    /// A true connect failure, not "in progress".
    ConnectFailed(io::Error),
    /// Slot table growth failed; fatal to the operation that needed a slot.
    TableExhausted,
    /// Operation on an unknown or already-closed connection id.
    InvalidHandle(ConnId),
    /// Read or write syscall failure distinct from would-block.
    Io(io::Error),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::AddressResolution(host) => {
                write!(f, "Address Resolution Error: {}", host)
            }
            NetError::BindFailed(e) => write!(f, "Bind Error: {}", e),
            NetError::ListenFailed(e) => write!(f, "Listen Error: {}", e),
            NetError::ConnectFailed(e) => write!(f, "Connect Error: {}", e),
            NetError::TableExhausted => write!(f, "Connection table exhausted"),
            NetError::InvalidHandle(id) => write!(f, "Invalid connection id: {:?}", id),
            NetError::Io(e) => write!(f, "IO Error: {}", e),
        }
    }
}

impl std::error::Error for NetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetError::BindFailed(e)
            | NetError::ListenFailed(e)
            | NetError::ConnectFailed(e)
            | NetError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        NetError::Io(err)
    }
}
