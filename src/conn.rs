use crate::handler::Handler;
use socket2::Socket;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::error::{NetError, Result};

/// Stable integer handle identifying a connection slot for its lifetime.
///
/// Ids index the reactor's slot table. An id stays valid until the
/// connection is closed; after close the slot (and therefore the id) may be
/// handed out again by a later `listen`/`connect`/accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub(crate) usize);

impl ConnId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Exactly one of these per slot; `WriteBlocked` and line mode are
/// orthogonal flags on [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Available,
    Listening,
    Connecting,
    Connected,
}

/// One connection record, listening or peer. A vacant slot has
/// `state == Available` and no socket.
pub(crate) struct Connection {
    pub state: State,
    pub socket: Option<Socket>,
    /// Outbound buffer non-empty and POLLOUT armed.
    pub write_blocked: bool,
    pub line_mode: bool,
    pub local: Option<(String, u16)>,
    pub remote: Option<(String, u16)>,
    /// Bytes read but not yet delivered (line reassembly carry-over).
    pub inbound: Vec<u8>,
    /// Bytes accepted from the application but not yet flushed.
    pub outbound: Vec<u8>,
    /// Back-reference into the poll table for O(1) removal; rewritten
    /// whenever a swap-removal moves this connection's entry.
    pub poll_index: Option<usize>,
    pub handler: Option<Rc<dyn Handler>>,
    pub user_data: Option<Box<dyn Any>>,
}

impl Connection {
    pub fn vacant() -> Self {
        Connection {
            state: State::Available,
            socket: None,
            write_blocked: false,
            line_mode: false,
            local: None,
            remote: None,
            inbound: Vec::new(),
            outbound: Vec::new(),
            poll_index: None,
            handler: None,
            user_data: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state != State::Available
    }

    /// Return the slot to the available pool, releasing buffers, endpoint
    /// strings, handler, and user data.
    pub fn reset(&mut self) {
        *self = Connection::vacant();
    }
}

/// Hard ceiling so the table length always fits the poll syscall's count.
const MAX_SLOTS: usize = i32::MAX as usize;

/// Growable array of connection records indexed by [`ConnId`]. Never
/// shrinks; grows by `capacity/3 + 16` so the available fraction stays
/// bounded without doubling memory for modest connection counts.
pub(crate) struct SlotTable {
    slots: Vec<Connection>,
}

impl SlotTable {
    pub fn new(initial: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(initial, Connection::vacant);
        SlotTable { slots }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn grow(&mut self) -> Result<()> {
        let add = self.slots.len() / 3 + 16;
        let target = self.slots.len().saturating_add(add);
        if target > MAX_SLOTS {
            return Err(NetError::TableExhausted);
        }
        log::debug!("slot table growing {} -> {}", self.slots.len(), target);
        self.slots.resize_with(target, Connection::vacant);
        Ok(())
    }

    /// Find a vacant slot, growing the table once if none remain. The slot
    /// is returned untouched; the caller transitions its state.
    pub fn allocate(&mut self) -> Result<ConnId> {
        if let Some(i) = self.slots.iter().position(|s| !s.is_live()) {
            return Ok(ConnId(i));
        }
        let start = self.slots.len();
        self.grow()?;
        Ok(ConnId(start))
    }

    /// Tick-boundary growth check: guarantee at least one vacant slot so an
    /// accept drain cannot run out mid-tick.
    pub fn ensure_headroom(&mut self) -> Result<()> {
        if self.slots.iter().any(|s| !s.is_live()) {
            return Ok(());
        }
        self.grow()
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.slots.get(id.0).filter(|s| s.is_live())
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.slots.get_mut(id.0).filter(|s| s.is_live())
    }

    /// Slot access without the liveness filter, for teardown paths.
    pub fn raw_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.slots.get_mut(id.0)
    }
}

/// Split off every delimiter-terminated line from `buf`, leaving any
/// trailing partial line buffered. Runs of CR/LF count as one delimiter and
/// empty lines are dropped, so `"a\r\n\r\nb\n"` yields `a`, `b`.
pub(crate) fn split_lines(buf: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let end = match buf.iter().rposition(|&b| b == b'\r' || b == b'\n') {
        Some(i) => i + 1,
        None => return Vec::new(),
    };
    let mut lines = Vec::new();
    for piece in buf[..end].split(|&b| b == b'\r' || b == b'\n') {
        if !piece.is_empty() {
            lines.push(piece.to_vec());
        }
    }
    buf.drain(..end);
    lines
}
