use socket2::Socket;
use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

pub(crate) const EV_READ: libc::c_short = libc::POLLIN;
pub(crate) const EV_WRITE: libc::c_short = libc::POLLOUT;
pub(crate) const EV_HANGUP: libc::c_short = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;

/// Dense table of `(descriptor, interest)` pairs handed to `poll(2)` each
/// tick, paired by position with the owning slot id.
///
/// Positions are not stable: removal swaps the last entry into the freed
/// spot, which keeps the table dense and removal O(1) at the cost of
/// arbitrary dispatch order. The owning connection caches its position and
/// must rewrite it after every swap.
pub(crate) struct PollTable {
    fds: Vec<libc::pollfd>,
    ids: Vec<usize>,
}

impl PollTable {
    pub fn new() -> Self {
        PollTable {
            fds: Vec::new(),
            ids: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    /// Register a descriptor with its initial interest. The descriptor is
    /// put into non-blocking mode as part of the same call, so a registered
    /// connection is never left blocking.
    pub fn register(&mut self, socket: &Socket, events: libc::c_short, sid: usize) -> io::Result<usize> {
        socket.set_nonblocking(true)?;
        self.fds.push(libc::pollfd {
            fd: socket.as_raw_fd(),
            events,
            revents: 0,
        });
        self.ids.push(sid);
        Ok(self.fds.len() - 1)
    }

    /// Swap-remove the entry at `index`. Returns the slot id of the entry
    /// that was moved into `index` (its cached position must be rewritten),
    /// or `None` when the removed entry was already last.
    pub fn deregister(&mut self, index: usize) -> Option<usize> {
        self.fds.swap_remove(index);
        self.ids.swap_remove(index);
        self.ids.get(index).copied()
    }

    pub fn slot_at(&self, index: usize) -> Option<usize> {
        self.ids.get(index).copied()
    }

    #[cfg(test)]
    pub fn events(&self, index: usize) -> libc::c_short {
        self.fds[index].events
    }

    pub fn revents(&self, index: usize) -> libc::c_short {
        self.fds[index].revents
    }

    pub fn add_events(&mut self, index: usize, mask: libc::c_short) {
        self.fds[index].events |= mask;
    }

    pub fn clear_events(&mut self, index: usize, mask: libc::c_short) {
        self.fds[index].events &= !mask;
    }

    /// One call into the readiness primitive. `None` blocks indefinitely.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout_ms: libc::c_int = match timeout {
            Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };
        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}
