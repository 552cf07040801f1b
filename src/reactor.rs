use log::{debug, trace, warn};
use socket2::{Socket, Type};
use std::any::Any;
use std::fmt;
use std::io::{self, Read};
use std::rc::Rc;
use std::time::Duration;

use crate::config::ReactorConfig;
use crate::conn::{split_lines, ConnId, SlotTable, State};
use crate::error::{NetError, Result};
use crate::handler::Handler;
use crate::poll::{PollTable, EV_HANGUP, EV_READ, EV_WRITE};
use crate::resolve::{domain_of, resolve_bind, resolve_remote};

/// The owning reactor context: connection slot table, readiness poll table,
/// and the re-entrancy guard, all behind one value. Multiple independent
/// reactors may coexist; all state is touched only from [`tick`] and from
/// handler callbacks it invokes synchronously.
///
/// [`tick`]: Reactor::tick
pub struct Reactor {
    slots: SlotTable,
    poll: PollTable,
    config: ReactorConfig,
    in_tick: bool,
}

impl Reactor {
    pub fn new() -> Self {
        Self::with_config(ReactorConfig::default())
    }

    pub fn with_config(config: ReactorConfig) -> Self {
        Reactor {
            slots: SlotTable::new(config.initial_slots),
            poll: PollTable::new(),
            config,
            in_tick: false,
        }
    }

    /// Bind `host:port` and start listening. An empty host binds to all
    /// interfaces. Failure at any step releases the partially created
    /// socket; nothing stays registered.
    pub fn listen(&mut self, host: &str, port: u16) -> Result<ConnId> {
        let addr = resolve_bind(host, port)?;
        let id = self.slots.allocate()?;

        let socket =
            Socket::new(domain_of(&addr), Type::STREAM, None).map_err(NetError::ListenFailed)?;
        socket
            .set_reuse_address(true)
            .map_err(NetError::ListenFailed)?;
        socket.bind(&addr.into()).map_err(NetError::BindFailed)?;
        socket
            .listen(self.config.listen_backlog)
            .map_err(NetError::ListenFailed)?;
        let index = self
            .poll
            .register(&socket, EV_READ | EV_HANGUP, id.0)
            .map_err(NetError::ListenFailed)?;

        let local = socket
            .local_addr()
            .ok()
            .and_then(|a| a.as_socket())
            .map(|a| (a.ip().to_string(), a.port()));

        let slot = self.slots.raw_mut(id).expect("allocated slot");
        slot.state = State::Listening;
        slot.socket = Some(socket);
        slot.poll_index = Some(index);
        slot.local = local;

        debug!("listening on {}:{} as {}", host, port, id);
        Ok(id)
    }

    /// Start a non-blocking connect to `rhost:rport`, optionally binding
    /// `local` first to pin the source address. "In progress" is not an
    /// error: the connection is registered for both input and output
    /// readiness and completed later by [`tick`](Reactor::tick).
    pub fn connect(
        &mut self,
        rhost: &str,
        rport: u16,
        local: Option<(&str, u16)>,
    ) -> Result<ConnId> {
        let id = self.slots.allocate()?;

        let mut family_hint = None;
        let mut local_ep = None;
        let bound = match local {
            Some((lhost, lport)) => {
                let laddr = resolve_bind(lhost, lport)?;
                let socket = Socket::new(domain_of(&laddr), Type::STREAM, None)
                    .map_err(NetError::ConnectFailed)?;
                socket.bind(&laddr.into()).map_err(NetError::BindFailed)?;
                // Family of the bound socket hints remote resolution;
                // failure to determine it means no hint.
                if let Some(a) = socket.local_addr().ok().and_then(|a| a.as_socket()) {
                    family_hint = Some(domain_of(&a));
                    local_ep = Some((a.ip().to_string(), a.port()));
                }
                Some(socket)
            }
            None => None,
        };

        let raddr = resolve_remote(rhost, rport, family_hint)?;
        let socket = match bound {
            Some(s) => s,
            None => Socket::new(domain_of(&raddr), Type::STREAM, None)
                .map_err(NetError::ConnectFailed)?,
        };
        if self.config.no_delay {
            let _ = socket.set_nodelay(true);
        }
        socket.set_nonblocking(true).map_err(NetError::ConnectFailed)?;

        match socket.connect(&raddr.into()) {
            Ok(()) => {}
            Err(e)
                if e.raw_os_error() == Some(libc::EINPROGRESS)
                    || e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(NetError::ConnectFailed(e)),
        }

        let index = self
            .poll
            .register(&socket, EV_READ | EV_WRITE | EV_HANGUP, id.0)
            .map_err(NetError::ConnectFailed)?;

        let slot = self.slots.raw_mut(id).expect("allocated slot");
        slot.state = State::Connecting;
        slot.socket = Some(socket);
        slot.poll_index = Some(index);
        slot.remote = Some((rhost.to_string(), rport));
        slot.local = local_ep;

        debug!("connecting to {}:{} as {}", rhost, rport, id);
        Ok(id)
    }

    /// The single destruction path. Deregisters from the poll table
    /// (compacting it), closes the descriptor, invokes `on_close` exactly
    /// once, and returns the slot to the available pool. Idempotent:
    /// closing an unknown or already-closed id reports `InvalidHandle`.
    pub fn close(&mut self, id: ConnId) -> Result<()> {
        if self.slots.get(id).is_none() {
            return Err(NetError::InvalidHandle(id));
        }
        let slot = self.slots.raw_mut(id).expect("live slot");
        let handler = slot.handler.take();
        let socket = slot.socket.take();
        let index = slot.poll_index.take();
        slot.reset();

        if let Some(index) = index {
            if let Some(moved) = self.poll.deregister(index) {
                if let Some(moved_slot) = self.slots.raw_mut(ConnId(moved)) {
                    moved_slot.poll_index = Some(index);
                }
            }
        }
        drop(socket);
        debug!("closed {}", id);

        if let Some(h) = handler {
            h.on_close(self, id);
        }
        Ok(())
    }

    /// One reactor step: poll every registered descriptor once with the
    /// given timeout (`None` blocks indefinitely), then dispatch exactly
    /// the ready entries. Returns the ready-descriptor count.
    ///
    /// Re-entrant calls from inside a handler are no-ops returning
    /// `Ok(0)`: nested ticks would grow the call stack without bound and
    /// double-dispatch readiness.
    pub fn tick(&mut self, timeout: Option<Duration>) -> Result<usize> {
        if self.in_tick {
            return Ok(0);
        }
        // Drop guard so the flag is restored even if a handler panics and
        // the embedder catches the unwind.
        struct TickGuard<'a> {
            reactor: &'a mut Reactor,
        }
        impl Drop for TickGuard<'_> {
            fn drop(&mut self) {
                self.reactor.in_tick = false;
            }
        }
        self.in_tick = true;
        let mut guard = TickGuard { reactor: self };
        guard.reactor.tick_inner(timeout)
    }

    fn tick_inner(&mut self, timeout: Option<Duration>) -> Result<usize> {
        self.slots.ensure_headroom()?;

        let ready = self.poll.poll(timeout).map_err(NetError::Io)?;
        if ready == 0 {
            return Ok(0);
        }
        trace!("tick: {} ready of {}", ready, self.poll.len());

        let mut i = 0;
        while i < self.poll.len() {
            let revents = self.poll.revents(i);
            if revents == 0 {
                i += 1;
                continue;
            }
            let sid = ConnId(self.poll.slot_at(i).expect("dense table"));
            let has_handler = self
                .slots
                .get(sid)
                .map(|s| s.handler.is_some())
                .unwrap_or(false);
            if !has_handler {
                // Polled but never dispatched until a handler is attached.
                i += 1;
                continue;
            }

            if revents & EV_HANGUP != 0 {
                self.stream_ended(sid, None);
                // Removal swapped an unvisited entry into `i`.
                continue;
            }

            if revents & EV_READ != 0 {
                let listening = self
                    .slots
                    .get(sid)
                    .map(|s| s.state == State::Listening)
                    .unwrap_or(false);
                if listening {
                    self.drain_accept(sid);
                } else {
                    self.drain_read(sid);
                }
                if !self.entry_owned(i, sid, revents) {
                    continue;
                }
            }

            if revents & EV_WRITE != 0 {
                self.poll.clear_events(i, EV_WRITE);

                let connecting = self
                    .slots
                    .get(sid)
                    .map(|s| s.state == State::Connecting)
                    .unwrap_or(false);
                if connecting {
                    if let Some(slot) = self.slots.get_mut(sid) {
                        slot.state = State::Connected;
                    }
                    let handler = self.slots.get(sid).and_then(|s| s.handler.clone());
                    if let Some(h) = handler {
                        h.on_connect(self, sid);
                    }
                    if !self.entry_owned(i, sid, revents) {
                        continue;
                    }
                }

                // Re-attempt whenever bytes wait: a blocked write, or bytes
                // buffered while the connect was still in flight.
                let blocked = self
                    .slots
                    .get(sid)
                    .map(|s| s.write_blocked || !s.outbound.is_empty())
                    .unwrap_or(false);
                if blocked {
                    if let Some(slot) = self.slots.get_mut(sid) {
                        slot.write_blocked = false;
                    }
                    // Fatal flush errors route through the eof path inside.
                    let _ = self.flush_outbound(sid);
                    if !self.entry_owned(i, sid, revents) {
                        continue;
                    }
                }
            }

            i += 1;
        }
        Ok(ready)
    }

    /// Does poll position `i` still describe the entry we dispatched? A
    /// close during dispatch compacts the table; a freshly registered
    /// entry lands with zero revents, so the pair (slot id, revents)
    /// identifies the original entry.
    fn entry_owned(&self, i: usize, sid: ConnId, revents: libc::c_short) -> bool {
        i < self.poll.len()
            && self.poll.slot_at(i) == Some(sid.0)
            && self.poll.revents(i) == revents
    }

    /// Drain a ready listener: accept until the call would block, handing
    /// each accepted peer a fresh Connected slot and invoking the
    /// listener's `on_new_client` once per accept.
    fn drain_accept(&mut self, sid: ConnId) {
        loop {
            let accepted = {
                let slot = match self.slots.get(sid) {
                    Some(s) => s,
                    None => return,
                };
                slot.socket.as_ref().expect("listening socket").accept()
            };
            match accepted {
                Ok((sock, peer)) => {
                    if self.config.no_delay {
                        let _ = sock.set_nodelay(true);
                    }
                    let new_id = match self.slots.allocate() {
                        Ok(id) => id,
                        Err(e) => {
                            warn!("accept aborted, no slot: {}", e);
                            return;
                        }
                    };
                    let index = match self.poll.register(&sock, EV_READ | EV_HANGUP, new_id.0) {
                        Ok(i) => i,
                        Err(e) => {
                            warn!("accept aborted, register failed: {}", e);
                            continue;
                        }
                    };

                    let (host, port) = peer
                        .as_socket()
                        .map(|a| (a.ip().to_string(), a.port()))
                        .unwrap_or_default();

                    let slot = self.slots.raw_mut(new_id).expect("allocated slot");
                    slot.state = State::Connected;
                    slot.socket = Some(sock);
                    slot.poll_index = Some(index);
                    slot.remote = Some((host.clone(), port));
                    debug!("{} accepted {} from {}:{}", sid, new_id, host, port);

                    let handler = self.slots.get(sid).and_then(|s| s.handler.clone());
                    if let Some(h) = handler {
                        h.on_new_client(self, sid, new_id, &host, port);
                    }
                    // The handler may close the listener mid-drain.
                    if self
                        .slots
                        .get(sid)
                        .map(|s| s.state == State::Listening)
                        != Some(true)
                    {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("accept error on {}: {}", sid, e);
                    return;
                }
            }
        }
    }

    /// Drain a readable connection into its inbound buffer, then deliver:
    /// the whole buffer in byte mode, delimiter-split lines in line mode.
    fn drain_read(&mut self, sid: ConnId) {
        let chunk_size = self.config.read_chunk;
        let mut chunk = vec![0u8; chunk_size];
        let mut saw_eof = false;

        loop {
            let res = {
                let slot = match self.slots.get(sid) {
                    Some(s) => s,
                    None => return,
                };
                let mut sock: &Socket = slot.socket.as_ref().expect("connected socket");
                sock.read(&mut chunk)
            };
            match res {
                Ok(0) => {
                    saw_eof = true;
                    break;
                }
                Ok(n) => {
                    let slot = self.slots.get_mut(sid).expect("live slot");
                    slot.inbound.extend_from_slice(&chunk[..n]);
                    // A short read means nothing more is immediately there.
                    if n < chunk_size {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    // A failed read closes directly, bypassing on_eof.
                    // Historical asymmetry with readiness-reported errors,
                    // preserved deliberately.
                    debug!("read error on {}: {}", sid, e);
                    let _ = self.close(sid);
                    return;
                }
            }
        }

        self.deliver_inbound(sid);

        if saw_eof && self.is_live(sid) {
            self.stream_ended(sid, None);
        }
    }

    fn deliver_inbound(&mut self, sid: ConnId) {
        let (line_mode, handler) = match self.slots.get(sid) {
            Some(s) => (s.line_mode, s.handler.clone()),
            None => return,
        };
        let handler = match handler {
            Some(h) => h,
            None => return,
        };

        if line_mode {
            let lines = {
                let slot = self.slots.get_mut(sid).expect("live slot");
                split_lines(&mut slot.inbound)
            };
            for line in lines {
                if !self.is_live(sid) {
                    break;
                }
                handler.on_read(self, sid, &line);
            }
        } else {
            let data = {
                let slot = self.slots.get_mut(sid).expect("live slot");
                std::mem::take(&mut slot.inbound)
            };
            if !data.is_empty() {
                handler.on_read(self, sid, &data);
            }
        }
    }

    /// End-of-stream sequence: `on_eof` (None = clean hangup), then close.
    fn stream_ended(&mut self, sid: ConnId, err: Option<io::Error>) {
        let handler = self.slots.get(sid).and_then(|s| s.handler.clone());
        if let Some(h) = handler {
            h.on_eof(self, sid, err);
        }
        // The handler may have closed it already; close is idempotent.
        let _ = self.close(sid);
    }

    /// Accept `data` into the connection's outbound stream: flush what the
    /// descriptor takes now, buffer the remainder, never block the caller.
    ///
    /// On success the return value is always `data.len()` — the bytes
    /// accepted into the logical stream, regardless of how many physically
    /// reached the socket in this call. A fatal write error runs the
    /// `on_eof`/`on_close` sequence and surfaces as `Err(Io)`.
    pub fn write(&mut self, id: ConnId, data: &[u8]) -> Result<usize> {
        let slot = self.slots.get_mut(id).ok_or(NetError::InvalidHandle(id))?;
        slot.outbound.extend_from_slice(data);
        if slot.state == State::Connecting || slot.write_blocked {
            // No syscall until the descriptor reports writable.
            return Ok(data.len());
        }
        self.flush_outbound(id)?;
        Ok(data.len())
    }

    /// Formatted-write convenience; composes the string and forwards it to
    /// [`write`](Reactor::write).
    pub fn write_fmt(&mut self, id: ConnId, args: fmt::Arguments<'_>) -> Result<usize> {
        let data = fmt::format(args);
        self.write(id, data.as_bytes())
    }

    /// Try to flush the outbound buffer. Arms POLLOUT and sets the
    /// write-blocked flag when bytes remain; disarms both when the buffer
    /// drains — the sole backpressure release mechanism.
    fn flush_outbound(&mut self, id: ConnId) -> Result<()> {
        let sent = {
            let slot = self.slots.get(id).ok_or(NetError::InvalidHandle(id))?;
            if slot.outbound.is_empty() {
                return Ok(());
            }
            let socket = slot.socket.as_ref().expect("live socket");
            socket.send(&slot.outbound)
        };

        let n = match sent {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                let eof_err = e
                    .raw_os_error()
                    .map(io::Error::from_raw_os_error)
                    .unwrap_or_else(|| io::Error::new(e.kind(), "write failed"));
                self.stream_ended(id, Some(eof_err));
                return Err(NetError::Io(e));
            }
        };

        let slot = self.slots.get_mut(id).expect("live slot");
        slot.outbound.drain(..n);
        let index = slot.poll_index.expect("registered connection");
        if slot.outbound.is_empty() {
            slot.write_blocked = false;
            self.poll.clear_events(index, EV_WRITE);
        } else {
            slot.write_blocked = true;
            self.poll.add_events(index, EV_WRITE);
        }
        Ok(())
    }

    /// Is this a live (allocated, not yet closed) connection id?
    pub fn is_live(&self, id: ConnId) -> bool {
        self.slots.get(id).is_some()
    }

    /// Opt in or out of line framing for one connection.
    pub fn set_line_mode(&mut self, id: ConnId, enabled: bool) -> Result<()> {
        let slot = self.slots.get_mut(id).ok_or(NetError::InvalidHandle(id))?;
        slot.line_mode = enabled;
        Ok(())
    }

    pub fn set_handler(&mut self, id: ConnId, handler: Rc<dyn Handler>) -> Result<()> {
        let slot = self.slots.get_mut(id).ok_or(NetError::InvalidHandle(id))?;
        slot.handler = Some(handler);
        Ok(())
    }

    pub fn handler(&self, id: ConnId) -> Option<Rc<dyn Handler>> {
        self.slots.get(id).and_then(|s| s.handler.clone())
    }

    /// Attach opaque application data to a connection; released on close.
    pub fn set_user_data(&mut self, id: ConnId, data: Box<dyn Any>) -> Result<()> {
        let slot = self.slots.get_mut(id).ok_or(NetError::InvalidHandle(id))?;
        slot.user_data = Some(data);
        Ok(())
    }

    pub fn user_data(&self, id: ConnId) -> Option<&dyn Any> {
        self.slots.get(id).and_then(|s| s.user_data.as_deref())
    }

    pub fn user_data_mut(&mut self, id: ConnId) -> Option<&mut dyn Any> {
        self.slots
            .get_mut(id)
            .and_then(|s| s.user_data.as_deref_mut())
    }

    /// Local endpoint, known after bind (listen or explicit local bind).
    pub fn local_endpoint(&self, id: ConnId) -> Option<(&str, u16)> {
        self.slots
            .get(id)
            .and_then(|s| s.local.as_ref())
            .map(|(h, p)| (h.as_str(), *p))
    }

    /// Remote endpoint, known after accept or connect.
    pub fn remote_endpoint(&self, id: ConnId) -> Option<(&str, u16)> {
        self.slots
            .get(id)
            .and_then(|s| s.remote.as_ref())
            .map(|(h, p)| (h.as_str(), *p))
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}
