use crate::conn::ConnId;
use crate::reactor::Reactor;
use std::io;

/// Callback set a connection owner registers per connection.
///
/// Every callback runs synchronously from inside [`Reactor::tick`] and
/// receives the reactor itself, so handlers may call back into it (write,
/// close, attach handlers to freshly accepted connections). Handlers must
/// not perform blocking I/O: doing so stalls the whole reactor.
///
/// All callbacks except [`on_read`](Handler::on_read) default to no-ops.
/// Per-connection state lives either inside the handler (interior
/// mutability) or in the reactor's user-data slot for that connection.
pub trait Handler {
    /// A non-blocking connect completed.
    fn on_connect(&self, reactor: &mut Reactor, id: ConnId) {
        let _ = (reactor, id);
    }

    /// A listening socket accepted a peer. `client` starts out with no
    /// handler attached; attach one here or the connection is polled but
    /// never dispatched.
    fn on_new_client(
        &self,
        reactor: &mut Reactor,
        listener: ConnId,
        client: ConnId,
        host: &str,
        port: u16,
    ) {
        let _ = (reactor, listener, client, host, port);
    }

    /// Data arrived: the whole accumulated buffer in byte mode, one
    /// delimiter-stripped line per call in line mode.
    fn on_read(&self, reactor: &mut Reactor, id: ConnId, data: &[u8]);

    /// End of stream detected before destruction. `err` is `None` for a
    /// clean hangup, `Some` when the peer went away with an error.
    fn on_eof(&self, reactor: &mut Reactor, id: ConnId, err: Option<io::Error>) {
        let _ = (reactor, id, err);
    }

    /// The connection is fully destroyed; its id is already invalid.
    fn on_close(&self, reactor: &mut Reactor, id: ConnId) {
        let _ = (reactor, id);
    }
}
