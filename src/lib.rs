//! # Weir
//! A single-threaded, callback-driven TCP reactor: many listening and
//! connected sockets multiplexed over one readiness poll, with buffered
//! non-blocking partial reads/writes and an optional line-framing decoder.
//! Weir is the networking core for programs that must handle many
//! concurrent TCP peers without one thread per connection and without a
//! heavyweight async runtime.
//!
//! ## Core Philosophy
//! Weir was designed for applications that require:
//! - **One logical thread of control**: no locks, no `Send` bounds on
//!   handlers, all callbacks synchronous from inside [`Reactor::tick`]
//! - **Stable connection handles** that survive table growth and are
//!   recycled only after an explicit close
//! - **Backpressure you can see**: writes never block; unflushed bytes sit
//!   in a per-connection buffer until the descriptor reports writable
//!
//! ## Architecture Overview
//! ```text
//! ┌────────────┐    ┌────────────┐    ┌─────────────┐
//! │  Reactor   │───▶│ Slot Table │◀──▶│ Poll Table  │
//! │  (tick)    │    │ (ConnId ⇒  │    │ (pollfd +   │
//! └─────┬──────┘    │ Connection)│    │ cached idx) │
//!       │           └────────────┘    └─────────────┘
//!       │ dispatch
//!       ▼
//! ┌────────────┐
//! │  Handler   │  on_connect / on_new_client / on_read / on_eof / on_close
//! └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use weir::{Handler, Reactor, ConnId};
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     fn on_new_client(
//!         &self,
//!         reactor: &mut Reactor,
//!         _listener: ConnId,
//!         client: ConnId,
//!         host: &str,
//!         port: u16,
//!     ) {
//!         println!("new client {client} from {host}:{port}");
//!         reactor.set_handler(client, Rc::new(Echo)).unwrap();
//!         reactor.set_line_mode(client, true).unwrap();
//!     }
//!
//!     fn on_read(&self, reactor: &mut Reactor, id: ConnId, data: &[u8]) {
//!         let _ = reactor.write(id, data);
//!         let _ = reactor.write(id, b"\r\n");
//!     }
//! }
//!
//! fn main() -> weir::Result<()> {
//!     let mut reactor = Reactor::new();
//!     let listener = reactor.listen("", 8080)?;
//!     reactor.set_handler(listener, Rc::new(Echo))?;
//!     loop {
//!         reactor.tick(Some(Duration::from_millis(100)))?;
//!     }
//! }
//! ```
//!
//! - [`Reactor`]: the owning context — slot table, poll table, and the
//!   tick/dispatch loop
//! - [`Handler`]: trait for the per-connection callback set
//! - [`ReactorConfig`]: tuning knobs (read chunk, backlog, initial slots)
//! - [`error`]: error taxonomy and result alias

pub mod config;
pub mod conn;
pub mod error;
pub mod handler;
mod poll;
pub mod reactor;
pub mod resolve;

pub use config::ReactorConfig;
pub use conn::ConnId;
pub use error::{NetError, Result};
pub use handler::Handler;
pub use reactor::Reactor;
pub use resolve::{ip_literal, IpLiteral};

/// A convenient prelude module that re-exports the commonly used types.
///
/// ```rust
/// use weir::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::ReactorConfig;
    pub use crate::conn::ConnId;
    pub use crate::error::{NetError, Result};
    pub use crate::handler::Handler;
    pub use crate::reactor::Reactor;
    pub use crate::resolve::{ip_literal, IpLiteral};
}
