//! Line-mode echo server. Every line a client sends comes back with a
//! CRLF terminator.
//!
//! ```sh
//! cargo run --example echo_server -- 7000
//! ```

use anyhow::Result;
use std::rc::Rc;
use std::time::Duration;
use weir::{ConnId, Handler, Reactor};

struct Echo;

impl Handler for Echo {
    fn on_new_client(
        &self,
        reactor: &mut Reactor,
        _listener: ConnId,
        client: ConnId,
        host: &str,
        port: u16,
    ) {
        println!("client {client} connected from {host}:{port}");
        reactor.set_handler(client, Rc::new(Echo)).unwrap();
        reactor.set_line_mode(client, true).unwrap();
    }

    fn on_read(&self, reactor: &mut Reactor, id: ConnId, data: &[u8]) {
        let _ = reactor.write(id, data);
        let _ = reactor.write(id, b"\r\n");
    }

    fn on_eof(&self, _reactor: &mut Reactor, id: ConnId, err: Option<std::io::Error>) {
        match err {
            Some(e) => println!("client {id} error: {e}"),
            None => println!("client {id} hung up"),
        }
    }

    fn on_close(&self, _reactor: &mut Reactor, id: ConnId) {
        println!("client {id} closed");
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let port: u16 = std::env::args()
        .nth(1)
        .map(|p| p.parse())
        .transpose()?
        .unwrap_or(7000);

    let mut reactor = Reactor::new();
    let listener = reactor.listen("", port)?;
    reactor.set_handler(listener, Rc::new(Echo))?;
    println!("echo server listening on port {port}");

    loop {
        reactor.tick(Some(Duration::from_millis(100)))?;
    }
}
