//! Minimal client: connects, sends one greeting line, prints every line
//! the server answers with.
//!
//! ```sh
//! cargo run --example chat_client -- 127.0.0.1 7000
//! ```

use anyhow::Result;
use std::rc::Rc;
use std::time::Duration;
use weir::{ConnId, Handler, Reactor};

struct Chat;

impl Handler for Chat {
    fn on_connect(&self, reactor: &mut Reactor, id: ConnId) {
        println!("connected as {id}");
        let _ = reactor.write_fmt(id, format_args!("hello from {id}\r\n"));
    }

    fn on_read(&self, _reactor: &mut Reactor, _id: ConnId, data: &[u8]) {
        println!("<- {}", String::from_utf8_lossy(data));
    }

    fn on_eof(&self, _reactor: &mut Reactor, _id: ConnId, _err: Option<std::io::Error>) {
        println!("server went away");
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".into());
    let port: u16 = args.next().map(|p| p.parse()).transpose()?.unwrap_or(7000);

    let mut reactor = Reactor::new();
    let id = reactor.connect(&host, port, None)?;
    reactor.set_handler(id, Rc::new(Chat))?;
    reactor.set_line_mode(id, true)?;

    while reactor.is_live(id) {
        reactor.tick(Some(Duration::from_millis(100)))?;
    }
    Ok(())
}
