//! Loopback integration tests driving the reactor end to end against real
//! peers made with std's blocking TCP types.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::rc::Rc;
use std::time::Duration;

use weir::{ConnId, Handler, Reactor};

#[derive(Default)]
struct Log {
    connects: Vec<ConnId>,
    new_clients: Vec<ConnId>,
    reads: Vec<(ConnId, Vec<u8>)>,
    eofs: Vec<ConnId>,
    closes: Vec<ConnId>,
}

/// Records every callback; accepted clients get the same recorder attached,
/// in line mode when `line_mode` is set.
struct Recorder {
    log: Rc<RefCell<Log>>,
    line_mode: bool,
    echo: bool,
}

impl Recorder {
    fn new(log: Rc<RefCell<Log>>) -> Self {
        Recorder {
            log,
            line_mode: false,
            echo: false,
        }
    }
}

impl Handler for Recorder {
    fn on_connect(&self, _reactor: &mut Reactor, id: ConnId) {
        self.log.borrow_mut().connects.push(id);
    }

    fn on_new_client(
        &self,
        reactor: &mut Reactor,
        _listener: ConnId,
        client: ConnId,
        _host: &str,
        _port: u16,
    ) {
        self.log.borrow_mut().new_clients.push(client);
        reactor
            .set_handler(
                client,
                Rc::new(Recorder {
                    log: self.log.clone(),
                    line_mode: self.line_mode,
                    echo: self.echo,
                }),
            )
            .unwrap();
        if self.line_mode {
            reactor.set_line_mode(client, true).unwrap();
        }
    }

    fn on_read(&self, reactor: &mut Reactor, id: ConnId, data: &[u8]) {
        self.log.borrow_mut().reads.push((id, data.to_vec()));
        if self.echo {
            reactor.write(id, data).unwrap();
        }
    }

    fn on_eof(&self, _reactor: &mut Reactor, id: ConnId, _err: Option<std::io::Error>) {
        self.log.borrow_mut().eofs.push(id);
    }

    fn on_close(&self, _reactor: &mut Reactor, id: ConnId) {
        self.log.borrow_mut().closes.push(id);
    }
}

fn serve(recorder: Recorder) -> (Reactor, u16, Rc<RefCell<Log>>) {
    let log = recorder.log.clone();
    let mut reactor = Reactor::new();
    let listener = reactor.listen("127.0.0.1", 0).unwrap();
    reactor.set_handler(listener, Rc::new(recorder)).unwrap();
    let port = reactor.local_endpoint(listener).unwrap().1;
    (reactor, port, log)
}

fn tick_until<F: Fn(&Log) -> bool>(reactor: &mut Reactor, log: &Rc<RefCell<Log>>, pred: F) {
    for _ in 0..200 {
        reactor.tick(Some(Duration::from_millis(20))).unwrap();
        if pred(&log.borrow()) {
            return;
        }
    }
    panic!("condition not reached within tick budget");
}

fn read_bytes(log: &Rc<RefCell<Log>>, id: ConnId) -> Vec<u8> {
    log.borrow()
        .reads
        .iter()
        .filter(|(rid, _)| *rid == id)
        .flat_map(|(_, d)| d.iter().copied())
        .collect()
}

#[test]
fn byte_mode_delivers_verbatim_across_split_reads() {
    let log = Rc::new(RefCell::new(Log::default()));
    let (mut reactor, port, log) = serve(Recorder::new(log));

    let mut peer = TcpStream::connect(("127.0.0.1", port)).unwrap();
    tick_until(&mut reactor, &log, |l| !l.new_clients.is_empty());
    let id = log.borrow().new_clients[0];

    // A payload larger than the read chunk forces multiple underlying
    // reads; delivery must still be verbatim and in full.
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    peer.write_all(&payload).unwrap();
    peer.flush().unwrap();
    tick_until(&mut reactor, &log, |l| {
        l.reads
            .iter()
            .filter(|(rid, _)| *rid == id)
            .map(|(_, d)| d.len())
            .sum::<usize>()
            == payload.len()
    });
    assert_eq!(read_bytes(&log, id), payload);

    // Embedded NUL bytes are valid payload.
    log.borrow_mut().reads.clear();
    peer.write_all(b"a\0b").unwrap();
    tick_until(&mut reactor, &log, |l| !l.reads.is_empty());
    assert_eq!(read_bytes(&log, id), b"a\0b");
}

#[test]
fn line_mode_split_feed_matches_single_feed() {
    let log = Rc::new(RefCell::new(Log::default()));
    let mut recorder = Recorder::new(log);
    recorder.line_mode = true;
    let (mut reactor, port, log) = serve(recorder);

    let mut peer = TcpStream::connect(("127.0.0.1", port)).unwrap();
    tick_until(&mut reactor, &log, |l| !l.new_clients.is_empty());
    let id = log.borrow().new_clients[0];

    // "a\r\n" then "b\n" in separate events: exactly two deliveries.
    peer.write_all(b"a\r\n").unwrap();
    tick_until(&mut reactor, &log, |l| l.reads.len() == 1);
    peer.write_all(b"b\n").unwrap();
    tick_until(&mut reactor, &log, |l| l.reads.len() == 2);

    let reads: Vec<Vec<u8>> = log.borrow().reads.iter().map(|(_, d)| d.clone()).collect();
    assert_eq!(reads, vec![b"a".to_vec(), b"b".to_vec()]);
    assert_eq!(log.borrow().reads[0].0, id);
}

#[test]
fn line_mode_carries_partial_lines_over() {
    let log = Rc::new(RefCell::new(Log::default()));
    let mut recorder = Recorder::new(log);
    recorder.line_mode = true;
    let (mut reactor, port, log) = serve(recorder);

    let mut peer = TcpStream::connect(("127.0.0.1", port)).unwrap();
    tick_until(&mut reactor, &log, |l| !l.new_clients.is_empty());

    // No delimiter: nothing delivered yet.
    peer.write_all(b"abc").unwrap();
    std::thread::sleep(Duration::from_millis(50));
    reactor.tick(Some(Duration::from_millis(50))).unwrap();
    assert!(log.borrow().reads.is_empty());

    // The closing delimiter releases the whole reassembled line.
    peer.write_all(b"def\n").unwrap();
    tick_until(&mut reactor, &log, |l| !l.reads.is_empty());
    let reads: Vec<Vec<u8>> = log.borrow().reads.iter().map(|(_, d)| d.clone()).collect();
    assert_eq!(reads, vec![b"abcdef".to_vec()]);
}

#[test]
fn echo_round_trip() {
    let log = Rc::new(RefCell::new(Log::default()));
    let mut recorder = Recorder::new(log);
    recorder.echo = true;
    let (mut reactor, port, log) = serve(recorder);

    let mut peer = TcpStream::connect(("127.0.0.1", port)).unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    tick_until(&mut reactor, &log, |l| !l.new_clients.is_empty());

    peer.write_all(b"ping").unwrap();
    tick_until(&mut reactor, &log, |l| !l.reads.is_empty());

    let mut buf = [0u8; 16];
    let n = peer.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");
}

#[test]
fn accept_drains_all_queued_peers_in_one_tick() {
    let log = Rc::new(RefCell::new(Log::default()));
    let (mut reactor, port, log) = serve(Recorder::new(log));

    let peers: Vec<TcpStream> = (0..3)
        .map(|_| TcpStream::connect(("127.0.0.1", port)).unwrap())
        .collect();
    // Give the loopback handshakes a moment to land in the backlog.
    std::thread::sleep(Duration::from_millis(100));

    reactor.tick(Some(Duration::from_millis(500))).unwrap();
    assert_eq!(log.borrow().new_clients.len(), 3);
    drop(peers);
}

#[test]
fn closed_id_is_recycled_with_no_state_leakage() {
    let log = Rc::new(RefCell::new(Log::default()));
    let mut recorder = Recorder::new(log);
    recorder.line_mode = true;
    let (mut reactor, port, log) = serve(recorder);

    let mut first = TcpStream::connect(("127.0.0.1", port)).unwrap();
    tick_until(&mut reactor, &log, |l| !l.new_clients.is_empty());
    let old = log.borrow().new_clients[0];

    // Leave a partial line buffered and user data attached, then close.
    first.write_all(b"abc").unwrap();
    std::thread::sleep(Duration::from_millis(50));
    reactor.tick(Some(Duration::from_millis(50))).unwrap();
    reactor.set_user_data(old, Box::new("stale")).unwrap();
    reactor.close(old).unwrap();
    assert!(!reactor.is_live(old));
    drop(first);

    let mut second = TcpStream::connect(("127.0.0.1", port)).unwrap();
    tick_until(&mut reactor, &log, |l| l.new_clients.len() == 2);
    let new = log.borrow().new_clients[1];

    // Lowest vacant slot first, so the id comes straight back.
    assert_eq!(new, old);
    assert!(reactor.user_data(new).is_none());

    // The new connection sees only its own bytes: no "abc" prefix from
    // the previous occupant's inbound buffer.
    second.write_all(b"def\n").unwrap();
    tick_until(&mut reactor, &log, |l| {
        l.reads.iter().any(|(rid, _)| *rid == new)
    });
    assert_eq!(read_bytes(&log, new), b"def");
}

#[test]
fn reactor_as_client_connects_and_exchanges_data() {
    let server = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = server.local_addr().unwrap().port();

    let log = Rc::new(RefCell::new(Log::default()));
    let mut reactor = Reactor::new();
    let id = reactor.connect("127.0.0.1", port, None).unwrap();
    reactor
        .set_handler(id, Rc::new(Recorder::new(log.clone())))
        .unwrap();

    // Writes issued before the connect completes are buffered and flushed
    // by the completion path.
    assert_eq!(reactor.write(id, b"hello ").unwrap(), 6);
    assert_eq!(reactor.write(id, b"server").unwrap(), 6);

    let (mut accepted, _) = server.accept().unwrap();
    accepted
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    tick_until(&mut reactor, &log, |l| !l.connects.is_empty());
    assert_eq!(log.borrow().connects, vec![id]);

    let mut buf = [0u8; 32];
    let mut got = Vec::new();
    while got.len() < 12 {
        let n = accepted.read(&mut buf).unwrap();
        assert!(n > 0, "server saw eof before full payload");
        got.extend_from_slice(&buf[..n]);
    }
    assert_eq!(got, b"hello server");

    // Data flows back to the reactor-side connection too.
    accepted.write_all(b"ack").unwrap();
    tick_until(&mut reactor, &log, |l| !l.reads.is_empty());
    assert_eq!(read_bytes(&log, id), b"ack");
}

struct Reentrant {
    log: Rc<RefCell<Log>>,
    nested_result: Rc<RefCell<Option<usize>>>,
}

impl Handler for Reentrant {
    fn on_new_client(
        &self,
        reactor: &mut Reactor,
        _listener: ConnId,
        client: ConnId,
        _host: &str,
        _port: u16,
    ) {
        self.log.borrow_mut().new_clients.push(client);
        reactor
            .set_handler(
                client,
                Rc::new(Reentrant {
                    log: self.log.clone(),
                    nested_result: self.nested_result.clone(),
                }),
            )
            .unwrap();
    }

    fn on_read(&self, reactor: &mut Reactor, id: ConnId, data: &[u8]) {
        // A nested tick must refuse to poll or dispatch.
        let nested = reactor.tick(Some(Duration::from_millis(100))).unwrap();
        *self.nested_result.borrow_mut() = Some(nested);
        self.log.borrow_mut().reads.push((id, data.to_vec()));
    }
}

#[test]
fn nested_tick_inside_a_handler_is_a_no_op() {
    let log = Rc::new(RefCell::new(Log::default()));
    let nested_result = Rc::new(RefCell::new(None));

    let mut reactor = Reactor::new();
    let listener = reactor.listen("127.0.0.1", 0).unwrap();
    reactor
        .set_handler(
            listener,
            Rc::new(Reentrant {
                log: log.clone(),
                nested_result: nested_result.clone(),
            }),
        )
        .unwrap();
    let port = reactor.local_endpoint(listener).unwrap().1;

    let mut peer = TcpStream::connect(("127.0.0.1", port)).unwrap();
    tick_until(&mut reactor, &log, |l| !l.new_clients.is_empty());
    peer.write_all(b"poke").unwrap();
    tick_until(&mut reactor, &log, |l| !l.reads.is_empty());

    assert_eq!(*nested_result.borrow(), Some(0));
}

#[test]
fn close_from_inside_a_handler_is_not_revisited() {
    struct CloseOnRead {
        log: Rc<RefCell<Log>>,
    }
    impl Handler for CloseOnRead {
        fn on_new_client(
            &self,
            reactor: &mut Reactor,
            _listener: ConnId,
            client: ConnId,
            _host: &str,
            _port: u16,
        ) {
            self.log.borrow_mut().new_clients.push(client);
            reactor
                .set_handler(client, Rc::new(CloseOnRead { log: self.log.clone() }))
                .unwrap();
        }
        fn on_read(&self, reactor: &mut Reactor, id: ConnId, data: &[u8]) {
            self.log.borrow_mut().reads.push((id, data.to_vec()));
            reactor.close(id).unwrap();
        }
        fn on_close(&self, _reactor: &mut Reactor, id: ConnId) {
            self.log.borrow_mut().closes.push(id);
        }
    }

    let log = Rc::new(RefCell::new(Log::default()));
    let mut reactor = Reactor::new();
    let listener = reactor.listen("127.0.0.1", 0).unwrap();
    reactor
        .set_handler(listener, Rc::new(CloseOnRead { log: log.clone() }))
        .unwrap();
    let port = reactor.local_endpoint(listener).unwrap().1;

    let mut peer = TcpStream::connect(("127.0.0.1", port)).unwrap();
    tick_until(&mut reactor, &log, |l| !l.new_clients.is_empty());
    let id = log.borrow().new_clients[0];

    peer.write_all(b"bye").unwrap();
    tick_until(&mut reactor, &log, |l| !l.closes.is_empty());

    let snapshot = log.borrow();
    assert_eq!(snapshot.reads.len(), 1);
    assert_eq!(snapshot.closes, vec![id]);
    assert!(!reactor.is_live(id));

    // Later ticks must not resurrect or re-dispatch the closed id.
    drop(snapshot);
    reactor.tick(Some(Duration::from_millis(20))).unwrap();
    assert_eq!(log.borrow().closes.len(), 1);
}
