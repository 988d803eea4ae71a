//! Shared fixtures for the engine tests.
//!
//! `MockReactor` is a level-triggered in-memory reactor with a virtual
//! clock. Sockets are `Rc<RefCell<..>>` handles, so a test keeps a view of
//! every socket the engine opened and can feed it bytes, block its send
//! side or inspect what was sent.

#![allow(dead_code)]

use evnet::base::neterror::NetError;
use evnet::dns::{Name, Resolve};
use evnet::reactor::{Interest, Notifier, Reactor, Ready, TimerId, TimerQueue, Token};
use evnet::socket::StreamSocket;
use evnet::{ConnId, Event, Net, NetConfig};

use crossbeam_channel::{Receiver, Sender};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Shutdown, SocketAddr};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub type Shared = Rc<RefCell<SocketState>>;

/// How the mock answers a connect to a given address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handshake completes immediately.
    Accept,
    /// Handshake completes with `ECONNREFUSED` pending on the socket.
    Refuse,
    /// `connect` itself fails.
    FailSync,
    /// Handshake never completes until the test flips `connected`.
    Hang,
}

#[derive(Debug)]
pub struct SocketState {
    pub addr: SocketAddr,
    pub connected: bool,
    pub pending_error: Option<io::ErrorKind>,
    pub inbound: VecDeque<Vec<u8>>,
    pub eof: bool,
    pub recv_error: Option<io::ErrorKind>,
    pub sent: Vec<u8>,
    /// Bytes accepted per poll cycle; `None` is unlimited.
    pub per_poll: Option<usize>,
    pub budget: usize,
    pub send_calls: usize,
    pub shutdown: Option<Shutdown>,
    pub registration: Option<(Token, Interest)>,
    pub dropped: bool,
}

impl SocketState {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connected: false,
            pending_error: None,
            inbound: VecDeque::new(),
            eof: false,
            recv_error: None,
            sent: Vec::new(),
            per_poll: None,
            budget: 0,
            send_calls: 0,
            shutdown: None,
            registration: None,
            dropped: false,
        }
    }

    fn readable(&self) -> bool {
        !self.inbound.is_empty() || self.eof || self.recv_error.is_some()
    }

    fn writable(&self) -> bool {
        let has_room = self.per_poll.is_none() || self.budget > 0;
        (self.connected || self.pending_error.is_some()) && has_room
    }
}

pub struct MockSocket(pub Shared);

impl StreamSocket for MockSocket {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut s = self.0.borrow_mut();
        if !s.connected {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let n = match s.per_poll {
            Some(_) if s.budget == 0 => return Err(io::ErrorKind::WouldBlock.into()),
            Some(_) => s.budget.min(buf.len()),
            None => buf.len(),
        };
        if s.per_poll.is_some() {
            s.budget -= n;
        }
        s.sent.extend_from_slice(&buf[..n]);
        s.send_calls += 1;
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut s = self.0.borrow_mut();
        if let Some(kind) = s.recv_error.take() {
            return Err(kind.into());
        }
        let Some(chunk) = s.inbound.front_mut() else {
            return if s.eof { Ok(0) } else { Err(io::ErrorKind::WouldBlock.into()) };
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            s.inbound.pop_front();
        }
        Ok(n)
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        Ok(self.0.borrow_mut().pending_error.take().map(io::Error::from))
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        let s = self.0.borrow();
        if s.connected {
            Ok(s.addr)
        } else {
            Err(io::ErrorKind::NotConnected.into())
        }
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.0.borrow_mut().shutdown = Some(how);
        Ok(())
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.0.borrow_mut().dropped = true;
    }
}

pub struct MockReactor {
    pub outcomes: HashMap<SocketAddr, Outcome>,
    pub sockets: Vec<Shared>,
    pub attempts: Vec<SocketAddr>,
    pub timers: TimerQueue,
    pub now: Instant,
    pub woken: Arc<AtomicBool>,
}

impl MockReactor {
    pub fn new() -> Self {
        Self {
            outcomes: HashMap::new(),
            sockets: Vec::new(),
            attempts: Vec::new(),
            timers: TimerQueue::new(),
            now: Instant::now(),
            woken: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn script(mut self, addr: SocketAddr, outcome: Outcome) -> Self {
        self.outcomes.insert(addr, outcome);
        self
    }

    /// Creates an established socket, as a listener would hand out.
    pub fn accepted(&mut self, peer: SocketAddr) -> (MockSocket, Shared) {
        let mut state = SocketState::new(peer);
        state.connected = true;
        let shared = Rc::new(RefCell::new(state));
        self.sockets.push(Rc::clone(&shared));
        (MockSocket(Rc::clone(&shared)), shared)
    }

    /// The socket opened by the n-th connect attempt.
    pub fn socket(&self, index: usize) -> Shared {
        Rc::clone(&self.sockets[index])
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

impl Default for MockReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor for MockReactor {
    type Socket = MockSocket;

    fn connect(&mut self, addr: SocketAddr) -> io::Result<MockSocket> {
        self.attempts.push(addr);
        let outcome = self.outcomes.get(&addr).copied().unwrap_or(Outcome::Accept);
        let mut state = SocketState::new(addr);
        match outcome {
            Outcome::FailSync => return Err(io::ErrorKind::AddrNotAvailable.into()),
            Outcome::Accept => state.connected = true,
            Outcome::Refuse => state.pending_error = Some(io::ErrorKind::ConnectionRefused),
            Outcome::Hang => {}
        }
        let shared = Rc::new(RefCell::new(state));
        self.sockets.push(Rc::clone(&shared));
        Ok(MockSocket(shared))
    }

    fn register(&mut self, socket: &mut MockSocket, token: Token, interest: Interest) -> io::Result<()> {
        let mut s = socket.0.borrow_mut();
        if s.registration.is_some() {
            return Err(io::ErrorKind::AlreadyExists.into());
        }
        s.registration = Some((token, interest));
        Ok(())
    }

    fn reregister(
        &mut self,
        socket: &mut MockSocket,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        let mut s = socket.0.borrow_mut();
        if s.registration.is_none() {
            return Err(io::ErrorKind::NotFound.into());
        }
        s.registration = Some((token, interest));
        Ok(())
    }

    fn deregister(&mut self, socket: &mut MockSocket) -> io::Result<()> {
        socket.0.borrow_mut().registration = None;
        Ok(())
    }

    fn add_timer(&mut self, token: Token, after: Duration) -> TimerId {
        self.timers.insert(token, self.now + after)
    }

    fn remove_timer(&mut self, timer: TimerId) {
        self.timers.cancel(timer);
    }

    fn notifier(&self) -> Notifier {
        let woken = Arc::clone(&self.woken);
        Notifier::new(move || woken.store(true, Ordering::SeqCst))
    }

    fn poll(&mut self, ready: &mut Vec<Ready>, timeout: Option<Duration>) -> io::Result<()> {
        for shared in &self.sockets {
            let mut s = shared.borrow_mut();
            if let Some(limit) = s.per_poll {
                s.budget = limit;
            }
            let Some((token, interest)) = s.registration else {
                continue;
            };
            if s.dropped {
                continue;
            }
            let readable = interest.is_readable() && s.readable();
            let writable = interest.is_writable() && s.writable();
            if readable || writable {
                ready.push(Ready::Io { token, readable, writable });
            }
        }

        let woken = self.woken.swap(false, Ordering::SeqCst);
        let idle = ready.is_empty() && !woken;
        if idle && timeout != Some(Duration::ZERO) {
            // Virtual sleep: jump to the next deadline within the timeout.
            match self.timers.next_deadline() {
                Some(deadline) => {
                    let target = timeout.map_or(deadline, |t| deadline.min(self.now + t));
                    if target > self.now {
                        self.now = target;
                    }
                }
                None => match timeout {
                    Some(t) => self.now += t,
                    None => thread::sleep(Duration::from_millis(1)),
                },
            }
        }

        self.timers.expire(self.now, ready);
        Ok(())
    }
}

/// Answers from a fixed table. Unknown names fail with `NameNotResolved`.
#[derive(Default)]
pub struct ScriptedResolver {
    answers: HashMap<String, Vec<IpAddr>>,
    pub calls: AtomicUsize,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, host: &str, ips: &[&str]) -> Self {
        let ips = ips.iter().map(|ip| ip.parse().expect("bad test ip")).collect();
        self.answers.insert(host.to_string(), ips);
        self
    }
}

impl Resolve for ScriptedResolver {
    fn resolve(&self, name: &Name) -> Result<Vec<IpAddr>, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.get(name.as_str()).cloned().ok_or(NetError::NameNotResolved)
    }

    fn reverse(&self, ip: IpAddr) -> Result<String, NetError> {
        self.answers
            .iter()
            .find(|(_, ips)| ips.contains(&ip))
            .map(|(host, _)| host.clone())
            .ok_or(NetError::NameNotResolved)
    }
}

/// Blocks every lookup until the returned sender is dropped or sent to.
pub struct GatedResolver {
    gate: Mutex<Receiver<()>>,
    inner: ScriptedResolver,
}

impl GatedResolver {
    pub fn new(inner: ScriptedResolver) -> (Self, Sender<()>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { gate: Mutex::new(rx), inner }, tx)
    }
}

impl Resolve for GatedResolver {
    fn resolve(&self, name: &Name) -> Result<Vec<IpAddr>, NetError> {
        let gate = self.gate.lock().map_err(|_| NetError::Unexpected)?;
        let _ = gate.recv();
        drop(gate);
        self.inner.resolve(name)
    }

    fn reverse(&self, ip: IpAddr) -> Result<String, NetError> {
        self.inner.reverse(ip)
    }
}

/// Never answers names starting with "hang" until the returned sender is
/// dropped; other names go straight to the inner table.
pub struct StallingResolver {
    release: Receiver<()>,
    inner: ScriptedResolver,
}

impl StallingResolver {
    pub fn new(inner: ScriptedResolver) -> (Self, Sender<()>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { release: rx, inner }, tx)
    }
}

impl Resolve for StallingResolver {
    fn resolve(&self, name: &Name) -> Result<Vec<IpAddr>, NetError> {
        if name.as_str().starts_with("hang") {
            let _ = self.release.recv();
            return Err(NetError::NameNotResolved);
        }
        self.inner.resolve(name)
    }

    fn reverse(&self, ip: IpAddr) -> Result<String, NetError> {
        self.inner.reverse(ip)
    }
}

pub type Log = Rc<RefCell<Vec<Event>>>;

/// A callback that records every event it receives.
pub fn recorder() -> (Log, impl FnMut(&mut Net<MockReactor>, ConnId, Event) + 'static) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    (log, move |_: &mut Net<MockReactor>, _: ConnId, event: Event| sink.borrow_mut().push(event))
}

pub fn mock_net(reactor: MockReactor, resolver: impl Resolve + 'static) -> Net<MockReactor> {
    mock_net_with(reactor, resolver, NetConfig::default())
}

pub fn mock_net_with(
    reactor: MockReactor,
    resolver: impl Resolve + 'static,
    config: NetConfig,
) -> Net<MockReactor> {
    Net::new(reactor, Arc::new(resolver), config).expect("engine")
}

/// Turns without advancing virtual time until `done` holds.
pub fn turn_until(net: &mut Net<MockReactor>, mut done: impl FnMut(&Net<MockReactor>) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(net) {
        assert!(Instant::now() < deadline, "condition not reached");
        net.turn(Some(Duration::ZERO)).expect("turn");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Turns until the log holds at least `count` events.
pub fn turn_until_events(net: &mut Net<MockReactor>, log: &Log, count: usize) {
    let log = Rc::clone(log);
    turn_until(net, move |_| log.borrow().len() >= count);
}

pub fn addr(s: &str) -> SocketAddr {
    s.parse().expect("bad test addr")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
