use super::{Interest, Notifier, Reactor, Ready, TimerId, TimerQueue, Token};
use mio::net::TcpStream;
use mio::{Events, Poll, Waker};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAKE_TOKEN: mio::Token = mio::Token(usize::MAX);

/// Reactor backed by `mio::Poll` (epoll/kqueue) plus a timer heap.
///
/// Registrations are edge-triggered; `reregister` re-arms them, so readiness
/// that is already present is reported again.
pub struct MioReactor {
    poll: Poll,
    events: Events,
    timers: TimerQueue,
    waker: Arc<Waker>,
}

impl MioReactor {
    pub fn new() -> io::Result<Self> {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(events: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        Ok(Self { poll, events: Events::with_capacity(events), timers: TimerQueue::new(), waker })
    }

    /// Number of armed timers.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    fn poll_timeout(&mut self, timeout: Option<Duration>) -> Option<Duration> {
        let until_timer =
            self.timers.next_deadline().map(|at| at.saturating_duration_since(Instant::now()));
        match (timeout, until_timer) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

fn to_mio(interest: Interest) -> io::Result<mio::Interest> {
    match (interest.is_readable(), interest.is_writable()) {
        (true, true) => Ok(mio::Interest::READABLE | mio::Interest::WRITABLE),
        (true, false) => Ok(mio::Interest::READABLE),
        (false, true) => Ok(mio::Interest::WRITABLE),
        (false, false) => Err(io::Error::new(io::ErrorKind::InvalidInput, "empty interest")),
    }
}

/// Tokens carry a generation in their upper bits, so a token that does not
/// fit `usize` is refused rather than truncated into another live key.
fn to_mio_token(token: Token) -> io::Result<mio::Token> {
    usize::try_from(token.0)
        .map(mio::Token)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "token exceeds platform usize"))
}

impl Reactor for MioReactor {
    type Socket = TcpStream;

    fn connect(&mut self, addr: SocketAddr) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(addr)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::trace!(%addr, error = %e, "TCP_NODELAY not applied");
        }
        Ok(stream)
    }

    fn register(&mut self, socket: &mut TcpStream, token: Token, interest: Interest) -> io::Result<()> {
        self.poll.registry().register(socket, to_mio_token(token)?, to_mio(interest)?)
    }

    fn reregister(
        &mut self,
        socket: &mut TcpStream,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(socket, to_mio_token(token)?, to_mio(interest)?)
    }

    fn deregister(&mut self, socket: &mut TcpStream) -> io::Result<()> {
        self.poll.registry().deregister(socket)
    }

    fn add_timer(&mut self, token: Token, after: Duration) -> TimerId {
        self.timers.insert(token, Instant::now() + after)
    }

    fn remove_timer(&mut self, timer: TimerId) {
        self.timers.cancel(timer);
    }

    fn notifier(&self) -> Notifier {
        let waker = Arc::clone(&self.waker);
        Notifier::new(move || {
            if let Err(e) = waker.wake() {
                tracing::warn!(error = %e, "failed to wake reactor");
            }
        })
    }

    fn poll(&mut self, ready: &mut Vec<Ready>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = self.poll_timeout(timeout);
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }

        for event in self.events.iter() {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            let failed = event.is_error();
            ready.push(Ready::Io {
                token: Token(event.token().0 as u64),
                readable: failed || event.is_readable() || event.is_read_closed(),
                writable: failed || event.is_writable() || event.is_write_closed(),
            });
        }

        self.timers.expire(Instant::now(), ready);
        Ok(())
    }
}

impl std::fmt::Debug for MioReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MioReactor").field("timers", &self.timers.len()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_token_conversion_keeps_generation() {
        let token = Token((7u64 << 32) | 3);
        match to_mio_token(token) {
            Ok(mio_token) => assert_eq!(mio_token.0 as u64, token.0),
            Err(e) => {
                assert!(usize::BITS < 64);
                assert_eq!(e.kind(), io::ErrorKind::InvalidInput);
            }
        }
    }

    #[test]
    fn test_timer_fires_after_deadline() {
        let mut reactor = MioReactor::new().unwrap();
        let started = Instant::now();
        let id = reactor.add_timer(Token(3), Duration::from_millis(20));

        let mut ready = Vec::new();
        while ready.is_empty() {
            reactor.poll(&mut ready, Some(Duration::from_secs(2))).unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(ready, vec![Ready::Timer { token: Token(3), timer: id }]);
        assert_eq!(reactor.timer_count(), 0);
    }

    #[test]
    fn test_removed_timer_is_silent() {
        let mut reactor = MioReactor::new().unwrap();
        let id = reactor.add_timer(Token(1), Duration::from_millis(5));
        reactor.remove_timer(id);

        let mut ready = Vec::new();
        reactor.poll(&mut ready, Some(Duration::from_millis(30))).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn test_notifier_interrupts_poll() {
        let mut reactor = MioReactor::new().unwrap();
        let notifier = reactor.notifier();
        let woke = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&woke);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
            notifier.notify();
        });

        let started = Instant::now();
        let mut ready = Vec::new();
        while !woke.load(Ordering::SeqCst) {
            reactor.poll(&mut ready, Some(Duration::from_secs(5))).unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(ready.is_empty());
        handle.join().unwrap();
    }

    #[test]
    fn test_connect_reports_writable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut reactor = MioReactor::new().unwrap();

        let mut stream = reactor.connect(addr).unwrap();
        reactor.register(&mut stream, Token(9), Interest::WRITABLE).unwrap();

        let mut ready = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while ready.is_empty() && Instant::now() < deadline {
            reactor.poll(&mut ready, Some(Duration::from_millis(100))).unwrap();
        }
        assert!(matches!(ready[0], Ready::Io { token: Token(9), writable: true, .. }));
        reactor.deregister(&mut stream).unwrap();
    }
}
