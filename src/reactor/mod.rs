//! Event loop abstraction.
//!
//! The engine never blocks and never owns an OS poller directly. It talks to
//! a [`Reactor`], which:
//! - opens non-blocking sockets,
//! - reports readiness for registered sockets, tagged with a [`Token`],
//! - keeps one-shot timers,
//! - can be woken from other threads through a [`Notifier`].
//!
//! [`MioReactor`] is the implementation shipped with the crate. Tests and
//! embedders may provide their own.

mod poll;
mod timer;

pub use poll::MioReactor;
pub use timer::TimerQueue;

use crate::socket::StreamSocket;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Identifies the owner of a registration or timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

/// Identifies one armed timer. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Readiness directions a registration watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest {
    readable: bool,
    writable: bool,
}

impl Interest {
    pub const NONE: Interest = Interest { readable: false, writable: false };
    pub const READABLE: Interest = Interest { readable: true, writable: false };
    pub const WRITABLE: Interest = Interest { readable: false, writable: true };
    pub const BOTH: Interest = Interest { readable: true, writable: true };

    pub fn new(readable: bool, writable: bool) -> Self {
        Self { readable, writable }
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable
    }
}

/// Something the reactor observed during `poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ready {
    /// A registered socket can make progress. Error and hang-up conditions
    /// are reported as both readable and writable.
    Io { token: Token, readable: bool, writable: bool },
    /// A timer reached its deadline.
    Timer { token: Token, timer: TimerId },
}

/// Thread-safe handle that interrupts a blocked `poll`.
#[derive(Clone)]
pub struct Notifier(Arc<dyn Fn() + Send + Sync>);

impl Notifier {
    pub fn new(wake: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(wake))
    }

    pub fn notify(&self) {
        (self.0)()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

/// A single-threaded readiness and timer loop.
pub trait Reactor {
    type Socket: StreamSocket;

    /// Opens a non-blocking stream socket and starts connecting to `addr`.
    /// Completion is signaled by writability.
    fn connect(&mut self, addr: SocketAddr) -> io::Result<Self::Socket>;

    fn register(
        &mut self,
        socket: &mut Self::Socket,
        token: Token,
        interest: Interest,
    ) -> io::Result<()>;

    /// Replaces the interest of a registered socket. Readiness that is
    /// already present is reported again by the next `poll`.
    fn reregister(
        &mut self,
        socket: &mut Self::Socket,
        token: Token,
        interest: Interest,
    ) -> io::Result<()>;

    fn deregister(&mut self, socket: &mut Self::Socket) -> io::Result<()>;

    /// Arms a one-shot timer that fires `after` from now.
    fn add_timer(&mut self, token: Token, after: Duration) -> TimerId;

    /// Disarms a timer. Unknown or already fired ids are ignored.
    fn remove_timer(&mut self, timer: TimerId);

    fn notifier(&self) -> Notifier;

    /// Waits up to `timeout` (forever if `None`) and appends what happened.
    fn poll(&mut self, ready: &mut Vec<Ready>, timeout: Option<Duration>) -> io::Result<()>;
}
