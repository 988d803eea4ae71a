use super::{Callback, LookupId};
use crate::base::loadstate::LoadState;
use crate::dns::{Address, Name};
use crate::reactor::{Interest, Reactor, TimerId, Token};
use crate::socket::connectjob::ConnectJob;
use crate::socket::framing::{ReadBuffer, ReadMode};
use crate::socket::writequeue::WriteQueue;
use std::io;

/// Where a connection is headed.
pub(crate) enum Target {
    Host { name: Name, port: u16 },
    Address { addr: Address, port: u16 },
    /// Wraps a socket that was already connected elsewhere.
    Adopted,
}

impl Target {
    pub(crate) fn port(&self) -> u16 {
        match self {
            Target::Host { port, .. } | Target::Address { port, .. } => *port,
            Target::Adopted => 0,
        }
    }
}

/// The connection timer and whether it was armed after CONNECT.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ArmedTimer {
    pub(crate) id: TimerId,
    pub(crate) while_connected: bool,
}

/// Per-connection state owned by the engine's arena.
pub(crate) struct Connection<R: Reactor> {
    pub(crate) state: LoadState,
    pub(crate) target: Target,
    pub(crate) socket: Option<R::Socket>,
    /// Interest currently registered with the reactor; empty means the
    /// socket is not registered at all.
    pub(crate) registered: Interest,
    pub(crate) lookup: Option<LookupId>,
    pub(crate) job: Option<ConnectJob>,
    /// Armed read watch and the mode it will deliver in.
    pub(crate) read_mode: Option<ReadMode>,
    pub(crate) want_writable: bool,
    pub(crate) rbuf: ReadBuffer,
    pub(crate) wqueue: WriteQueue,
    pub(crate) timer: Option<ArmedTimer>,
    pub(crate) callback: Option<Callback<R>>,
}

impl<R: Reactor> Connection<R> {
    pub(crate) fn new(target: Target, callback: Callback<R>, max_record: usize) -> Self {
        Self {
            state: LoadState::Idle,
            target,
            socket: None,
            registered: Interest::NONE,
            lookup: None,
            job: None,
            read_mode: None,
            want_writable: false,
            rbuf: ReadBuffer::new(max_record),
            wqueue: WriteQueue::new(),
            timer: None,
            callback: Some(callback),
        }
    }

    /// Interest implied by the current phase and armed watches.
    pub(crate) fn desired_interest(&self) -> Interest {
        match self.state {
            LoadState::Connecting => Interest::WRITABLE,
            LoadState::Connected => Interest::new(
                self.read_mode.is_some(),
                !self.wqueue.is_empty() || self.want_writable,
            ),
            _ => Interest::NONE,
        }
    }

    /// Brings the reactor registration in line with `desired_interest`.
    ///
    /// `force` re-registers even when the interest is unchanged, which
    /// re-reports readiness that is already present.
    pub(crate) fn sync_interest(
        &mut self,
        reactor: &mut R,
        token: Token,
        force: bool,
    ) -> io::Result<()> {
        let desired = self.desired_interest();
        let Some(socket) = self.socket.as_mut() else {
            self.registered = Interest::NONE;
            return Ok(());
        };

        if desired.is_empty() {
            if !self.registered.is_empty() {
                reactor.deregister(socket)?;
            }
        } else if self.registered.is_empty() {
            reactor.register(socket, token, desired)?;
        } else if force || desired != self.registered {
            reactor.reregister(socket, token, desired)?;
        }
        self.registered = desired;
        Ok(())
    }

    /// Detaches the socket from the reactor and hands it back.
    pub(crate) fn close_socket(&mut self, reactor: &mut R) -> Option<R::Socket> {
        let mut socket = self.socket.take()?;
        if !self.registered.is_empty() {
            if let Err(e) = reactor.deregister(&mut socket) {
                tracing::trace!(error = %e, "deregister failed");
            }
            self.registered = Interest::NONE;
        }
        Some(socket)
    }

    pub(crate) fn disarm_timer(&mut self, reactor: &mut R) {
        if let Some(timer) = self.timer.take() {
            reactor.remove_timer(timer.id);
        }
    }

    /// True when buffered bytes can satisfy the armed read without
    /// touching the socket.
    pub(crate) fn has_buffered(&self, mode: ReadMode) -> bool {
        match mode {
            ReadMode::Notify => !self.rbuf.is_empty(),
            mode => self.rbuf.has_record(mode),
        }
    }
}
