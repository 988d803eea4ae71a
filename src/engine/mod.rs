//! The connection engine.
//!
//! [`Net`] owns every connection in a generational arena and drives them
//! from a single thread. Each connection has exactly one callback, which
//! receives every [`Event`] for that connection in order:
//!
//! ```text
//! Idle -> ResolvingHost -> Connecting -> Connected -> Closed | Errored | TimedOut
//! ```
//!
//! Events are only ever delivered from [`Net::turn`]. API calls change
//! in-memory state and schedule work; they never call back into user code.
//! A callback may call anything on `Net`, including `dispose` on its own
//! connection.

mod connection;
mod event;

pub use event::Event;

use self::connection::{ArmedTimer, Connection, Target};
use crate::base::context::IoResultExt;
use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::config::NetConfig;
use crate::dns::pool::{ResolverPool, Ticket};
use crate::dns::{lookup, Address, GaiResolver, Name, Resolve};
use crate::reactor::{Interest, MioReactor, Reactor, Ready, TimerId, Token};
use crate::socket::connectjob::ConnectJob;
use crate::socket::framing::ReadMode;
use crate::socket::stream::StreamSocket;
use crate::socket::writequeue::WriteBuf;
use bytes::Bytes;
use slotmap::{new_key_type, Key, KeyData, SlotMap};
use std::collections::VecDeque;
use std::io;
use std::mem;
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

new_key_type! {
    /// Generation-checked handle to a connection.
    pub struct ConnId;
    /// Handle to a pending stand-alone lookup.
    pub struct LookupId;
}

/// The single per-connection callback.
pub type Callback<R> = Box<dyn FnMut(&mut Net<R>, ConnId, Event)>;

/// Receives the outcome of [`Net::resolve`].
pub type LookupCallback<R> = Box<dyn FnOnce(&mut Net<R>, Result<Vec<Address>, NetError>)>;

enum LookupOwner<R: Reactor> {
    Conn(ConnId),
    Caller(LookupCallback<R>),
}

struct PendingLookup<R: Reactor> {
    owner: LookupOwner<R>,
    ticket: Ticket,
}

/// Work that must run on the loop rather than inside the API call that
/// caused it.
#[derive(Debug)]
enum Deferred {
    /// An adopted socket announces CONNECT.
    Connected(ConnId),
    /// Buffered input may satisfy the armed read.
    Buffered(ConnId),
    /// A connect attempt failed before reaching the reactor.
    Failed(ConnId, NetError),
}

enum Inbound {
    Record(Bytes),
    Eof,
    Pending,
    Failed(NetError),
}

fn token_of(id: ConnId) -> Token {
    Token(id.data().as_ffi())
}

fn conn_of(token: Token) -> ConnId {
    ConnId::from(KeyData::from_ffi(token.0))
}

/// Single-threaded multiplexer for resolve, connect, read, write and
/// timeout across many connections.
pub struct Net<R: Reactor> {
    reactor: R,
    config: NetConfig,
    conns: SlotMap<ConnId, Connection<R>>,
    lookups: SlotMap<LookupId, PendingLookup<R>>,
    pool: ResolverPool<LookupId>,
    deferred: VecDeque<Deferred>,
    ready: Vec<Ready>,
}

impl Net<MioReactor> {
    /// An engine on a [`MioReactor`] using the system resolver.
    pub fn system(config: NetConfig) -> Result<Self, NetError> {
        config.validate()?;
        let reactor = MioReactor::with_capacity(config.events_capacity).map_err(|e| {
            tracing::warn!(error = %e, "failed to create poller");
            NetError::from_transfer_error(&e)
        })?;
        Self::new(reactor, Arc::new(GaiResolver::new()), config)
    }
}

impl<R: Reactor> Net<R> {
    /// Builds an engine. Fails with `InvalidArgument` when `config` carries
    /// a zero limit.
    pub fn new(reactor: R, resolver: Arc<dyn Resolve>, config: NetConfig) -> Result<Self, NetError> {
        config.validate()?;
        let pool = ResolverPool::new(resolver, config.resolver_threads, reactor.notifier())?;
        let ready = Vec::with_capacity(config.events_capacity);
        Ok(Self {
            reactor,
            config,
            conns: SlotMap::with_key(),
            lookups: SlotMap::with_key(),
            pool,
            deferred: VecDeque::new(),
            ready,
        })
    }

    // ===== Connection lifecycle =====

    /// Creates an idle connection towards `host:port`.
    ///
    /// IP literals skip resolution. Nothing happens until [`Net::connect`].
    pub fn connection<F>(&mut self, host: &str, port: u16, callback: F) -> ConnId
    where
        F: FnMut(&mut Net<R>, ConnId, Event) + 'static,
    {
        let target = match Address::literal(host) {
            Some(addr) => Target::Address { addr, port },
            None => Target::Host { name: Name::new(host), port },
        };
        self.insert(target, Box::new(callback))
    }

    /// Creates an idle connection towards an already resolved address.
    pub fn connection_to<F>(&mut self, addr: Address, port: u16, callback: F) -> ConnId
    where
        F: FnMut(&mut Net<R>, ConnId, Event) + 'static,
    {
        self.insert(Target::Address { addr, port }, Box::new(callback))
    }

    /// `connection` followed by `connect`.
    pub fn open<F>(&mut self, host: &str, port: u16, callback: F) -> Result<ConnId, NetError>
    where
        F: FnMut(&mut Net<R>, ConnId, Event) + 'static,
    {
        let id = self.connection(host, port, callback);
        if let Err(err) = self.connect(id) {
            self.dispose(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Wraps a socket that is already connected, such as one returned by a
    /// listener. CONNECT is delivered on the next turn.
    pub fn adopt<F>(&mut self, socket: R::Socket, callback: F) -> Result<ConnId, NetError>
    where
        F: FnMut(&mut Net<R>, ConnId, Event) + 'static,
    {
        let peer = socket.peer_addr().connect_context()?;
        let id = self.insert(Target::Adopted, Box::new(callback));
        if let Some(conn) = self.conns.get_mut(id) {
            conn.state = LoadState::Connected;
            conn.socket = Some(socket);
        }
        tracing::debug!(conn = ?id, %peer, "adopted socket");
        self.deferred.push_back(Deferred::Connected(id));
        Ok(id)
    }

    fn insert(&mut self, target: Target, callback: Callback<R>) -> ConnId {
        let max_record = self.config.max_line_length;
        self.conns.insert(Connection::new(target, callback, max_record))
    }

    /// Starts resolution (or the connect attempt for address targets).
    pub fn connect(&mut self, id: ConnId) -> Result<(), NetError> {
        let family = self.config.family;
        let policy = self.config.candidates;
        let conn = self.conns.get_mut(id).ok_or(NetError::InvalidHandle)?;
        match conn.state {
            LoadState::Idle => {}
            state if state.is_terminal() => return Err(NetError::SocketNotConnected),
            _ => return Err(NetError::SocketIsConnected),
        }

        match &conn.target {
            Target::Host { name, .. } => {
                let name = name.clone();
                tracing::debug!(conn = ?id, domain = %name, "resolving host");
                let pool = &self.pool;
                let lookup = self.lookups.try_insert_with_key(|key| {
                    let ticket = pool.submit(key, name, family)?;
                    Ok::<_, NetError>(PendingLookup { owner: LookupOwner::Conn(id), ticket })
                })?;
                conn.lookup = Some(lookup);
                conn.state = LoadState::ResolvingHost;
            }
            Target::Address { addr, port } => {
                conn.job = Some(ConnectJob::new(vec![addr.clone()], *port, policy));
                self.start_attempt(id);
            }
            Target::Adopted => return Err(NetError::SocketIsConnected),
        }
        Ok(())
    }

    /// Closes gracefully: flushes what the socket accepts right now, shuts
    /// down the write side and releases the connection. No event follows.
    pub fn disconnect(&mut self, id: ConnId) -> Result<(), NetError> {
        let conn = self.conns.get_mut(id).ok_or(NetError::InvalidHandle)?;
        if conn.state == LoadState::Connected {
            if let Some(socket) = conn.socket.as_mut() {
                let flush = conn.wqueue.flush(socket);
                tracing::trace!(conn = ?id, completed = flush.completed, "final flush");
                if let Err(e) = socket.shutdown(Shutdown::Write) {
                    tracing::trace!(conn = ?id, error = %e, "shutdown failed");
                }
            }
        }
        self.dispose(id);
        Ok(())
    }

    /// Releases the connection immediately. No event follows; queued lent
    /// buffers are handed back with `Release::Discarded`.
    ///
    /// Returns false if `id` is stale.
    pub fn dispose(&mut self, id: ConnId) -> bool {
        let Some(mut conn) = self.conns.remove(id) else {
            return false;
        };
        tracing::debug!(conn = ?id, state = ?conn.state, "disposing connection");
        release(&mut self.reactor, &mut self.lookups, &mut conn);
        true
    }

    // ===== I/O =====

    /// Arms one read in `mode`. Exactly one READ (or READABLE for
    /// [`ReadMode::Notify`]) answers each call.
    pub fn read(&mut self, id: ConnId, mode: ReadMode) -> Result<(), NetError> {
        let conn = self.conns.get_mut(id).ok_or(NetError::InvalidHandle)?;
        if conn.state != LoadState::Connected {
            return Err(NetError::SocketNotConnected);
        }
        conn.read_mode = Some(mode);
        if conn.has_buffered(mode) {
            self.deferred.push_back(Deferred::Buffered(id));
            return Ok(());
        }
        self.arm(id, true)
    }

    /// Queues `buf` for transmission. One WRITE follows once all of it has
    /// been sent. Writes made before CONNECT are held until then.
    pub fn write(&mut self, id: ConnId, buf: impl Into<WriteBuf>) -> Result<(), NetError> {
        let buf = buf.into();
        let conn = self.conns.get_mut(id).ok_or(NetError::InvalidHandle)?;
        if conn.state.is_terminal() {
            return Err(NetError::SocketNotConnected);
        }
        let was_idle = conn.wqueue.is_empty();
        let len = buf.len();
        let seq = conn.wqueue.push(buf);
        tracing::trace!(conn = ?id, seq, len, "write queued");

        if conn.state == LoadState::Connected && was_idle {
            return self.arm(id, true);
        }
        Ok(())
    }

    /// Asks for one WRITABLE once the write queue is empty and the socket
    /// accepts more bytes.
    pub fn notify_writable(&mut self, id: ConnId) -> Result<(), NetError> {
        let conn = self.conns.get_mut(id).ok_or(NetError::InvalidHandle)?;
        if conn.state != LoadState::Connected {
            return Err(NetError::SocketNotConnected);
        }
        conn.want_writable = true;
        self.arm(id, true)
    }

    /// Arms, rearms (`Some`) or disables (`None`) the connection timer.
    pub fn timeout(&mut self, id: ConnId, after: Option<Duration>) -> Result<(), NetError> {
        let conn = self.conns.get_mut(id).ok_or(NetError::InvalidHandle)?;
        if conn.state.is_terminal() {
            return Err(NetError::SocketNotConnected);
        }
        conn.disarm_timer(&mut self.reactor);
        if let Some(after) = after {
            let timer = self.reactor.add_timer(token_of(id), after);
            conn.timer = Some(ArmedTimer {
                id: timer,
                while_connected: conn.state == LoadState::Connected,
            });
            tracing::trace!(conn = ?id, ?after, "timer armed");
        }
        Ok(())
    }

    /// Syncs the registration from an API call. A registration failure is
    /// returned and also reported to the callback on the next turn.
    fn arm(&mut self, id: ConnId, force: bool) -> Result<(), NetError> {
        let Some(conn) = self.conns.get_mut(id) else {
            return Err(NetError::InvalidHandle);
        };
        if let Err(e) = conn.sync_interest(&mut self.reactor, token_of(id), force) {
            let err = NetError::from_transfer_error(&e);
            self.deferred.push_back(Deferred::Failed(id, err));
            return Err(err);
        }
        Ok(())
    }

    /// Syncs the registration from inside the loop. On failure the
    /// connection is finished with ERROR and false is returned.
    fn rearm(&mut self, id: ConnId, force: bool) -> bool {
        let Some(conn) = self.conns.get_mut(id) else {
            return false;
        };
        match conn.sync_interest(&mut self.reactor, token_of(id), force) {
            Ok(()) => true,
            Err(e) => {
                let err = NetError::from_transfer_error(&e);
                self.finish(id, LoadState::Errored, Event::Error(err));
                false
            }
        }
    }

    // ===== Stand-alone resolution =====

    /// Resolves `host` on a worker thread. `callback` runs exactly once from
    /// a later `turn`, unless the lookup is cancelled first.
    pub fn resolve<F>(&mut self, host: &str, callback: F) -> Result<LookupId, NetError>
    where
        F: FnOnce(&mut Net<R>, Result<Vec<Address>, NetError>) + 'static,
    {
        let name = Name::new(host);
        let family = self.config.family;
        let owner = LookupOwner::Caller(Box::new(callback));
        tracing::debug!(domain = %name, "submitting lookup");
        let pool = &self.pool;
        self.lookups.try_insert_with_key(|key| {
            let ticket = pool.submit(key, name, family)?;
            Ok::<_, NetError>(PendingLookup { owner, ticket })
        })
    }

    /// Cancels a pending lookup; its callback is dropped without running.
    pub fn cancel_lookup(&mut self, id: LookupId) -> bool {
        match self.lookups.remove(id) {
            Some(pending) => {
                pending.ticket.cancel();
                true
            }
            None => false,
        }
    }

    /// Resolves `host` on the calling thread. Blocks.
    pub fn resolve_blocking(&self, host: &str) -> Result<Vec<Address>, NetError> {
        lookup(self.pool.resolver().as_ref(), &Name::new(host), self.config.family)
    }

    pub fn resolver(&self) -> &Arc<dyn Resolve> {
        self.pool.resolver()
    }

    // ===== Introspection =====

    /// Current phase, or `None` for a stale id.
    pub fn state(&self, id: ConnId) -> Option<LoadState> {
        self.conns.get(id).map(|conn| conn.state)
    }

    pub fn peer_addr(&self, id: ConnId) -> Result<SocketAddr, NetError> {
        let conn = self.conns.get(id).ok_or(NetError::InvalidHandle)?;
        match conn.socket.as_ref() {
            Some(socket) if conn.state == LoadState::Connected => {
                socket.peer_addr().transfer_context()
            }
            _ => Err(NetError::SocketNotConnected),
        }
    }

    /// Bytes accepted by `write` but not yet sent.
    pub fn queued_bytes(&self, id: ConnId) -> Option<usize> {
        self.conns.get(id).map(|conn| conn.wqueue.queued_bytes())
    }

    /// The candidate currently being tried, or last tried.
    pub fn current_candidate(&self, id: ConnId) -> Option<Address> {
        self.conns.get(id)?.job.as_ref()?.current().cloned()
    }

    /// Candidates that have not been attempted. Still available while the
    /// ERROR callback runs, so a caller can fail over by hand.
    pub fn remaining_candidates(&self, id: ConnId) -> Vec<Address> {
        self.conns
            .get(id)
            .and_then(|conn| conn.job.as_ref())
            .map(|job| job.remaining().to_vec())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.len()
    }

    /// True when nothing is left that could produce an event.
    pub fn is_idle(&self) -> bool {
        self.conns.is_empty() && self.lookups.is_empty() && self.deferred.is_empty()
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn reactor(&self) -> &R {
        &self.reactor
    }

    pub fn reactor_mut(&mut self) -> &mut R {
        &mut self.reactor
    }

    // ===== Loop =====

    /// Runs one loop iteration, waiting up to `timeout` for something to
    /// happen. Returns how many items were dispatched.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<usize, NetError> {
        let timeout = if self.deferred.is_empty() && !self.pool.has_completions() {
            timeout
        } else {
            Some(Duration::ZERO)
        };

        let mut ready = mem::take(&mut self.ready);
        ready.clear();
        if let Err(e) = self.reactor.poll(&mut ready, timeout) {
            self.ready = ready;
            tracing::warn!(error = %e, "poll failed");
            return Err(NetError::from_transfer_error(&e));
        }

        let mut dispatched = 0;
        while let Some(done) = self.pool.try_complete() {
            self.on_lookup_done(done.key, done.result);
            dispatched += 1;
        }

        // Work deferred by callbacks below waits for the next turn.
        for _ in 0..self.deferred.len() {
            let Some(item) = self.deferred.pop_front() else {
                break;
            };
            self.run_deferred(item);
            dispatched += 1;
        }

        for item in ready.drain(..) {
            match item {
                Ready::Io { token, readable, writable } => {
                    self.on_io(conn_of(token), readable, writable)
                }
                Ready::Timer { token, timer } => self.on_timer(conn_of(token), timer),
            }
            dispatched += 1;
        }
        self.ready = ready;
        Ok(dispatched)
    }

    /// Turns until no connection, lookup or deferred work is left.
    pub fn run(&mut self) -> Result<(), NetError> {
        while !self.is_idle() {
            self.turn(None)?;
        }
        Ok(())
    }

    // ===== Dispatch =====

    /// Delivers `event` to the connection's callback. Returns false if the
    /// connection no longer exists afterwards.
    fn emit(&mut self, id: ConnId, event: Event) -> bool {
        let Some(mut callback) = self.conns.get_mut(id).and_then(|conn| conn.callback.take())
        else {
            return false;
        };
        tracing::trace!(conn = ?id, ?event, "dispatching event");
        callback(self, id, event);
        match self.conns.get_mut(id) {
            Some(conn) => {
                conn.callback = Some(callback);
                true
            }
            None => false,
        }
    }

    /// Delivers the terminal event once and removes the connection.
    fn finish(&mut self, id: ConnId, state: LoadState, event: Event) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        if conn.state.is_terminal() {
            return;
        }
        tracing::debug!(conn = ?id, from = ?conn.state, to = ?state, "connection finished");
        conn.state = state;
        release(&mut self.reactor, &mut self.lookups, conn);
        self.emit(id, event);
        self.conns.remove(id);
    }

    fn run_deferred(&mut self, item: Deferred) {
        match item {
            Deferred::Failed(id, err) => self.finish(id, LoadState::Errored, Event::Error(err)),
            Deferred::Connected(id) => {
                if self.state(id) == Some(LoadState::Connected) && self.rearm(id, false) {
                    self.emit(id, Event::Connect);
                }
            }
            Deferred::Buffered(id) => self.deliver_buffered(id),
        }
    }

    fn deliver_buffered(&mut self, id: ConnId) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        if conn.state != LoadState::Connected {
            return;
        }
        let Some(mode) = conn.read_mode else {
            return;
        };

        if mode == ReadMode::Notify {
            if conn.rbuf.is_empty() {
                self.rearm(id, true);
                return;
            }
            conn.read_mode = None;
            if self.rearm(id, false) {
                self.emit(id, Event::Readable);
            }
            return;
        }

        match conn.rbuf.take(mode) {
            Ok(Some(record)) => {
                conn.read_mode = None;
                if self.rearm(id, false) {
                    self.emit(id, Event::Read(record));
                }
            }
            Ok(None) => {
                self.rearm(id, true);
            }
            Err(err) => self.finish(id, LoadState::Errored, Event::Error(err)),
        }
    }

    fn on_lookup_done(&mut self, key: LookupId, result: Result<Vec<Address>, NetError>) {
        let Some(pending) = self.lookups.remove(key) else {
            tracing::trace!(lookup = ?key, "dropping stale lookup result");
            return;
        };
        if pending.ticket.is_cancelled() {
            return;
        }
        match pending.owner {
            LookupOwner::Caller(callback) => callback(self, result),
            LookupOwner::Conn(id) => self.on_resolved(id, key, result),
        }
    }

    fn on_resolved(&mut self, id: ConnId, key: LookupId, result: Result<Vec<Address>, NetError>) {
        let policy = self.config.candidates;
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        if conn.state != LoadState::ResolvingHost || conn.lookup != Some(key) {
            return;
        }
        conn.lookup = None;

        match result {
            Ok(candidates) if !candidates.is_empty() => {
                tracing::debug!(conn = ?id, count = candidates.len(), "host resolved");
                let port = conn.target.port();
                conn.job = Some(ConnectJob::new(candidates, port, policy));
                self.start_attempt(id);
            }
            Ok(_) => self.finish(id, LoadState::Errored, Event::Error(NetError::NameNotResolved)),
            Err(err) => {
                tracing::debug!(conn = ?id, error = %err, "resolution failed");
                self.finish(id, LoadState::Errored, Event::Error(err))
            }
        }
    }

    /// Opens a socket to the current candidate and watches it for
    /// writability. Synchronous failures are reported on the next turn.
    fn start_attempt(&mut self, id: ConnId) {
        let token = token_of(id);
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        let Some(job) = conn.job.as_mut() else {
            return;
        };
        conn.state = LoadState::Connecting;

        let reactor = &mut self.reactor;
        let opened = job.attempt(reactor).and_then(|mut socket| {
            reactor.register(&mut socket, token, Interest::WRITABLE).connect_context()?;
            Ok(socket)
        });
        match opened {
            Ok(socket) => {
                conn.socket = Some(socket);
                conn.registered = Interest::WRITABLE;
            }
            Err(err) => self.deferred.push_back(Deferred::Failed(id, err)),
        }
    }

    fn on_connect_failed(&mut self, id: ConnId, err: NetError) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        conn.close_socket(&mut self.reactor);
        let retry = conn.job.as_mut().is_some_and(|job| job.advance());
        if retry {
            tracing::debug!(conn = ?id, error = %err, "trying next candidate");
            self.start_attempt(id);
        } else {
            self.finish(id, LoadState::Errored, Event::Error(err));
        }
    }

    fn on_connect_ready(&mut self, id: ConnId) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        let Some(socket) = conn.socket.as_ref() else {
            return;
        };
        let outcome = match socket.take_error() {
            Ok(Some(e)) | Err(e) => Err(NetError::from_connect_error(&e)),
            Ok(None) => match socket.peer_addr() {
                Ok(peer) => Ok(peer),
                // Spurious wake-up; the handshake is still running.
                Err(e) if e.kind() == io::ErrorKind::NotConnected => return,
                Err(e) => Err(NetError::from_connect_error(&e)),
            },
        };

        match outcome {
            Ok(peer) => {
                conn.state = LoadState::Connected;
                tracing::debug!(conn = ?id, %peer, "connected");
                // Re-arm so writes queued before the handshake see a fresh edge.
                if self.rearm(id, true) {
                    self.emit(id, Event::Connect);
                }
            }
            Err(err) => self.on_connect_failed(id, err),
        }
    }

    fn on_io(&mut self, id: ConnId, readable: bool, writable: bool) {
        match self.state(id) {
            Some(LoadState::Connecting) if writable => self.on_connect_ready(id),
            Some(LoadState::Connected) => {
                if readable {
                    self.on_readable(id);
                }
                if writable && self.state(id) == Some(LoadState::Connected) {
                    self.on_writable(id);
                }
            }
            _ => {}
        }
    }

    fn on_readable(&mut self, id: ConnId) {
        let chunk = self.config.read_chunk_size;
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        let Some(mode) = conn.read_mode else {
            return;
        };

        if mode == ReadMode::Notify {
            conn.read_mode = None;
            if self.rearm(id, false) {
                self.emit(id, Event::Readable);
            }
            return;
        }

        let Some(socket) = conn.socket.as_mut() else {
            return;
        };
        let inbound = loop {
            match conn.rbuf.take(mode) {
                Ok(Some(record)) => break Inbound::Record(record),
                Ok(None) => {}
                Err(err) => break Inbound::Failed(err),
            }
            match conn.rbuf.fill(socket, chunk) {
                Ok(0) => break Inbound::Eof,
                Ok(n) => tracing::trace!(conn = ?id, bytes = n, "received"),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Inbound::Pending,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Inbound::Failed(NetError::from_transfer_error(&e)),
            }
        };

        match inbound {
            Inbound::Pending => {
                tracing::trace!(conn = ?id, buffered = conn.rbuf.len(), "waiting for more input");
            }
            Inbound::Record(record) => {
                conn.read_mode = None;
                if self.rearm(id, false) {
                    self.emit(id, Event::Read(record));
                }
            }
            Inbound::Eof => {
                conn.read_mode = None;
                let rest = conn.rbuf.take_remainder();
                tracing::debug!(conn = ?id, "peer closed");
                if let Some(rest) = rest {
                    if !self.emit(id, Event::Read(rest)) {
                        return;
                    }
                }
                self.finish(id, LoadState::Closed, Event::Close);
            }
            Inbound::Failed(err) => self.finish(id, LoadState::Errored, Event::Error(err)),
        }
    }

    fn on_writable(&mut self, id: ConnId) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        let Some(socket) = conn.socket.as_mut() else {
            return;
        };
        let flush = conn.wqueue.flush(socket);
        tracing::trace!(
            conn = ?id,
            completed = flush.completed,
            blocked = flush.blocked,
            pending = conn.wqueue.len(),
            queued = conn.wqueue.queued_bytes(),
            "flushed"
        );

        for _ in 0..flush.completed {
            if !self.emit(id, Event::Write) {
                return;
            }
        }
        if let Some(e) = flush.error {
            let err = NetError::from_transfer_error(&e);
            self.finish(id, LoadState::Errored, Event::Error(err));
            return;
        }

        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        if conn.state != LoadState::Connected {
            return;
        }
        if conn.want_writable && conn.wqueue.is_empty() {
            conn.want_writable = false;
            if self.rearm(id, false) {
                self.emit(id, Event::Writable);
            }
        } else {
            self.rearm(id, false);
        }
    }

    fn on_timer(&mut self, id: ConnId, timer: TimerId) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        let Some(armed) = conn.timer.filter(|armed| armed.id == timer) else {
            return;
        };
        conn.timer = None;
        if conn.state == LoadState::Connected && !armed.while_connected {
            tracing::trace!(conn = ?id, "ignoring timer armed before connect");
            return;
        }
        tracing::debug!(conn = ?id, state = ?conn.state, "timer fired");
        self.finish(id, LoadState::TimedOut, Event::Timeout);
    }
}

impl<R: Reactor> Drop for Net<R> {
    fn drop(&mut self) {
        for (_, pending) in self.lookups.drain() {
            pending.ticket.cancel();
        }
    }
}

/// Detaches everything a connection holds: socket, timer, lookup, watches
/// and queued writes.
fn release<R: Reactor>(
    reactor: &mut R,
    lookups: &mut SlotMap<LookupId, PendingLookup<R>>,
    conn: &mut Connection<R>,
) {
    conn.close_socket(reactor);
    conn.disarm_timer(reactor);
    if let Some(key) = conn.lookup.take() {
        if let Some(pending) = lookups.remove(key) {
            pending.ticket.cancel();
        }
    }
    conn.read_mode = None;
    conn.want_writable = false;
    conn.wqueue.discard();
}

impl<R: Reactor> std::fmt::Debug for Net<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Net")
            .field("connections", &self.conns.len())
            .field("lookups", &self.lookups.len())
            .field("deferred", &self.deferred.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let mut arena: SlotMap<ConnId, ()> = SlotMap::with_key();
        let first = arena.insert(());
        arena.remove(first);
        let second = arena.insert(());

        assert_eq!(conn_of(token_of(first)), first);
        assert_eq!(conn_of(token_of(second)), second);
        assert_ne!(token_of(first), token_of(second));
        assert!(arena.get(conn_of(token_of(first))).is_none());
    }

    #[test]
    fn test_terminal_events() {
        assert!(Event::Close.is_terminal());
        assert!(Event::Timeout.is_terminal());
        assert!(Event::Error(NetError::ConnectionReset).is_terminal());
        assert!(!Event::Connect.is_terminal());
        assert!(!Event::Read(Bytes::from_static(b"x")).is_terminal());
        assert!(!Event::Writable.is_terminal());
    }
}
