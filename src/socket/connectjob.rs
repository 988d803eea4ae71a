use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::config::CandidatePolicy;
use crate::dns::Address;
use crate::reactor::Reactor;

/// Manages the connect phase over a list of resolved candidates.
/// Roughly equivalent to net::TransportConnectJob, minus the racing.
///
/// The cursor only moves forward. Under `CandidatePolicy::FirstOnly` it
/// never moves at all: one attempt per `connect` call.
#[derive(Debug)]
pub(crate) struct ConnectJob {
    candidates: Vec<Address>,
    cursor: usize,
    port: u16,
    policy: CandidatePolicy,
}

impl ConnectJob {
    pub(crate) fn new(candidates: Vec<Address>, port: u16, policy: CandidatePolicy) -> Self {
        Self { candidates, cursor: 0, port, policy }
    }

    pub(crate) fn current(&self) -> Option<&Address> {
        self.candidates.get(self.cursor)
    }

    /// Candidates after the current one.
    pub(crate) fn remaining(&self) -> &[Address] {
        self.candidates.get(self.cursor + 1..).unwrap_or(&[])
    }

    /// Moves to the next candidate if the policy allows another attempt.
    pub(crate) fn advance(&mut self) -> bool {
        if self.policy == CandidatePolicy::Sequential && self.cursor + 1 < self.candidates.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Opens a non-blocking socket towards the current candidate.
    ///
    /// Synchronous failures advance the cursor when the policy allows it;
    /// the error of the last attempted candidate is returned otherwise.
    pub(crate) fn attempt<R: Reactor>(&mut self, reactor: &mut R) -> Result<R::Socket, NetError> {
        loop {
            let addr = self.current().ok_or(NetError::NameNotResolved)?.socket_addr(self.port);
            tracing::debug!(%addr, attempt = self.cursor + 1, total = self.candidates.len(), "connecting");

            match reactor.connect(addr).connect_context() {
                Ok(socket) => return Ok(socket),
                Err(err) => {
                    tracing::debug!(%addr, error = %err, "connect attempt failed");
                    if !self.advance() {
                        return Err(err);
                    }
                }
            }
        }
    }
}
