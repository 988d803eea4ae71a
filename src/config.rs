//! Engine configuration.
//!
//! [`NetConfig`] carries every knob the engine reads: the address-family
//! preference handed to each resolution, the candidate fail-over policy and
//! the buffer limits used by the read path. It is plain data and can be
//! loaded from JSON.

use crate::base::neterror::NetError;
use crate::dns::AddressFamily;
use serde::{Deserialize, Serialize};

/// What the engine does when connecting to a candidate address fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// Attempt only the first candidate and report the failure.
    ///
    /// The untried candidates stay available through
    /// [`Net::remaining_candidates`](crate::Net::remaining_candidates) while
    /// the error callback runs.
    #[default]
    FirstOnly,
    /// Walk the candidate list in order, reporting only the last failure.
    Sequential,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Address-family preference applied to every forward lookup.
    pub family: AddressFamily,

    /// Fail-over behavior across resolved candidates.
    pub candidates: CandidatePolicy,

    /// Upper bound on bytes pulled from the socket per readiness event.
    pub read_chunk_size: usize,

    /// Longest record accepted in line/delimited mode before failing.
    pub max_line_length: usize,

    /// Resolver threads kept alive when idle. More are added while all are busy.
    pub resolver_threads: usize,

    /// Capacity of the reactor's readiness buffer.
    pub events_capacity: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            family: AddressFamily::default(),
            candidates: CandidatePolicy::default(),
            read_chunk_size: 16 * 1024,
            max_line_length: 64 * 1024,
            resolver_threads: 2,
            events_capacity: 1024,
        }
    }
}

impl NetConfig {
    pub fn builder() -> NetConfigBuilder {
        NetConfigBuilder::new()
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        let config: NetConfig = serde_json::from_str(json).map_err(|e| {
            tracing::warn!(error = %e, "invalid engine configuration");
            NetError::InvalidArgument
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero limits. `Net::new` runs this on every configuration,
    /// including ones built from the public fields directly.
    pub fn validate(&self) -> Result<(), NetError> {
        let limits = [
            ("read_chunk_size", self.read_chunk_size),
            ("max_line_length", self.max_line_length),
            ("resolver_threads", self.resolver_threads),
            ("events_capacity", self.events_capacity),
        ];
        if let Some((field, _)) = limits.iter().find(|(_, value)| *value == 0) {
            tracing::warn!(field = *field, "engine configuration limit must be non-zero");
            return Err(NetError::InvalidArgument);
        }
        Ok(())
    }
}

/// Builder for `NetConfig`.
#[must_use]
#[derive(Debug, Clone)]
pub struct NetConfigBuilder {
    config: NetConfig,
}

impl Default for NetConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetConfigBuilder {
    pub fn new() -> Self {
        Self { config: NetConfig::default() }
    }

    pub fn family(mut self, family: AddressFamily) -> Self {
        self.config.family = family;
        self
    }

    pub fn candidates(mut self, policy: CandidatePolicy) -> Self {
        self.config.candidates = policy;
        self
    }

    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size.max(1);
        self
    }

    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.max_line_length = len.max(1);
        self
    }

    pub fn resolver_threads(mut self, threads: usize) -> Self {
        self.config.resolver_threads = threads.max(1);
        self
    }

    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.config.events_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> NetConfig {
        self.config
    }
}
