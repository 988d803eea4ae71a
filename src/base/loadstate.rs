/// The lifecycle phase of a connection.
/// This roughly matches net/base/load_states.h, extended with the
/// terminal phases a connection can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// Created, `connect` not called yet.
    #[default]
    Idle,

    /// Resolving the host.
    ResolvingHost,

    /// Connecting to the host (TCP handshake).
    Connecting,

    /// Established; reads and writes are allowed.
    Connected,

    /// The peer closed the stream.
    Closed,

    /// A resolve, connect or transfer error ended the connection.
    Errored,

    /// The connection timer fired before the awaited phase completed.
    TimedOut,
}

impl LoadState {
    /// Returns true for `Closed`, `Errored` and `TimedOut`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Closed | LoadState::Errored | LoadState::TimedOut)
    }
}
