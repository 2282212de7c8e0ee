use crate::{error::ClientError, types::ConnectionState};

/// Outcome of a `connect` request against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttempt {
    /// A new transport open should proceed.
    Proceed,
    /// A connection attempt or live connection already exists; the request
    /// is a no-op (idempotent reconnect guard), never an error.
    AlreadyActive,
}

/// Connection lifecycle state machine.
///
/// Drives connect -> authenticate -> ready, collapses everything to
/// `Closed` on transport loss, and never reconnects on its own:
/// reconnection is the caller re-issuing `connect` with a token.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
        }
    }
}

impl ConnectionStateMachine {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Request a new connection.
    ///
    /// Permitted from `Disconnected` and `Closed`; while an attempt or a
    /// live connection exists the request is ignored, preventing duplicate
    /// sockets.
    pub fn connect(&mut self) -> ConnectAttempt {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Closed => {
                self.state = ConnectionState::Connecting;
                ConnectAttempt::Proceed
            }
            ConnectionState::Connecting
            | ConnectionState::Authenticating
            | ConnectionState::Ready => ConnectAttempt::AlreadyActive,
        }
    }

    /// The transport reported open; the auth handshake starts now.
    pub fn on_transport_open(&mut self) -> Result<ConnectionState, ClientError> {
        self.transition_from_state(
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            "transport_open",
        )
    }

    /// The server answered the auth handshake.
    ///
    /// Success makes the connection `Ready`; rejection is terminal for the
    /// session and returns to `Disconnected`.
    pub fn on_auth_status(&mut self, success: bool) -> Result<ConnectionState, ClientError> {
        if self.state != ConnectionState::Authenticating {
            return Err(ClientError::invalid_state(self.state, "auth_status"));
        }

        self.state = if success {
            ConnectionState::Ready
        } else {
            ConnectionState::Disconnected
        };
        Ok(self.state)
    }

    /// The transport closed or errored.
    ///
    /// Connecting/Authenticating/Ready all collapse to `Closed`; in
    /// `Disconnected` or `Closed` the signal carries no transition and
    /// `None` is returned.
    pub fn on_transport_closed(&mut self) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Connecting
            | ConnectionState::Authenticating
            | ConnectionState::Ready => {
                self.state = ConnectionState::Closed;
                Some(ConnectionState::Closed)
            }
            ConnectionState::Disconnected | ConnectionState::Closed => None,
        }
    }

    fn transition_from_state(
        &mut self,
        expected: ConnectionState,
        next: ConnectionState,
        action: &str,
    ) -> Result<ConnectionState, ClientError> {
        if self.state != expected {
            return Err(ClientError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_happy_path_state_transitions() {
        let mut sm = ConnectionStateMachine::default();
        assert_eq!(sm.state(), ConnectionState::Disconnected);

        assert_eq!(sm.connect(), ConnectAttempt::Proceed);
        assert_eq!(sm.state(), ConnectionState::Connecting);

        sm.on_transport_open().expect("open should be accepted");
        assert_eq!(sm.state(), ConnectionState::Authenticating);

        sm.on_auth_status(true).expect("auth should resolve");
        assert_eq!(sm.state(), ConnectionState::Ready);
    }

    #[test]
    fn connect_is_idempotent_while_active() {
        let mut sm = ConnectionStateMachine::default();
        sm.connect();
        assert_eq!(sm.connect(), ConnectAttempt::AlreadyActive);

        sm.on_transport_open().expect("open should be accepted");
        assert_eq!(sm.connect(), ConnectAttempt::AlreadyActive);
        assert_eq!(sm.state(), ConnectionState::Authenticating);

        sm.on_auth_status(true).expect("auth should resolve");
        assert_eq!(sm.connect(), ConnectAttempt::AlreadyActive);
        assert_eq!(sm.state(), ConnectionState::Ready);
    }

    #[test]
    fn auth_rejection_returns_to_disconnected() {
        let mut sm = ConnectionStateMachine::default();
        sm.connect();
        sm.on_transport_open().expect("open should be accepted");

        let next = sm.on_auth_status(false).expect("rejection should resolve");
        assert_eq!(next, ConnectionState::Disconnected);
        assert_eq!(sm.connect(), ConnectAttempt::Proceed);
    }

    #[test]
    fn any_active_state_collapses_to_closed() {
        for advance in 0..3 {
            let mut sm = ConnectionStateMachine::default();
            sm.connect();
            if advance >= 1 {
                sm.on_transport_open().expect("open should be accepted");
            }
            if advance >= 2 {
                sm.on_auth_status(true).expect("auth should resolve");
            }

            assert_eq!(sm.on_transport_closed(), Some(ConnectionState::Closed));
            assert_eq!(sm.state(), ConnectionState::Closed);
            assert_eq!(sm.on_transport_closed(), None);
        }
    }

    #[test]
    fn closed_accepts_a_fresh_connect() {
        let mut sm = ConnectionStateMachine::default();
        sm.connect();
        sm.on_transport_closed();

        assert_eq!(sm.connect(), ConnectAttempt::Proceed);
        assert_eq!(sm.state(), ConnectionState::Connecting);
    }

    #[test]
    fn rejects_auth_status_outside_handshake() {
        let mut sm = ConnectionStateMachine::default();
        let err = sm
            .on_auth_status(true)
            .expect_err("auth status should fail before handshake");
        assert_eq!(err.code, "invalid_state_transition");

        let err = sm
            .on_transport_open()
            .expect_err("open should fail before connect");
        assert_eq!(err.code, "invalid_state_transition");
    }
}
