use std::fmt;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Offline,
    Connecting,
    Parameterizing,
    Running,
    /// Application ready acknowledged by the device. The simulated phase
    /// progression stops at `Running` and never enters it.
    AppReady,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Offline => "offline",
            SessionState::Connecting => "connecting",
            SessionState::Parameterizing => "parameterizing",
            SessionState::Running => "running",
            SessionState::AppReady => "app-ready",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Log(String),
}

/// Receives the notifications of a [`ConnectionSession`](super::ConnectionSession).
pub trait SessionObserver: Send {
    fn state_changed(&mut self, from: SessionState, to: SessionState);

    fn log_event(&mut self, _message: &str) {}
}

impl SessionObserver for Sender<SessionEvent> {
    fn state_changed(&mut self, from: SessionState, to: SessionState) {
        // A dropped receiver only means nobody listens anymore.
        let _ = self.send(SessionEvent::StateChanged { from, to });
    }

    fn log_event(&mut self, message: &str) {
        let _ = self.send(SessionEvent::Log(message.to_owned()));
    }
}
