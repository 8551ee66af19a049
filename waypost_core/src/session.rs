//! Recognition session bookkeeping: provider support, authorization, runtime faults.
//!
//! The provider itself is a black box behind [`RecognitionProvider`]; this
//! module only turns what it reports into the [`ErrorState`] shown to the
//! visitor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

/// Lifecycle of the immersive space hosting the experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImmersiveSpaceState {
    #[default]
    Closed,
    InTransition,
    Open,
}

/// Answer to a world-sensing authorization query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    /// The provider will prompt when the session runs
    NotDetermined,
    Allowed,
    Denied,
}

/// Data provider state as reported by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderState {
    Initialized,
    Running,
    Paused,
    Stopped,
}

/// A runtime error reported by the provider.
///
/// Two faults are the same error if their codes match; the message is
/// informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFault {
    pub code: i32,
    pub message: String,
}

impl SessionFault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl PartialEq for SessionFault {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for SessionFault {}

impl fmt::Display for SessionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session error {}: {}", self.code, self.message)
    }
}

/// What the main window tells the visitor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorState {
    #[default]
    NoError,
    ProviderNotSupported,
    ProviderNotAuthorized,
    SessionError(SessionFault),
}

impl ErrorState {
    pub fn is_error(&self) -> bool {
        *self != ErrorState::NoError
    }
}

/// Session-level notifications, delivered in order alongside anchor events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    AuthorizationChanged(AuthorizationStatus),
    DataProviderStateChanged {
        state: ProviderState,
        error: Option<SessionFault>,
    },
}

/// The image-recognition provider.
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Whether the platform can recognise images at all.
    fn is_supported(&self) -> bool;

    async fn query_authorization(&self) -> AuthorizationStatus;

    /// Starts recognition. Mid-session faults arrive as [`SessionEvent`]s.
    async fn run(&self) -> Result<(), SessionFault>;
}

/// Process-wide session state, owned by the runtime.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    immersive_space: ImmersiveSpaceState,
    error: ErrorState,
    start_requested: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks support and authorization, then runs the provider.
    ///
    /// Returns `true` if the provider was started.
    pub async fn start<P>(&mut self, provider: &P) -> bool
    where
        P: RecognitionProvider + ?Sized,
    {
        if !provider.is_supported() {
            warn!("image recognition not supported on this device");
            self.error = ErrorState::ProviderNotSupported;
            return false;
        }

        if provider.query_authorization().await == AuthorizationStatus::Denied {
            warn!("world sensing authorization denied");
            self.error = ErrorState::ProviderNotAuthorized;
            return false;
        }

        if let Err(fault) = provider.run().await {
            // the same fault is delivered again as a session event
            warn!(%fault, "provider failed to start");
        }
        info!("recognition session running");
        true
    }

    /// Applies one session notification.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::AuthorizationChanged(status) => {
                info!(?status, "authorization changed");
                if status == AuthorizationStatus::Denied {
                    self.error = ErrorState::ProviderNotAuthorized;
                }
            }
            SessionEvent::DataProviderStateChanged { state, error } => {
                info!(?state, "data provider state changed");
                if let Some(fault) = error {
                    error!(%fault, "data provider reached an error state");
                    self.error = ErrorState::SessionError(fault);
                }
            }
        }
    }

    pub fn set_immersive_space(&mut self, state: ImmersiveSpaceState) {
        self.immersive_space = state;
    }

    /// The visitor pressed the start button under a poster.
    pub fn request_start(&mut self) {
        self.start_requested = true;
    }

    pub fn immersive_space(&self) -> ImmersiveSpaceState {
        self.immersive_space
    }

    pub fn error(&self) -> &ErrorState {
        &self.error
    }

    pub fn start_requested(&self) -> bool {
        self.start_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeProvider {
        supported: bool,
        status: AuthorizationStatus,
        ran: AtomicBool,
    }

    impl FakeProvider {
        fn new(supported: bool, status: AuthorizationStatus) -> Self {
            Self {
                supported,
                status,
                ran: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl RecognitionProvider for FakeProvider {
        fn is_supported(&self) -> bool {
            self.supported
        }

        async fn query_authorization(&self) -> AuthorizationStatus {
            self.status
        }

        async fn run(&self) -> Result<(), SessionFault> {
            self.ran.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        let provider = FakeProvider::new(false, AuthorizationStatus::Allowed);
        let mut session = SessionState::new();
        assert!(!session.start(&provider).await);
        assert_eq!(session.error(), &ErrorState::ProviderNotSupported);
        assert!(!provider.ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_denied_authorization() {
        let provider = FakeProvider::new(true, AuthorizationStatus::Denied);
        let mut session = SessionState::new();
        assert!(!session.start(&provider).await);
        assert_eq!(session.error(), &ErrorState::ProviderNotAuthorized);
    }

    #[tokio::test]
    async fn test_not_determined_still_runs() {
        let provider = FakeProvider::new(true, AuthorizationStatus::NotDetermined);
        let mut session = SessionState::new();
        assert!(session.start(&provider).await);
        assert!(provider.ran.load(Ordering::SeqCst));
        assert!(!session.error().is_error());
    }

    #[test]
    fn test_session_error_overwrites() {
        let mut session = SessionState::new();
        session.apply(SessionEvent::AuthorizationChanged(AuthorizationStatus::Denied));
        assert_eq!(session.error(), &ErrorState::ProviderNotAuthorized);

        session.apply(SessionEvent::DataProviderStateChanged {
            state: ProviderState::Stopped,
            error: Some(SessionFault::new(101, "sensor failure")),
        });
        assert_eq!(
            session.error(),
            &ErrorState::SessionError(SessionFault::new(101, "different text"))
        );

        // state changes without an error leave it alone
        session.apply(SessionEvent::DataProviderStateChanged {
            state: ProviderState::Running,
            error: None,
        });
        assert!(session.error().is_error());
    }

    #[test]
    fn test_allowed_does_not_clear_error() {
        let mut session = SessionState::new();
        session.apply(SessionEvent::AuthorizationChanged(AuthorizationStatus::Denied));
        session.apply(SessionEvent::AuthorizationChanged(AuthorizationStatus::Allowed));
        assert_eq!(session.error(), &ErrorState::ProviderNotAuthorized);
    }
}
