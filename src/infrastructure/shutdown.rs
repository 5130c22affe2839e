//! Process shutdown signals
//!
//! ctrl-c everywhere, plus SIGTERM on unix, which is what process managers
//! and container runtimes send. Either one starts the drain path.

use crate::{IngestError, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("ctrl-c"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Installed signal handlers
///
/// Handlers are registered by `install`, so a signal that arrives before
/// `recv` is polled is still delivered.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

fn handler_error(e: std::io::Error) -> IngestError {
    IngestError::Task(format!("signal handler: {}", e))
}

#[cfg(unix)]
impl ShutdownSignal {
    /// Must be called from within a tokio runtime.
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        let terminate = signal(SignalKind::terminate()).map_err(handler_error)?;
        Ok(Self { terminate })
    }

    /// Wait for the first shutdown signal
    pub async fn recv(&mut self) -> Result<ShutdownCause> {
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => {
                interrupted.map_err(handler_error)?;
                Ok(ShutdownCause::Interrupt)
            }
            _ = self.terminate.recv() => Ok(ShutdownCause::Terminate),
        }
    }
}

#[cfg(not(unix))]
impl ShutdownSignal {
    pub fn install() -> Result<Self> {
        Ok(Self {})
    }

    pub async fn recv(&mut self) -> Result<ShutdownCause> {
        tokio::signal::ctrl_c().await.map_err(handler_error)?;
        Ok(ShutdownCause::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cause_display() {
        assert_eq!(ShutdownCause::Interrupt.to_string(), "ctrl-c");
        assert_eq!(ShutdownCause::Terminate.to_string(), "SIGTERM");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_is_caught_not_fatal() {
        let mut signal = ShutdownSignal::install().unwrap();

        let status = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(std::process::id().to_string())
            .status()
            .unwrap();
        assert!(status.success());

        let cause = tokio::time::timeout(Duration::from_secs(5), signal.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cause, ShutdownCause::Terminate);
    }
}
