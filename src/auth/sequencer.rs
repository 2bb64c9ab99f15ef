use std::time::Duration;

use super::challenge::{AuthChallenge, AuthError};
use super::inbox::Inbox;
use crate::activity::Reporter;
use crate::config::{AutoAuthConfig, ChallengePatterns};
use crate::transport::Session;

/// Register, then log in, with the same password.
///
/// Both exchanges go through the session's [`Inbox`], so they are serialized
/// against anything else waiting on the message stream.
#[derive(Clone)]
pub struct AuthSequencer {
    register: ChallengePatterns,
    login: ChallengePatterns,
    timeout: Duration,
}

impl AuthSequencer {
    pub fn new(register: ChallengePatterns, login: ChallengePatterns, timeout: Duration) -> Self {
        Self {
            register,
            login,
            timeout,
        }
    }

    pub fn from_config(config: &AutoAuthConfig) -> Self {
        Self::new(
            config.register.clone(),
            config.login.clone(),
            config.timeout(),
        )
    }

    pub fn register_challenge(&self, password: &str) -> AuthChallenge {
        AuthChallenge::new(
            "register",
            format!("/register {} {}", password, password),
            self.timeout,
        )
        .with_success(self.register.success.iter().cloned())
        .with_failure(self.register.failure.iter().cloned())
    }

    pub fn login_challenge(&self, password: &str) -> AuthChallenge {
        AuthChallenge::new("login", format!("/login {}", password), self.timeout)
            .with_success(self.login.success.iter().cloned())
            .with_failure(self.login.failure.iter().cloned())
    }

    /// Stops at the first failure; login is never attempted after a failed registration.
    pub async fn authenticate(
        &self,
        session: &dyn Session,
        inbox: &Inbox,
        report: &Reporter,
        password: &str,
    ) -> Result<(), AuthError> {
        self.register_challenge(password)
            .run(session, inbox, report)
            .await?;
        report.info("Registration confirmed");

        self.login_challenge(password)
            .run(session, inbox, report)
            .await?;
        report.info("Login successful");

        Ok(())
    }
}
