//! Consecutive failed-login counting with a temporary block.
//!
//! `Open` (attempts below the limit) -> `Blocked` once the limit is reached,
//! for a fixed window. The first attempt after the window releases the block
//! and the credentials are then evaluated normally.
//!
//! The counter is read, changed and written back by the login flow without
//! any coordination: two concurrent failures for one user may both start
//! from the same count and undercount. Best effort only.

use time::{Duration, OffsetDateTime};

use crate::{config::SecurityConfig, error::AppError, users::repo_types::User};

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: i32,
    pub window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from(&SecurityConfig::default())
    }
}

impl From<&SecurityConfig> for LockoutPolicy {
    fn from(cfg: &SecurityConfig) -> Self {
        Self {
            max_attempts: cfg.max_login_attempts.max(1),
            window: Duration::minutes(cfg.lockout_minutes),
        }
    }
}

impl LockoutPolicy {
    /// Gate run before the password is checked.
    ///
    /// Returns `Ok(true)` when an expired block was released and the user
    /// must be persisted.
    pub fn admit(&self, user: &mut User, now: OffsetDateTime) -> Result<bool, AppError> {
        if !user.blocked {
            return Ok(false);
        }
        match user.block_expires_at {
            Some(until) if now < until => {
                let remaining_ms = (until - now).whole_milliseconds() as i64;
                Err(AppError::Locked {
                    minutes: remaining_ms / 60_000,
                    seconds: remaining_ms % 60_000 / 1_000,
                })
            }
            _ => {
                release(user);
                Ok(true)
            }
        }
    }

    /// Counts a failed attempt. Returns true when this attempt blocked the user.
    pub fn record_failure(&self, user: &mut User, now: OffsetDateTime) -> bool {
        user.login_attempts += 1;
        if user.login_attempts >= self.max_attempts {
            user.blocked = true;
            user.block_expires_at = Some(now + self.window);
            return true;
        }
        false
    }

    /// Returns true when state changed and must be persisted.
    pub fn record_success(&self, user: &mut User) -> bool {
        if user.login_attempts == 0 && !user.blocked {
            return false;
        }
        release(user);
        true
    }
}

fn release(user: &mut User) {
    user.blocked = false;
    user.login_attempts = 0;
    user.block_expires_at = None;
}
