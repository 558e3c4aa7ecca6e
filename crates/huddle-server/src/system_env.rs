//! Production Environment implementation using system time and RNG.
//!
//! # Capabilities
//!
//! - Real wall-clock time that advances naturally
//! - OS cryptographic RNG (getrandom). Truly random, not reproducible
//!
//! Production behavior is therefore non-deterministic; tests drive the core
//! with seeded environments instead.

use huddle_core::Environment;

/// Production environment using the system clock and cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness
/// (e.g., /dev/urandom on Linux, `BCryptGenRandom` on Windows). Suitable
/// for room codes, salts, and token keys.
///
/// # Panics
///
/// Panics if the OS RNG fails. This is intentional - a server without
/// functioning cryptographic randomness cannot operate securely, and RNG
/// failure indicates OS-level issues.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_millis() as u64
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - server cannot operate securely");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_past_2023() {
        let env = SystemEnv::new();
        assert!(env.now_millis() > 1_600_000_000_000);
    }

    #[test]
    fn random_bytes_are_random() {
        let env = SystemEnv::new();

        let mut bytes1 = [0u8; 32];
        let mut bytes2 = [0u8; 32];

        env.random_bytes(&mut bytes1);
        env.random_bytes(&mut bytes2);

        assert_ne!(bytes1, bytes2, "Random bytes should differ");
    }
}
