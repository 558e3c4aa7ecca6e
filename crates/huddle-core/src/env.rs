//! Environment abstraction for deterministic testing.
//!
//! Decouples the coordination core from system resources (wall-clock time,
//! randomness). Tests drive the core with seeded RNGs and fixed clocks;
//! production uses real system resources.

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now_millis()` never goes backwards within a single execution context
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Used to stamp messages at persist time. Values are informational
    /// only; ordering within a room is carried by store-assigned sequence
    /// numbers, not by this clock.
    fn now_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for connection identifiers and similar.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
