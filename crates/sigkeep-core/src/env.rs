//! Environment abstraction for deterministic testing.
//!
//! Decouples repository logic from system resources (sleeping, randomness).
//! Backoff delays and sender-key material both go through this trait, so
//! tests can run recovery loops without real time and get reproducible keys.

use std::time::Duration;

/// Abstract environment providing sleeping and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Sleeps for the specified duration.
    ///
    /// Used for recovery backoff and commit retry delays only.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u32`.
    ///
    /// Used for sender key ids.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    /// Generates 32 random bytes.
    fn random_key(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        self.random_bytes(&mut key);
        key
    }
}

/// Production environment: tokio timers and the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Continuing without entropy would produce
/// predictable sender keys.
#[derive(Clone, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - sender keys would be predictable");
    }
}
