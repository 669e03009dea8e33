//! # Busline Testing
//!
//! Testing utilities and helpers for the Busline reducer architecture.
//!
//! This crate provides:
//! - Deterministic implementations of Environment traits
//! - A Given-When-Then harness for reducers
//! - Flattening of scheduled (delayed) actions for assertions
//!
//! ## Example
//!
//! ```ignore
//! use busline_testing::{test_clock, SequentialIdGenerator};
//!
//! let env = TicketEnvironment::new(
//!     Arc::new(test_clock()),
//!     Arc::new(SequentialIdGenerator::new("ticket")),
//!     Arc::new(Directory::new(seed::routes(), &seed::buses())),
//! );
//! ```

use busline_core::environment::{Clock, IdGenerator, RandomSource};
use chrono::{DateTime, Utc};


/// Deterministic implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, RandomSource, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use busline_testing::mocks::FixedClock;
    /// use busline_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// Parse an RFC 3339 timestamp into a fixed clock
        ///
        /// # Panics
        ///
        /// Panics if `timestamp` is not valid RFC 3339. Intended for literals in tests.
        #[must_use]
        #[allow(clippy::expect_used)]
        pub fn at(timestamp: &str) -> Self {
            Self::new(
                DateTime::parse_from_rfc3339(timestamp)
                    .expect("test timestamp should be RFC 3339")
                    .with_timezone(&Utc),
            )
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-06-01 10:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::at("2025-06-01T10:00:00Z")
    }

    /// Predictable identifiers: `prefix-1`, `prefix-2`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicUsize,
    }

    impl SequentialIdGenerator {
        /// Create a generator whose first id is `prefix-1`
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicUsize::new(1),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}-{n}", self.prefix)
        }
    }

    /// Random source replaying a fixed script of samples (cycled)
    ///
    /// An empty script always yields `0.5`, the midpoint that maps to zero
    /// offset for symmetric ranges.
    #[derive(Debug)]
    pub struct ScriptedRandom {
        samples: Vec<f64>,
        cursor: AtomicUsize,
    }

    impl ScriptedRandom {
        /// Replay `samples` in order, wrapping around at the end
        #[must_use]
        pub fn new(samples: Vec<f64>) -> Self {
            Self {
                samples,
                cursor: AtomicUsize::new(0),
            }
        }

        /// Always return the same sample
        #[must_use]
        pub fn constant(sample: f64) -> Self {
            Self::new(vec![sample])
        }
    }

    impl RandomSource for ScriptedRandom {
        fn next_unit(&self) -> f64 {
            if self.samples.is_empty() {
                return 0.5;
            }
            let i = self.cursor.fetch_add(1, Ordering::SeqCst);
            self.samples[i % self.samples.len()]
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ScriptedRandom, SequentialIdGenerator, test_clock};
pub use reducer_test::{ReducerTest, Scheduled, scheduled};
