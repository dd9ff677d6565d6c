//! # EntiWatch Testkit
//!
//! Test utilities for EntiWatch.
//!
//! This crate provides:
//! - An in-memory object store that publishes a change set per commit
//! - Recorders for filtered observer and aggregate callbacks
//! - Property-based test generators using proptest
//! - Reference dispatch scenarios
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entiwatch_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_harness() {
//!     let harness = TestHarness::new();
//!     let recorder = Recorder::new();
//!     harness
//!         .observer
//!         .add_filtered_observer(FilteredObserver::all(recorder.callback()));
//!     harness.seed("Order", 3);
//!     assert_eq!(recorder.len(), 3);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scenarios;
pub mod store;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::store::*;
    pub use crate::stress::*;
    pub use entiwatch_core::prelude::*;
    pub use entiwatch_core::FilterConfig;
}

pub use fixtures::*;
pub use generators::*;
pub use store::*;
pub use stress::*;
