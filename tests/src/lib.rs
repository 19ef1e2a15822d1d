//! # Workbench Test Suite
//!
//! Unified test crate for scenarios that span more than one crate.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks of the dispatch path
//! └── src/integration/  # Panel-to-panel flows over a real bus
//!     ├── flows.rs      # Happy paths, shared state, wildcard monitors
//!     ├── failures.rs   # Dead letters, retries, handler isolation
//!     └── sessions.rs   # Tool sessions and targeted delivery
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p workbench-tests
//! cargo test -p workbench-tests integration::failures::
//! cargo bench -p workbench-tests
//! ```

pub mod integration;
