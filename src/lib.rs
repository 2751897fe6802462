//! Herakles Memory Guard Library
//!
//! This library protects a Linux host from memory exhaustion. It samples memory
//! pressure from /proc and, when pressure is sustained, terminates a bounded set
//! of user-owned processes under strict protection rules.
//!
//! # Components
//!
//! - **MemoryProbe** (`system`): reads kernel counters into a [`MemorySnapshot`]
//! - **PressureDetector** (`detector`): consecutive-breach confirmation with cooldown backoff
//! - **ProcessCatalog** (`process`): enumerates the user's processes and applies the safety filters
//! - **TerminationExecutor** (`termination`): SIGTERM -> SIGKILL escalation with exit confirmation
//! - **Coordinator** (`coordinator`): the periodic loop wiring everything together
//!
//! Time, randomness, process listing and signal delivery are injected through
//! traits (`clock`, `process::ProcessLister`, `termination::SignalSender`) so the
//! whole pipeline can be exercised without real sleeps or real processes.
//!
//! # Usage
//!
//! ```rust,no_run
//! use herakles_memguard::{Coordinator, Dependencies, GuardConfig};
//!
//! # async fn run() {
//! let config = GuardConfig {
//!     target_user: "alice".to_string(),
//!     ..GuardConfig::default()
//! };
//! let coordinator = Coordinator::new(config, Dependencies::system("/proc"));
//! coordinator.start();
//!
//! // ... later
//! coordinator.stop();
//! coordinator.wait_idle().await;
//! # }
//! ```

pub mod clock;
pub mod coordinator;
pub mod detector;
pub mod guard_config;
pub mod notify;
pub mod process;
pub mod ringbuffer;
pub mod store;
pub mod system;
pub mod termination;

// Re-export main types for convenience
pub use coordinator::{Coordinator, CoordinatorStatus, CycleOutcome, Dependencies, KillByPidError};
pub use detector::{DetectionEvent, DetectorStats, PressureDetector};
pub use guard_config::GuardConfig;
pub use process::{ProcessCandidate, ProcessCatalog, Rejection};
pub use system::{MemoryProbe, MemorySnapshot, ProbeError};
pub use termination::{DryRunPlan, KillOutcome, TerminationExecutor};
