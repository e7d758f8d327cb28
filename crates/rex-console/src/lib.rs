//! REX console (rex-console)
//!
//! Command-line front end for the exploration engine:
//! 1. **explore**: one session against a fixture repository, printing the
//!    generation history
//! 2. **simulate**: seeded random sessions checked step by step
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rex_console::simulator::{run_simulator, SimulatorConfig};
//!
//! let report = run_simulator(SimulatorConfig::default()).await?;
//! println!("{}", report.generate_text());
//! ```

pub mod explore;
pub mod logging;
pub mod simulator;

pub use explore::{render_history, render_stats, run_exploration, ExploreOptions, ExploreReport};
pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
