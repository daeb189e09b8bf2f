//! CLI module for sitegraph
//!
//! This module provides:
//! - Command implementations (new, run, complete, watch, etc.)
//! - Output handlers (console, JSON, quiet)
//! - Signal handling and cancellation for `watch`
//!
//! # Example
//!
//! ```ignore
//! use sitegraph::cli::{commands, output};
//!
//! let handler = output::create_handler(output::OutputMode::Console, false);
//! commands::run_workflow(&service, &id, &*handler)?;
//! ```

pub mod commands;
pub mod output;
pub mod signals;

pub use output::{OutputEvent, OutputHandler, OutputMode, create_handler};
pub use signals::CancellationToken;
