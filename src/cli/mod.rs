//! CLI module for stepflow
//!
//! This module provides:
//! - Command implementations (run, validate, config)
//! - Output handlers (console, JSON lines, quiet)
//! - Built-in interactive components bound by definitions
//!
//! # Example
//!
//! ```ignore
//! use stepflow::cli::{commands, components, output};
//!
//! let handler = output::create_handler(output::OutputMode::Console, false);
//! let input = components::stdin_lines();
//! let exit_code = commands::run_definition("approval", data, dir, &config, handler, input).await?;
//! ```

pub mod commands;
pub mod components;
pub mod output;

pub use commands::{run_definition, show_config, validate_definition};
pub use components::{BUILTIN_COMPONENTS, LineSource, builtin_components, stdin_lines};
pub use output::{OutputEvent, OutputHandler, OutputMode, create_handler};
