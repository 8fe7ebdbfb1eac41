//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod choices;
pub(crate) mod completions;
pub(crate) mod list_ports;
pub(crate) mod program;
pub(crate) mod verify;
