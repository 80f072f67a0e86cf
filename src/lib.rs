#![warn(clippy::pedantic)]
// Noisy doc/signature lints
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
// Tool modules follow the foo::FooTool pattern
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod ipc;
pub mod providers;
pub mod registry;
pub mod session;
pub mod utils;
