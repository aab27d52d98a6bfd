pub mod actions;
pub mod agent_env;
pub mod call_log;
pub mod cloud;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod external_commands;
pub mod protocol_envelope;
pub mod scratch;

pub use context::CpiContext;
pub use error::{CpiError, ErrorKind, Result};
pub use protocol_envelope::{Request, Response};
