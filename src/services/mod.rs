//! Service modules

pub mod script_session;

pub use script_session::ScriptSession;
