// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, allowing `main()` to release the log guard and stop the
//! runtime first.

use std::fmt;

use gr_engine::EngineError;

pub mod codes {
    pub const SUCCESS: i32 = 0;
    /// Runtime or cluster failure.
    pub const FAILURE: i32 = 1;
    /// Bad usage or unmet precondition. clap exits with 2 as well.
    pub const USAGE: i32 = 2;
    /// Cleanup left objects behind.
    pub const TEARDOWN: i32 = 3;
}

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(codes::USAGE, message)
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

/// Exit code for an engine failure.
pub fn code_for(err: &EngineError) -> i32 {
    match err {
        EngineError::Precondition(_)
        | EngineError::NameCollision { .. }
        | EngineError::Path(_)
        | EngineError::Decryption(_)
        | EngineError::ForwardSpec(_)
        | EngineError::Config(_) => codes::USAGE,
        EngineError::Teardown(_) => codes::TEARDOWN,
        _ => codes::FAILURE,
    }
}

impl From<EngineError> for ExitError {
    fn from(err: EngineError) -> Self {
        Self::new(code_for(&err), err.to_string())
    }
}

/// Exit code for any error reaching `main`.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(exit) = err.downcast_ref::<ExitError>() {
        return exit.code;
    }
    if let Some(engine) = err.downcast_ref::<EngineError>() {
        return code_for(engine);
    }
    codes::FAILURE
}

#[cfg(test)]
#[path = "exit_error_tests.rs"]
mod tests;
