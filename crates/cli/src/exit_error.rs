// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Custom error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, allowing `main()` to handle process termination.

use std::fmt;

pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_MISCONFIG: i32 = 2;
pub const EXIT_SOCKET: i32 = 3;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(EXIT_GENERIC, message)
    }

    pub fn misconfig(message: impl Into<String>) -> Self {
        Self::new(EXIT_MISCONFIG, message)
    }

    pub fn socket(message: impl Into<String>) -> Self {
        Self::new(EXIT_SOCKET, message)
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}
