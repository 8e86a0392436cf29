// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use arducam_mega::QueueError;
use std::fmt;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments or unsupported format request
    InvalidArgs(String),
    /// No supported sensor answered the probe
    CameraNotFound(String),
    /// Operation timed out
    Timeout(String),
    /// SPI transport fault
    Bus(String),
    /// General error from the driver core
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::CameraNotFound(msg) => write!(f, "Camera not found: {}", msg),
            CliError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            CliError::Bus(msg) => write!(f, "Bus error: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::InvalidArgs(_) => ExitCode::from(2),
            CliError::CameraNotFound(_) => ExitCode::from(3),
            CliError::Timeout(_) => ExitCode::from(6),
            CliError::Bus(_) => ExitCode::from(7),
            CliError::General(_) => ExitCode::from(1),
        }
    }
}

/// Map arducam_mega::Error to CliError with appropriate exit codes
impl From<arducam_mega::Error> for CliError {
    fn from(err: arducam_mega::Error) -> Self {
        use arducam_mega::Error;

        match err {
            Error::UnsupportedSensor(id) => {
                CliError::CameraNotFound(format!("unsupported sensor id 0x{:02x}", id))
            }
            Error::Bus(fault) => CliError::Bus(fault.to_string()),
            Error::Timeout(fault) => CliError::Timeout(fault.to_string()),
            Error::Queue(QueueError::Timeout) => {
                CliError::Timeout("no frame delivered in time".to_string())
            }
            Error::Config(cfg) => CliError::InvalidArgs(cfg.to_string()),
            Error::State(state @ arducam_mega::StateError::InvalidMode(_)) => {
                CliError::InvalidArgs(state.to_string())
            }
            other => CliError::General(other.to_string()),
        }
    }
}

impl From<QueueError> for CliError {
    fn from(err: QueueError) -> Self {
        arducam_mega::Error::from(err).into()
    }
}

impl From<arducam_mega::StateError> for CliError {
    fn from(err: arducam_mega::StateError) -> Self {
        arducam_mega::Error::from(err).into()
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}
