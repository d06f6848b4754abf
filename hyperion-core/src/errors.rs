// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Hyperion.
#[derive(Debug)]
pub enum Error {
    /// A configuration parameter is outside its specified range, or a set of parameters is
    /// mutually inconsistent. The message names the offending field.
    ConfigInvalid(&'static str),
    /// An IO error occurred while reading or writing the underlying byte channel.
    IoError(io::Error),
    /// The decoder reached the end of the compressed stream mid-header or mid-codeword.
    Truncated,
    /// A header field is outside its valid range, or the header declares an unrecognized
    /// encoding method.
    CorruptHeader(&'static str),
    /// Decoded state escaped its specified bounds. This indicates a malformed stream; it cannot
    /// occur while encoding well-formed input.
    Overflow(&'static str),
    /// A buffer allocation exceeded the available memory.
    AllocFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::ConfigInvalid(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::Truncated => {
                write!(f, "truncated stream")
            }
            Error::CorruptHeader(msg) => {
                write!(f, "corrupt header: {}", msg)
            }
            Error::Overflow(msg) => {
                write!(f, "arithmetic overflow: {}", msg)
            }
            Error::AllocFailed => {
                write!(f, "buffer allocation failed")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::Truncated,
            _ => Error::IoError(err),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a configuration error.
pub fn config_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::ConfigInvalid(msg))
}

/// Convenience function to create a corrupt header error.
pub fn corrupt_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::CorruptHeader(msg))
}

/// Convenience function to create a truncated stream error.
pub fn truncated_error<T>() -> Result<T> {
    Err(Error::Truncated)
}

/// Convenience function to create an overflow error.
pub fn overflow_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::Overflow(msg))
}
