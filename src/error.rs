// Copyright 2026 loopd contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Unified error taxonomy for loopd.
//!
//! Variants correspond to the error kinds in the detection daemon's
//! propagation policy: per-device SNMP failures mark a device unreachable
//! and never bubble up here; Reconciler failures abort only the cycle that
//! raised them; only configuration and other Main-thread setup failures
//! are fatal to the whole process.

use thiserror::Error;

/// The error type for loopd operations.
#[derive(Debug, Error)]
pub enum Error {
    /// SNMP did not respond within the configured window.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A precondition of an internal call was violated (programmer error).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Peer returned a value of the wrong ASN type or an unexpected shape.
    #[error("invalid data from {host}: {detail}")]
    InvalidData { host: String, detail: String },

    /// Peer returned a non-zero error-status in the SNMP response.
    #[error("snmp packet error from {host}: {detail}")]
    SnmpPacket { host: String, detail: String },

    /// Transport or library-internal failure.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The inventory provider could not be reached or returned malformed data.
    #[error("inventory fetch failed: {0}")]
    InventoryFetch(String),

    /// A per-device data directory could not be provisioned.
    #[error("failed to provision data directory '{path}': {source}")]
    FsProvision {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Wraps a lower-level I/O failure not covered by a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for loopd operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Timeout("10.0.0.1".into());
        assert_eq!(err.to_string(), "timeout: 10.0.0.1");

        let err = Error::InvalidData {
            host: "10.0.0.1".into(),
            detail: "expected COUNTER64".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid data from 10.0.0.1: expected COUNTER64"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
