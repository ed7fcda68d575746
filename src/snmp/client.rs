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

//! Single-session request/response transport.
//!
//! Grounded on `examples/original_source/include/snmp/snmp.h`'s
//! `synch_request`/`async_send` pair: a synchronous single-shot call used
//! by the Reconciler/Worker probes, and the async primitive the multiplex
//! poller batches over. Both are the same tokio UDP round trip here —
//! spec.md calls the "direct synchronous GET" in the worker a
//! `.await`-ed call on its own task, not a blocking one.

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;

use crate::error::{Error, Result};
use crate::snmp::oids::Oid;
use crate::snmp::wire::{self, Response};

const SNMP_PORT: u16 = 161;

fn next_request_id() -> i64 {
    rand::rng().random_range(1..i32::MAX) as i64
}

async fn round_trip(host: &str, payload: &[u8], timeout: Duration) -> Result<Response> {
    let addr: SocketAddr = format!("{host}:{SNMP_PORT}")
        .parse()
        .map_err(|e| Error::InvalidInput(format!("bad host address '{host}': {e}")))?;

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| Error::Runtime(format!("bind failed: {e}")))?;
    socket
        .connect(addr)
        .await
        .map_err(|e| Error::Runtime(format!("connect failed: {e}")))?;
    socket
        .send(payload)
        .await
        .map_err(|e| Error::Runtime(format!("send failed: {e}")))?;

    let mut buf = [0u8; 4096];
    let n = tokio::time::timeout(timeout, socket.recv(&mut buf))
        .await
        .map_err(|_| Error::Timeout(host.to_string()))?
        .map_err(|e| Error::Runtime(format!("recv failed: {e}")))?;

    let response = wire::decode_response(&buf[..n])?;
    if response.error_status != 0 {
        return Err(Error::SnmpPacket {
            host: host.to_string(),
            detail: format!("error-status {}", response.error_status),
        });
    }
    Ok(response)
}

/// A single GET of one or more OIDs.
pub async fn get(host: &str, community: &str, oids: &[Oid], timeout: Duration) -> Result<Response> {
    let payload = wire::encode_get(community, next_request_id(), oids);
    round_trip(host, &payload, timeout).await
}

/// A single GETBULK request (used for interface-table enumeration).
pub async fn get_bulk(
    host: &str,
    community: &str,
    oids: &[Oid],
    non_repeaters: i64,
    max_repetitions: i64,
    timeout: Duration,
) -> Result<Response> {
    let payload = wire::encode_getbulk(community, next_request_id(), non_repeaters, max_repetitions, oids);
    round_trip(host, &payload, timeout).await
}
