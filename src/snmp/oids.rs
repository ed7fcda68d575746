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

//! Authoritative OID table (spec.md §6), translated from
//! `examples/original_source/include/snmp/oids.h` (there: raw `oid[]`
//! arrays sized via `sizeof(...)/sizeof(oid)`; here: `Vec<u32>` built by
//! small constructor functions so the "zero-indexed last element replaced
//! by interface index" rule reads as ordinary Rust instead of pointer math).

/// A dotted SNMP object identifier, as the sequence of sub-identifiers.
pub type Oid = Vec<u32>;

fn oid(parts: &[u32]) -> Oid {
    parts.to_vec()
}

pub fn sys_object_id() -> Oid {
    oid(&[1, 3, 6, 1, 2, 1, 1, 2, 0])
}

pub fn sys_up_time() -> Oid {
    oid(&[1, 3, 6, 1, 2, 1, 1, 3, 0])
}

pub fn if_type(ifindex: u32) -> Oid {
    oid(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 3, ifindex])
}

pub fn if_name(ifindex: u32) -> Oid {
    oid(&[1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 1, ifindex])
}

pub fn if_alias(ifindex: u32) -> Oid {
    oid(&[1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 18, ifindex])
}

pub fn if_oper_status(ifindex: u32) -> Oid {
    oid(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 8, ifindex])
}

pub fn if_high_speed(ifindex: u32) -> Oid {
    oid(&[1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 15, ifindex])
}

pub fn if_hc_in_broadcast_pkts(ifindex: u32) -> Oid {
    oid(&[1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 9, ifindex])
}

/// IANA ifType values this daemon monitors (spec.md §6).
pub const MONITORED_IF_TYPES: [u32; 2] = [6 /* ethernetCsmacd */, 117 /* gigabitEthernet */];

/// ifOperStatus value meaning "up".
pub const IF_OPER_STATUS_UP: u32 = 1;

/// Default non-repeaters / max-repetitions for bulk walks (spec.md §6).
pub const BULK_NON_REPEATERS: u32 = 0;
pub const BULK_MAX_REPETITIONS: u32 = 60;

/// Extracts the trailing interface index from an `ifHCInBroadcastPkts`-shaped
/// OID in a received response, matching the original's `*(vars->name + 11)`.
pub fn trailing_index(o: &[u32]) -> Option<u32> {
    o.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_oids_end_in_index() {
        assert_eq!(if_hc_in_broadcast_pkts(42).last(), Some(&42));
        assert_eq!(trailing_index(&if_hc_in_broadcast_pkts(42)), Some(42));
    }

    #[test]
    fn scalar_oids_are_distinct() {
        assert_ne!(sys_object_id(), sys_up_time());
    }
}
