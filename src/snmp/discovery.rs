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

//! One-shot device discovery: sysObjectID probe and physical-interface
//! enumeration, used by the Worker's reinit loop (spec.md §4.E) and the
//! Reconciler's `init_device`/`update_ints` equivalents.
//!
//! Grounded on `examples/original_source/src/loopd/device.cpp`
//! (`init_device`, `update_ints`) and `include/snmp/snmp.h`
//! (`get_host_objid`, `get_host_physints`, `get_intinfo`).

use std::time::Duration;

use crate::error::Result;
use crate::snmp::client;
use crate::snmp::oids::{self, MONITORED_IF_TYPES};
use crate::snmp::wire::Value;

/// A physical interface discovered via ifType/ifOperStatus/ifName/ifAlias walks.
#[derive(Debug, Clone)]
pub struct DiscoveredInterface {
    pub index: u32,
    pub name: String,
    pub alias: String,
    pub active: bool,
    #[allow(dead_code)] // read for display only, never compared (spec.md §11)
    pub speed: u32,
}

/// Probes sysObjectID for a device (spec.md §4.E reinit probe).
pub async fn probe_objid(host: &str, community: &str, timeout: Duration) -> Result<String> {
    let resp = client::get(host, community, &[oids::sys_object_id()], timeout).await?;
    let value = resp
        .varbinds
        .first()
        .map(|vb| &vb.value)
        .and_then(Value::as_object_id_string)
        .unwrap_or_default();
    Ok(value)
}

/// Reads the device's current sysUpTime, in timeticks (hundredths of a second).
pub async fn probe_uptime(host: &str, community: &str, timeout: Duration) -> Result<u32> {
    let resp = client::get(host, community, &[oids::sys_up_time()], timeout).await?;
    Ok(resp
        .varbinds
        .first()
        .and_then(|vb| vb.value.as_timeticks())
        .unwrap_or(0))
}

/// Walks ifType for the table of candidate interface indices whose type is
/// one of the monitored IANA types (spec.md §6). `base` must be the
/// `ifType` column root; successive GETBULK rounds follow the last
/// returned OID until the walk leaves the column.
async fn walk_column(host: &str, community: &str, base: &[u32], timeout: Duration) -> Result<Vec<(u32, Value)>> {
    let mut out = Vec::new();
    let mut seed = base.to_vec();
    loop {
        let resp = client::get_bulk(
            host,
            community,
            &[seed.clone()],
            oids::BULK_NON_REPEATERS as i64,
            oids::BULK_MAX_REPETITIONS as i64,
            timeout,
        )
        .await?;
        if resp.varbinds.is_empty() {
            break;
        }
        let mut progressed = false;
        for vb in &resp.varbinds {
            if !vb.oid.starts_with(base) || vb.oid.len() <= base.len() {
                continue;
            }
            if matches!(vb.value, Value::EndOfMibView | Value::NoSuchObject | Value::NoSuchInstance) {
                continue;
            }
            if let Some(&index) = vb.oid.last() {
                out.push((index, vb.value.clone()));
                seed = vb.oid.clone();
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    Ok(out)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(v) => Some(*v),
        Value::Counter32(v) | Value::Gauge32(v) => Some(*v as i64),
        Value::TimeTicks(v) => Some(*v as i64),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::OctetString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        _ => String::new(),
    }
}

/// Enumerates physical interfaces and their descriptive attributes
/// (spec.md §4.E reinit loop, §6 ifType/ifName/ifAlias/ifOperStatus/ifHighSpeed).
pub async fn enumerate_interfaces(host: &str, community: &str, timeout: Duration) -> Result<Vec<DiscoveredInterface>> {
    let iftype_col = oids::if_type(0);
    let base = &iftype_col[..iftype_col.len() - 1];
    let types = walk_column(host, community, base, timeout).await?;

    let mut result = Vec::new();
    for (index, type_value) in types {
        let Some(iftype) = as_i64(&type_value) else {
            continue;
        };
        if !MONITORED_IF_TYPES.contains(&(iftype as u32)) {
            continue;
        }

        let resp = client::get(
            host,
            community,
            &[
                oids::if_oper_status(index),
                oids::if_name(index),
                oids::if_alias(index),
                oids::if_high_speed(index),
            ],
            timeout,
        )
        .await?;

        let operstatus = resp.varbinds.first().and_then(|vb| as_i64(&vb.value)).unwrap_or(0);
        let name = resp.varbinds.get(1).map(|vb| as_text(&vb.value)).unwrap_or_default();
        let alias = resp.varbinds.get(2).map(|vb| as_text(&vb.value)).unwrap_or_default();
        let speed = resp
            .varbinds
            .get(3)
            .and_then(|vb| as_i64(&vb.value))
            .unwrap_or(0) as u32;

        result.push(DiscoveredInterface {
            index,
            name,
            alias,
            active: operstatus == oids::IF_OPER_STATUS_UP as i64,
            speed,
        });
    }
    Ok(result)
}
