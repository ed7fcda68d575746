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

//! Inventory Reconciler (spec.md §4.A, Component A): pulls device/interface
//! group membership from the Zabbix JSON-RPC API and folds it into the
//! live [`DeviceMap`].
//!
//! Grounded on `examples/original_source/include/zbx_api.h`'s
//! `api_session` (session-token JSON-RPC client) and `device.cpp`'s
//! `update_devices`/`parse_zbxdata` (group lookup, delete-mark sweep,
//! per-host community macro resolution). `api_session` there hand-rolls
//! JSON traversal over `frozen`; here `reqwest` + `serde_json` (the
//! teacher's own HTTP/JSON stack) do the same job.

use std::path::Path;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Device, DeviceMap};

/// A thin session wrapper around Zabbix's JSON-RPC `user.login` / `host.get`
/// / `user.logout` calls (spec.md §4.A).
pub struct ZabbixClient {
    http: reqwest::Client,
    api_url: String,
    username: String,
    password: String,
    token: Option<String>,
    next_id: u64,
}

impl ZabbixClient {
    pub fn new(api_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        ZabbixClient {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            username: username.into(),
            password: password.into(),
            token: None,
            next_id: 1,
        }
    }

    async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let mut body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        if let (Some(token), Some(map)) = (&self.token, body.as_object_mut()) {
            map.insert("auth".to_string(), json!(token));
        }

        let resp: Value = self
            .http
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::InventoryFetch(format!("{method}: request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::InventoryFetch(format!("{method}: bad JSON response: {e}")))?;

        if let Some(err) = resp.get("error") {
            return Err(Error::InventoryFetch(format!("{method}: API error: {err}")));
        }
        resp.get("result")
            .cloned()
            .ok_or_else(|| Error::InventoryFetch(format!("{method}: response missing 'result'")))
    }

    /// Authenticates and stores the session token used by subsequent calls.
    pub async fn login(&mut self) -> Result<()> {
        let result = self
            .call(
                "user.login",
                json!({ "username": self.username, "password": self.password }),
            )
            .await?;
        let token = result
            .as_str()
            .ok_or_else(|| Error::InventoryFetch("user.login: result was not a string".into()))?
            .to_string();
        self.token = Some(token);
        Ok(())
    }

    /// Best-effort session teardown; errors are logged, not propagated,
    /// matching the original's fire-and-forget shutdown.
    pub async fn logout(&mut self) {
        if self.token.is_none() {
            return;
        }
        if let Err(e) = self.call("user.logout", json!({})).await {
            warn!("zabbix logout failed: {e}");
        }
        self.token = None;
    }

    pub async fn groupid_by_name(&mut self, name: &str) -> Result<String> {
        let result = self
            .call("hostgroup.get", json!({ "filter": { "name": [name] }, "output": ["groupid"] }))
            .await?;
        result
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|o| o.get("groupid"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::InventoryFetch(format!("host group '{name}' not found")))
    }

    /// `host.get` for one group ID, with macros and interfaces selected
    /// (spec.md §4.A `{$SNMP_COMMUNITY}` lookup and §6's "poll address is
    /// the host's SNMP-type interface IP" contract).
    pub async fn hosts_in_group(&mut self, groupid: &str) -> Result<Vec<ZbxHost>> {
        let result = self
            .call(
                "host.get",
                json!({
                    "groupids": [groupid],
                    "output": ["host", "name"],
                    "selectMacros": ["macro", "value"],
                    "selectInterfaces": ["ip", "type"],
                }),
            )
            .await?;
        let arr = result
            .as_array()
            .ok_or_else(|| Error::InventoryFetch("host.get: result was not an array".into()))?;

        Ok(arr.iter().filter_map(parse_zbx_host).collect())
    }
}

/// Zabbix interface type for an SNMP agent interface (1=agent, 2=SNMP,
/// 3=IPMI, 4=JMX).
const ZBX_INTERFACE_TYPE_SNMP: i64 = 2;

/// One device as reported by Zabbix, before community resolution.
///
/// `host` is the address this daemon actually polls: spec.md §6 requires
/// it to be the IP of the host's SNMP-type interface, not Zabbix's
/// technical hostname (the two commonly differ).
pub struct ZbxHost {
    pub host: String,
    pub name: String,
    pub community: Option<String>,
}

fn interface_type(entry: &Value) -> Option<i64> {
    entry.get("type").and_then(|t| t.as_i64().or_else(|| t.as_str().and_then(|s| s.parse().ok())))
}

/// Resolves the IP of a host's SNMP-type interface out of
/// `selectInterfaces`. Returns `None` if the host has no SNMP interface,
/// which means it cannot be polled and is skipped entirely.
fn snmp_interface_ip(entry: &Value) -> Option<String> {
    entry
        .get("interfaces")?
        .as_array()?
        .iter()
        .find(|iface| interface_type(iface) == Some(ZBX_INTERFACE_TYPE_SNMP))
        .and_then(|iface| iface.get("ip"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_zbx_host(entry: &Value) -> Option<ZbxHost> {
    let host = snmp_interface_ip(entry)?;
    let name = entry.get("name")?.as_str()?.to_string();
    let community = entry
        .get("macros")
        .and_then(Value::as_array)
        .and_then(|macros| {
            macros.iter().find(|m| m.get("macro").and_then(Value::as_str) == Some("{$SNMP_COMMUNITY}"))
        })
        .and_then(|m| m.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(ZbxHost { host, name, community })
}

/// Outcome of one reconciliation pass (spec.md §4.A), logged by the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileStats {
    pub added: usize,
    pub updated: usize,
    pub marked_for_deletion: usize,
}

/// Folds freshly-fetched Zabbix inventory into the live device map:
/// mark-all, add-or-refresh-on-sight, unmarked entries are left marked
/// for the Main Controller to sweep (spec.md §4.A, §4.F).
///
/// Grounded on `device.cpp::update_devices`/`parse_zbxdata`: delete-mark
/// every known device first, then clear the mark on every host reported
/// this pass, creating new [`Device`] records (and their data directory)
/// for hosts never seen before.
pub fn reconcile(devices: &mut DeviceMap, hosts: Vec<ZbxHost>, default_community: &str, datadir: &Path) -> Result<ReconcileStats> {
    let mut stats = ReconcileStats::default();
    for dev in devices.values_mut() {
        dev.delete_mark = true;
    }

    for zbx in hosts {
        let community = zbx.community.unwrap_or_else(|| default_community.to_string());

        match devices.get_mut(&zbx.host) {
            Some(existing) => {
                if existing.name != zbx.name || existing.community != community {
                    info!(host = %zbx.host, name = %zbx.name, "device updated");
                    stats.updated += 1;
                }
                existing.name = zbx.name;
                existing.community = community;
                existing.delete_mark = false;
            }
            None => {
                let devdir = datadir.join(&zbx.host);
                std::fs::create_dir(&devdir).or_else(|e| {
                    if e.kind() == std::io::ErrorKind::AlreadyExists {
                        Ok(())
                    } else {
                        Err(Error::FsProvision { path: devdir.display().to_string(), source: e })
                    }
                })?;
                info!(host = %zbx.host, name = %zbx.name, community = %community, "device added");
                devices.insert(zbx.host.clone(), Device::new(zbx.host.clone(), zbx.name, community, devdir));
                stats.added += 1;
            }
        }
    }

    stats.marked_for_deletion = devices.values().filter(|d| d.delete_mark).count();
    Ok(stats)
}

/// Runs one full reconciliation cycle against the configured device
/// groups (spec.md §4.A `update_devices`): login, walk each group,
/// reconcile, logout.
pub async fn run_cycle(devices: &mut DeviceMap, cfg: &Config) -> Result<ReconcileStats> {
    let mut client = ZabbixClient::new(&cfg.zabbix.api_url, &cfg.zabbix.username, &cfg.zabbix.password);
    client.login().await?;

    let mut all_hosts = Vec::new();
    let result: Result<()> = async {
        for group in &cfg.devgroups {
            let groupid = client.groupid_by_name(group).await?;
            all_hosts.extend(client.hosts_in_group(&groupid).await?);
        }
        Ok(())
    }
    .await;

    client.logout().await;
    result?;

    reconcile(devices, all_hosts, &cfg.snmp.default_community, Path::new(&cfg.datadir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn reconcile_adds_new_host_and_creates_directory() {
        let mut devices = DeviceMap::new();
        let datadir = tempdir().unwrap();
        let hosts = vec![ZbxHost { host: "10.0.0.5".into(), name: "sw5".into(), community: None }];

        let stats = reconcile(&mut devices, hosts, "public", datadir.path()).unwrap();

        assert_eq!(stats.added, 1);
        assert!(devices.contains_key("10.0.0.5"));
        assert_eq!(devices["10.0.0.5"].community, "public");
        assert!(datadir.path().join("10.0.0.5").is_dir());
    }

    #[test]
    fn reconcile_marks_missing_hosts_for_deletion() {
        let mut devices = DeviceMap::new();
        devices.insert("10.0.0.9".into(), Device::new("10.0.0.9", "old", "public", PathBuf::new()));
        let datadir = tempdir().unwrap();

        let stats = reconcile(&mut devices, vec![], "public", datadir.path()).unwrap();

        assert_eq!(stats.marked_for_deletion, 1);
        assert!(devices["10.0.0.9"].delete_mark);
    }

    #[test]
    fn reconcile_resighting_clears_delete_mark() {
        let mut devices = DeviceMap::new();
        let mut existing = Device::new("10.0.0.9", "old", "public", PathBuf::new());
        existing.delete_mark = true;
        devices.insert("10.0.0.9".into(), existing);
        let datadir = tempdir().unwrap();
        let hosts = vec![ZbxHost { host: "10.0.0.9".into(), name: "old".into(), community: None }];

        reconcile(&mut devices, hosts, "public", datadir.path()).unwrap();

        assert!(!devices["10.0.0.9"].delete_mark);
    }

    #[test]
    fn parse_zbx_host_resolves_community_macro() {
        let entry = json!({
            "host": "switch1.corp.example.com",
            "name": "switch1",
            "macros": [{ "macro": "{$SNMP_COMMUNITY}", "value": "priv8" }],
            "interfaces": [{ "ip": "10.0.0.1", "type": "2" }],
        });
        let host = parse_zbx_host(&entry).unwrap();
        assert_eq!(host.community.as_deref(), Some("priv8"));
        assert_eq!(host.host, "10.0.0.1");
    }

    #[test]
    fn parse_zbx_host_uses_snmp_interface_ip_not_technical_host() {
        let entry = json!({
            "host": "switch1.corp.example.com",
            "name": "switch1",
            "interfaces": [
                { "ip": "192.168.1.1", "type": "1" },
                { "ip": "10.0.0.1", "type": 2 },
            ],
        });
        let host = parse_zbx_host(&entry).unwrap();
        assert_eq!(host.host, "10.0.0.1");
    }

    #[test]
    fn parse_zbx_host_skips_hosts_without_an_snmp_interface() {
        let entry = json!({
            "host": "switch1.corp.example.com",
            "name": "switch1",
            "interfaces": [{ "ip": "192.168.1.1", "type": "1" }],
        });
        assert!(parse_zbx_host(&entry).is_none());
    }
}
