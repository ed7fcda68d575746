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

//! Typed configuration, loaded from a TOML file.
//!
//! Section layout matches spec.md §6 exactly: `zabbix`, `snmp`, `poller`,
//! `notifier`, plus top-level `datadir` and `devgroups`. See
//! `examples/original_source/include/prog_config.h` for the section shape
//! this was translated from (a hand-rolled boost::variant config map there
//! vs. `serde`+`toml` derive here).

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct ZabbixConfig {
    #[serde(rename = "api-url")]
    pub api_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpConfig {
    #[serde(rename = "default-community")]
    pub default_community: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Inventory reconciliation cadence, hours.
    #[serde(rename = "update-interval")]
    pub update_interval_hours: u64,
    /// SNMP tick cadence, seconds.
    #[serde(rename = "poll-interval")]
    pub poll_interval_secs: u64,
    /// Worker secondary-probe sampling interval, seconds.
    #[serde(rename = "recheck-interval")]
    pub recheck_interval_secs: u64,
    /// Absolute threshold on the most recent per-second broadcast rate.
    pub bcmax: u64,
    /// Lower guard: spikes are ignored below this moving average.
    pub mavlow: u64,
    /// Absolute threshold on the moving-average broadcast rate.
    pub mavmax: u64,
    /// Integer percentage (e.g. `50` for 50%); see SPEC_FULL.md §1 for the
    /// units clarification. Use [`PollerConfig::recover_ratio_fraction`].
    #[serde(rename = "recover-ratio")]
    pub recover_ratio_pct: u32,
}

impl PollerConfig {
    pub fn recover_ratio_fraction(&self) -> f64 {
        self.recover_ratio_pct as f64 / 100.0
    }

    /// Number of samples in the one-hour moving-average window at this poll interval.
    pub fn window_size(&self) -> usize {
        (3600 / self.poll_interval_secs.max(1)) as usize
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    #[serde(rename = "image-width")]
    pub image_width: u32,
    #[serde(rename = "image-height")]
    pub image_height: u32,
    pub from: String,
    pub rcpts: Vec<String>,
    pub smtphost: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub zabbix: ZabbixConfig,
    pub snmp: SnmpConfig,
    pub poller: PollerConfig,
    pub notifier: NotifierConfig,
    pub datadir: String,
    pub devgroups: Vec<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read '{}': {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        datadir = "/var/lib/loopd"
        devgroups = ["core-switches", "access-switches"]

        [zabbix]
        api-url = "https://zbx.example.com/api_jsonrpc.php"
        username = "loopd"
        password = "secret"

        [snmp]
        default-community = "public"

        [poller]
        update-interval = 6
        poll-interval = 10
        recheck-interval = 2
        bcmax = 1000
        mavlow = 10
        mavmax = 500
        recover-ratio = 50

        [notifier]
        image-width = 500
        image-height = 120
        from = "loopd@example.com"
        rcpts = ["noc@example.com"]
        smtphost = "smtp://mail.example.com:25"
    "#;

    #[test]
    fn parses_all_sections() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.devgroups.len(), 2);
        assert_eq!(cfg.poller.window_size(), 360);
        assert!((cfg.poller.recover_ratio_fraction() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn load_missing_file_errors() {
        let err = Config::load("/nonexistent/loopd.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
