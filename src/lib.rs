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

//! `loopd`: a broadcast-storm detection daemon. Polls a fleet of network
//! devices over SNMPv2c, tracks per-interface broadcast packet rates with
//! a moving average, and raises graph-annotated email alerts when a
//! tiered threshold is crossed.

pub mod anomaly;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod inventory;
pub mod mail;
pub mod model;
pub mod queues;
pub mod rrd;
pub mod snmp;
pub mod worker;

pub use error::{Error, Result};
