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

//! Per-interface time-series store and PNG graph rendering (spec.md §4,
//! "graph-annotated alerts").
//!
//! Grounded on `examples/original_source/src/loopd/lrrd.cpp`/`lrrd.h`: a
//! thin wrapper around `librrd` holding one RRD file per interface with
//! two gauges (`broadcast`, `maverage`) and a single `RRA:LAST` archive
//! sized for 24 hours of samples plus a 10-sample margin. `librrd` isn't
//! available as a Rust crate in this workspace, so the store here is a
//! small bincode-free, line-oriented ring file (retention computed the
//! same way: `86400 / step + 10` samples) and `plotters` (used nowhere in
//! the teacher, pulled in for this purpose, see DESIGN.md) renders the
//! same two-series PNG that `rrd::graph` produced via `rrdtool graph`.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::error::{Error, Result};

/// One recorded sample: raw broadcast rate and the moving average at the
/// time of the poll (spec.md §4.C `calculate_datamav` -> `add_data`).
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub broadcast: f64,
    pub maverage: f64,
}

/// A single interface's on-disk time series (`examples/original_source`'s
/// `rrd::init`/`rrd::create`/`rrd::remove`/`rrd::add_data`/`rrd::graph`).
pub struct TimeSeries {
    path: PathBuf,
    retention: usize,
}

fn retention_for(step_secs: u64) -> usize {
    (86_400 / step_secs.max(1) + 10) as usize
}

impl TimeSeries {
    /// Opens the store at `path`, creating an empty file if it doesn't
    /// exist yet (`rrd::init` -> `rrd::create`).
    pub fn init(path: impl Into<PathBuf>, step_secs: u64) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            File::create(&path).map_err(|e| Error::FsProvision { path: path.display().to_string(), source: e })?;
        }
        Ok(TimeSeries { path, retention: retention_for(step_secs) })
    }

    /// Deletes the backing file (`rrd::remove`, called when an interface
    /// is swept after its `delete_mark` goes unrenewed for a full cycle).
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::FsProvision { path: self.path.display().to_string(), source: e }),
        }
    }

    /// Appends one sample, trimming the file back down to `retention`
    /// lines (`rrd::add_data` -> the underlying `RRA:LAST` ring).
    pub fn add_data(&self, broadcast: f64, maverage: f64) -> Result<()> {
        let mut samples = self.read_all()?;
        samples.push(Sample { broadcast, maverage });
        if samples.len() > self.retention {
            let excess = samples.len() - self.retention;
            samples.drain(0..excess);
        }

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| Error::FsProvision { path: self.path.display().to_string(), source: e })?;
        for s in &samples {
            writeln!(file, "{} {}", s.broadcast, s.maverage)
                .map_err(|e| Error::FsProvision { path: self.path.display().to_string(), source: e })?;
        }
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Sample>> {
        let file = File::open(&self.path).map_err(|e| Error::FsProvision { path: self.path.display().to_string(), source: e })?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::FsProvision { path: self.path.display().to_string(), source: e })?;
            let mut parts = line.split_whitespace();
            let (Some(b), Some(m)) = (parts.next(), parts.next()) else { continue };
            let (Ok(broadcast), Ok(maverage)) = (b.parse::<f64>(), m.parse::<f64>()) else { continue };
            out.push(Sample { broadcast, maverage });
        }
        Ok(out)
    }

    /// Renders the stored broadcast/maverage series to a PNG at
    /// `dest` (`rrd::graph`).
    pub fn graph(&self, dest: &Path, title: &str, width: u32, height: u32) -> Result<()> {
        let samples = self.read_all()?;

        let root = BitMapBackend::new(dest, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| Error::Runtime(format!("graph render failed: {e}")))?;

        let ymax = samples
            .iter()
            .flat_map(|s| [s.broadcast, s.maverage])
            .fold(1.0_f64, f64::max);

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 16))
            .margin(10)
            .x_label_area_size(20)
            .y_label_area_size(40)
            .build_cartesian_2d(0..samples.len().max(1), 0.0..ymax * 1.1)
            .map_err(|e| Error::Runtime(format!("graph render failed: {e}")))?;

        chart
            .configure_mesh()
            .draw()
            .map_err(|e| Error::Runtime(format!("graph render failed: {e}")))?;

        chart
            .draw_series(LineSeries::new(
                samples.iter().enumerate().map(|(i, s)| (i, s.broadcast)),
                &RED,
            ))
            .map_err(|e| Error::Runtime(format!("graph render failed: {e}")))?
            .label("broadcast");

        chart
            .draw_series(LineSeries::new(
                samples.iter().enumerate().map(|(i, s)| (i, s.maverage)),
                &BLUE,
            ))
            .map_err(|e| Error::Runtime(format!("graph render failed: {e}")))?
            .label("maverage");

        chart
            .configure_series_labels()
            .draw()
            .map_err(|e| Error::Runtime(format!("graph render failed: {e}")))?;

        root.present().map_err(|e| Error::Runtime(format!("graph present failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("42.rrd");
        let ts = TimeSeries::init(&path, 10).unwrap();
        assert!(path.exists());
        assert_eq!(ts.retention, 86_400 / 10 + 10);
    }

    #[test]
    fn add_data_trims_to_retention() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1.rrd");
        // A large step keeps retention (86400/step + 10) small, so the
        // read-append-rewrite loop below stays cheap.
        let ts = TimeSeries::init(&path, 10_000).unwrap();
        let retention = ts.retention;

        for i in 0..retention + 5 {
            ts.add_data(i as f64, i as f64).unwrap();
        }

        let samples = ts.read_all().unwrap();
        assert_eq!(samples.len(), retention);
        assert_eq!(samples.last().unwrap().broadcast, (retention + 4) as f64);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2.rrd");
        let ts = TimeSeries::init(&path, 10).unwrap();
        ts.remove().unwrap();
        ts.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn graph_renders_a_png_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("3.rrd");
        let ts = TimeSeries::init(&path, 10).unwrap();
        ts.add_data(10.0, 5.0).unwrap();
        ts.add_data(20.0, 8.0).unwrap();

        let dest = dir.path().join("graph.png");
        ts.graph(&dest, "host1: eth0", 320, 120).unwrap();
        assert!(dest.exists());
    }
}
