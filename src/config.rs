// lamport-mutex - Distributed mutual exclusion over a fixed peer set using Lamport clocks
// Copyright (C) 2021  rumblefrog
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::env::var;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::LamportResult;

/// Ambient knobs the wire/scenario formats leave implementation-defined.
/// Entirely optional: a missing config file falls back to these
/// defaults, matching the teacher's own config loading in spirit while
/// tolerating the common case of running without a config file at all.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Port of peer 0; peer `i` listens on `base_port + i`.
    pub base_port: u16,

    /// Path the critical-section worker appends `taken`/`released` lines to.
    pub log_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_port: 8000,
            log_path: PathBuf::from("log.txt"),
        }
    }
}

impl Config {
    /// Loads `$LAMPORT_CONFIG` (default `config.toml`) if present;
    /// returns the defaults unchanged if the file does not exist.
    pub fn load() -> LamportResult<Config> {
        let path = var("LAMPORT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        match std::fs::read(&path) {
            Ok(bytes) => Ok(toml::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }
}
