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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LamportError {
    #[error("IO error {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML error {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Malformed wire message")]
    MalformedMessage,

    #[error("Malformed scenario file: {0}")]
    MalformedScenario(String),

    #[error("Unable to parse int {0}")]
    InvalidInt(#[from] std::num::ParseIntError),

    #[error("Invalid net address {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    #[error("Peer {0} disconnected")]
    PeerDisconnected(i32),

    #[error("Unknown peer id {0}")]
    UnknownPeer(i32),

    #[error("Critical-section worker exited with status {0}")]
    WorkerFailed(i32),
}

pub type LamportResult<T> = std::result::Result<T, LamportError>;
