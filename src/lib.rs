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

#[macro_use]
extern crate log;

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod queue;
pub mod scenario;
pub mod transport;

pub use engine::Engine;
pub use error::{LamportError, LamportResult};
