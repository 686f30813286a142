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

use std::path::PathBuf;

use clap::Parser;

use lamport_mutex::config::Config;
use lamport_mutex::engine::Engine;
use lamport_mutex::error::LamportResult;
use lamport_mutex::scenario::{Driver, Scenario};

/// One peer in a fixed-size distributed mutual exclusion cluster.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// This peer's identifier, in [0, N).
    pid: i32,

    /// Path to the scenario file driving this run.
    scenario: PathBuf,
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> LamportResult<()> {
    let config = Config::load()?;

    let scenario = Scenario::load(&args.scenario)?;

    info!(
        "peer {} starting with {} peers (base_port = {})",
        args.pid, scenario.n, config.base_port
    );

    let engine = Engine::start(args.pid, scenario.n, config.base_port)?;

    let worker_bin = worker_binary_path()?;

    let driver = Driver::new(engine, args.pid, worker_bin, config.log_path);

    driver.run(scenario.commands_for(args.pid))?;

    info!("peer {} finished scenario", args.pid);

    Ok(())
}

/// The critical-section worker ships as a sibling binary (`critical`) in
/// the same target directory as this one.
fn worker_binary_path() -> LamportResult<PathBuf> {
    let mut path = std::env::current_exe()?;

    path.set_file_name(if cfg!(windows) {
        "critical.exe"
    } else {
        "critical"
    });

    Ok(path)
}
