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

//! The out-of-process critical-section worker. Invoked by a peer's
//! driver once per `Lock` line; appends one `taken` and one `released`
//! line to the shared log, sleeping `duration` seconds in between.
//!
//! This mirrors the reference `critical.c`: usage `critical <pid>
//! <duration>`, output `[Process <pid>] [Time <ns>] Lock taken|released`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Process ID to stamp on each log line.
    pid: i32,

    /// Seconds to hold the critical section before releasing.
    duration: u64,
}

fn main() {
    let args = Args::parse();

    let log_path = std::env::var("LAMPORT_LOG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("log.txt"));

    if let Err(e) = run(&args, &log_path) {
        eprintln!("critical: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, log_path: &PathBuf) -> std::io::Result<()> {
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    append(&mut log, args.pid, false)?;

    sleep(Duration::from_secs(args.duration));

    append(&mut log, args.pid, true)?;

    Ok(())
}

fn append(log: &mut File, pid: i32, release: bool) -> std::io::Result<()> {
    let line = format!(
        "[Process {}] [Time {}] Lock {}\n",
        pid,
        current_time_ns(),
        if release { "released" } else { "taken" }
    );

    log.write_all(line.as_bytes())?;
    log.sync_all()?;

    Ok(())
}

fn current_time_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_nanos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn appends_taken_and_released_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.txt");

        let args = Args { pid: 3, duration: 0 };

        run(&args, &log_path).unwrap();

        let contents = fs::read_to_string(&log_path).unwrap();
        let lines: Vec<_> = contents.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[Process 3] [Time "));
        assert!(lines[0].ends_with("Lock taken"));
        assert!(lines[1].ends_with("Lock released"));
    }
}
