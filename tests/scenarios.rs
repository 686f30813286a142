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

//! End-to-end scenarios driving several in-process peers over real
//! loopback TCP connections, checking the properties from the testable
//! properties section against the shared critical-section log.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;

use lamport_mutex::engine::Engine;
use lamport_mutex::scenario::{Driver, Scenario};

static NEXT_PORT: AtomicU16 = AtomicU16::new(22000);

fn unique_base_port(n: i32) -> u16 {
    NEXT_PORT.fetch_add(n as u16 + 8, Ordering::SeqCst)
}

fn worker_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_critical"))
}

/// Runs every peer in `scenario` to completion against a fresh log file,
/// returning the parsed `(pid, taken_ns, released_ns)` triples in the
/// order they were appended.
fn run_scenario(scenario: Scenario, log_path: &Path) -> Vec<(i32, u128, u128)> {
    let base_port = unique_base_port(scenario.n);

    let scenario = std::sync::Arc::new(scenario);

    let handles: Vec<_> = (0..scenario.n)
        .map(|pid| {
            let scenario = scenario.clone();
            let log_path = log_path.to_path_buf();
            let worker_bin = worker_binary();

            thread::spawn(move || {
                let engine = Engine::start(pid, scenario.n, base_port).unwrap();
                let driver = Driver::new(engine, pid, worker_bin, log_path);

                driver.run(scenario.commands_for(pid)).unwrap();
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    parse_log(log_path)
}

fn parse_log(log_path: &Path) -> Vec<(i32, u128, u128)> {
    let contents = std::fs::read_to_string(log_path).unwrap_or_default();

    let mut events: Vec<(i32, u128, bool)> = Vec::new();

    for line in contents.lines() {
        // `[Process <pid>] [Time <ns>] Lock taken|released`
        let rest = line.strip_prefix("[Process ").unwrap();
        let (pid_str, rest) = rest.split_once(']').unwrap();
        let rest = rest.trim_start().strip_prefix("[Time ").unwrap();
        let (ts_str, rest) = rest.split_once(']').unwrap();

        let pid: i32 = pid_str.trim().parse().unwrap();
        let ts: u128 = ts_str.trim().parse().unwrap();
        let released = rest.trim().ends_with("released");

        events.push((pid, ts, released));
    }

    events.sort_by_key(|e| e.1);

    let mut pairs = Vec::new();
    let mut open: Option<(i32, u128)> = None;

    for (pid, ts, released) in events {
        match (open, released) {
            (None, false) => open = Some((pid, ts)),
            (Some((open_pid, taken)), true) => {
                assert_eq!(
                    open_pid, pid,
                    "release from a different pid than the open critical section"
                );
                pairs.push((pid, taken, ts));
                open = None;
            }
            _ => panic!("overlapping or malformed critical sections in log"),
        }
    }

    assert!(open.is_none(), "scenario ended with an unreleased lock");

    pairs
}

#[test]
fn two_peers_one_lock_each() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.txt");

    let scenario = Scenario::parse("2\n0 Lock 1\n1 Lock 1\n").unwrap();

    let pairs = run_scenario(scenario, &log_path);

    assert_eq!(pairs.len(), 2);

    let pids: std::collections::HashSet<_> = pairs.iter().map(|(pid, _, _)| *pid).collect();
    assert_eq!(pids, [0, 1].into_iter().collect());
}

#[test]
fn three_peers_contend_for_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.txt");

    let scenario = Scenario::parse("3\n0 Lock 1\n1 Lock 1\n2 Lock 1\n").unwrap();

    let pairs = run_scenario(scenario, &log_path);

    assert_eq!(pairs.len(), 3);

    for w in pairs.windows(2) {
        assert!(w[0].2 <= w[1].1, "critical sections overlap: {:?}", w);
    }
}

#[test]
fn wait_orders_peer_one_after_peer_zero() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.txt");

    let scenario = Scenario::parse("2\n0 Lock 1\n1 Wait 0\n1 Lock 1\n").unwrap();

    let pairs = run_scenario(scenario, &log_path);

    let peer0 = pairs.iter().find(|(pid, ..)| *pid == 0).unwrap();
    let peer1 = pairs.iter().find(|(pid, ..)| *pid == 1).unwrap();

    assert!(peer1.1 > peer0.2, "peer 1 did not wait for peer 0's release");
}

#[test]
fn interleaved_double_lock_stays_disjoint() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.txt");

    let scenario = Scenario::parse("2\n0 Lock 1\n1 Lock 1\n0 Lock 1\n").unwrap();

    let pairs = run_scenario(scenario, &log_path);

    // Three `Lock` lines in the scenario (two for peer 0, one for peer 1)
    // produce three taken/released pairs.
    assert_eq!(pairs.len(), 3);

    let zero_count = pairs.iter().filter(|(pid, ..)| *pid == 0).count();
    let one_count = pairs.iter().filter(|(pid, ..)| *pid == 1).count();

    assert_eq!(zero_count, 2);
    assert_eq!(one_count, 1);

    for w in pairs.windows(2) {
        assert!(w[0].2 <= w[1].1);
    }
}

#[test]
fn four_peers_broadcast_and_all_complete() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.txt");

    let scenario =
        Scenario::parse("4\n0 Lock 1\n1 Lock 1\n2 Lock 1\n3 Lock 1\n").unwrap();

    let pairs = run_scenario(scenario, &log_path);

    assert_eq!(pairs.len(), 4);

    for w in pairs.windows(2) {
        assert!(w[0].2 <= w[1].1);
    }
}
