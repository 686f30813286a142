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

use std::path::{Path, PathBuf};
use std::process::Command as Process;
use std::sync::Arc;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{digit1, space1};
use nom::combinator::{map_res, all_consuming};
use nom::sequence::tuple;
use nom::IResult;

use crate::engine::Engine;
use crate::error::{LamportError, LamportResult};

/// One parsed action from a scenario line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Acquire the lock, hold it for `duration` seconds, release it.
    Lock(u64),

    /// Block until the named peer has completed at least one lock cycle.
    Wait(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioLine {
    pub pid: i32,
    pub command: Command,
}

/// A parsed scenario file: a peer count and an ordered sequence of
/// per-peer commands. Execution order within one peer is purely
/// sequential, matching the file's line order -- the reference's two-pass
/// read (once for N, once for commands) collapses here into one pass.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub n: i32,
    pub lines: Vec<ScenarioLine>,
}

impl Scenario {
    pub fn parse(text: &str) -> LamportResult<Scenario> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        let n_line = lines
            .next()
            .ok_or_else(|| LamportError::MalformedScenario("empty scenario file".into()))?;

        let n = parse_i32(n_line)
            .map(|(_, n)| n)
            .map_err(|_| LamportError::MalformedScenario(format!("bad peer count: {}", n_line)))?;

        let parsed = lines
            .map(|line| {
                all_consuming(parse_scenario_line)(line)
                    .map(|(_, l)| l)
                    .map_err(|_| LamportError::MalformedScenario(format!("bad line: {}", line)))
            })
            .collect::<LamportResult<Vec<_>>>()?;

        Ok(Scenario { n, lines: parsed })
    }

    pub fn load(path: impl AsRef<Path>) -> LamportResult<Scenario> {
        let text = std::fs::read_to_string(path)?;

        Scenario::parse(&text)
    }

    /// Commands belonging to `pid`, in file order.
    pub fn commands_for(&self, pid: i32) -> impl Iterator<Item = Command> + '_ {
        self.lines
            .iter()
            .filter(move |l| l.pid == pid)
            .map(|l| l.command)
    }
}

fn parse_i32(input: &str) -> IResult<&str, i32> {
    map_res(digit1, str::parse)(input)
}

fn parse_lock(input: &str) -> IResult<&str, Command> {
    let (input, (_, _, d)) = tuple((tag("Lock"), space1, parse_i32))(input)?;

    Ok((input, Command::Lock(d as u64)))
}

fn parse_wait(input: &str) -> IResult<&str, Command> {
    let (input, (_, _, p)) = tuple((tag("Wait"), space1, parse_i32))(input)?;

    Ok((input, Command::Wait(p)))
}

fn parse_scenario_line(input: &str) -> IResult<&str, ScenarioLine> {
    let (input, (pid, _, command)) =
        tuple((parse_i32, space1, alt((parse_lock, parse_wait))))(input)?;

    Ok((input, ScenarioLine { pid, command }))
}

/// Drives one peer's portion of a scenario: issues `request_lock`,
/// invokes the out-of-process critical-section worker, and calls
/// `release_lock`/`wait_for_completions` as each line dictates.
pub struct Driver {
    engine: Arc<Engine>,
    self_pid: i32,
    worker_bin: PathBuf,
    log_path: PathBuf,
}

impl Driver {
    pub fn new(engine: Arc<Engine>, self_pid: i32, worker_bin: PathBuf, log_path: PathBuf) -> Self {
        Self {
            engine,
            self_pid,
            worker_bin,
            log_path,
        }
    }

    pub fn run(&self, commands: impl IntoIterator<Item = Command>) -> LamportResult<()> {
        for command in commands {
            match command {
                Command::Lock(duration) => {
                    self.engine.request_lock();

                    let result = self.invoke_worker(duration);

                    self.engine.release_lock();

                    result?;
                }
                Command::Wait(peer) => {
                    debug!("peer {} waiting on peer {}", self.self_pid, peer);

                    self.engine.wait_for_completions(peer, 1);
                }
            }
        }

        Ok(())
    }

    fn invoke_worker(&self, duration: u64) -> LamportResult<()> {
        let status = Process::new(&self.worker_bin)
            .arg(self.self_pid.to_string())
            .arg(duration.to_string())
            .env("LAMPORT_LOG_PATH", &self.log_path)
            .status()?;

        if !status.success() {
            return Err(LamportError::WorkerFailed(status.code().unwrap_or(-1)));
        }

        Ok(())
    }
}
