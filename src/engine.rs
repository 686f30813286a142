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

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::clock::LogicalClock;
use crate::error::LamportResult;
use crate::message::{Message, MsgType};
use crate::queue::RequestQueue;
use crate::transport::{recv_one, Transport};

/// Everything guarded by the engine's single coarse mutex: the logical
/// clock, the replicated request queue, the per-peer ACK watermarks, and
/// the per-peer completion counters. Keeping these four together behind
/// one lock (rather than one lock each) avoids ordering bugs between
/// clock updates and queue mutations, matching the reference design.
struct EngineState {
    clock: LogicalClock,
    queue: RequestQueue,
    acks: HashMap<i32, i32>,
    completions: HashMap<i32, u64>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            clock: LogicalClock::new(),
            queue: RequestQueue::new(),
            acks: HashMap::new(),
            completions: HashMap::new(),
        }
    }
}

/// The lock protocol: request/release API, the entry predicate, and the
/// receiver dispatch that keeps every peer's replica in sync.
pub struct Engine {
    self_pid: i32,
    n: i32,
    transport: Transport,
    state: Mutex<EngineState>,
    cvar: Condvar,
}

impl Engine {
    /// Bootstraps the transport, builds the engine, and spawns one
    /// receiver thread per remote peer. Returns once every channel is
    /// established (the N x N connection matrix is fully up).
    pub fn start(self_pid: i32, n: i32, base_port: u16) -> LamportResult<Arc<Engine>> {
        let (transport, readers) = Transport::bootstrap(self_pid, n, base_port)?;

        let engine = Arc::new(Engine {
            self_pid,
            n,
            transport,
            state: Mutex::new(EngineState::new()),
            cvar: Condvar::new(),
        });

        for (peer_pid, stream) in readers {
            let engine = engine.clone();

            thread::spawn(move || engine.receiver_loop(peer_pid, stream));
        }

        Ok(engine)
    }

    /// Blocks the caller until the lock is held: stamps and broadcasts a
    /// REQ, then waits on the entry predicate.
    pub fn request_lock(&self) {
        let ts = {
            let mut state = self.state.lock().unwrap();
            let ts = state.clock.tick();

            state.queue.insert(ts, self.self_pid);

            ts
        };

        debug!("peer {} requesting lock at ts {}", self.self_pid, ts);

        self.broadcast_or_die(Message::req(ts, self.self_pid));

        let state = self.state.lock().unwrap();

        let _state = self
            .cvar
            .wait_while(state, |s| !self.predicate_holds(s, ts))
            .unwrap();

        info!("peer {} entered critical section (ts = {})", self.self_pid, ts);
    }

    /// Removes self from the queue, broadcasts a REL, and bumps this
    /// peer's own completion counter. Returns immediately.
    pub fn release_lock(&self) {
        let ts = {
            let mut state = self.state.lock().unwrap();
            let ts = state.clock.tick();

            state.queue.remove(self.self_pid);
            *state.completions.entry(self.self_pid).or_insert(0) += 1;

            ts
        };

        self.cvar.notify_all();

        info!("peer {} released lock (ts = {})", self.self_pid, ts);

        self.broadcast_or_die(Message::rel(ts, self.self_pid));
    }

    /// Blocks until peer `p`'s request has been removed from Q at least
    /// `k` times, whether by a local release or an observed REL.
    pub fn wait_for_completions(&self, p: i32, k: u64) {
        let state = self.state.lock().unwrap();

        let _state = self
            .cvar
            .wait_while(state, |s| s.completions.get(&p).copied().unwrap_or(0) < k)
            .unwrap();
    }

    /// `head(Q) = (., self)` and every other peer's ACK watermark has
    /// caught up to `ts`.
    fn predicate_holds(&self, state: &EngineState, ts: i32) -> bool {
        if state.queue.head().map(|r| r.pid) != Some(self.self_pid) {
            return false;
        }

        (0..self.n)
            .filter(|&p| p != self.self_pid)
            .all(|p| state.acks.get(&p).copied().unwrap_or(0) >= ts)
    }

    fn receiver_loop(self: Arc<Self>, peer_pid: i32, mut stream: TcpStream) {
        loop {
            match recv_one(&mut stream, peer_pid) {
                Ok(msg) => self.dispatch(peer_pid, msg),
                Err(e) => {
                    error!(
                        "transport failure on channel to peer {}: {} -- aborting",
                        peer_pid, e
                    );
                    std::process::exit(1);
                }
            }
        }
    }

    fn dispatch(&self, sender_pid: i32, msg: Message) {
        let ack_to_send = {
            let mut state = self.state.lock().unwrap();

            state.clock.observe(msg.ts);

            match msg.msg_type {
                MsgType::Req => {
                    if state.queue.contains(msg.pid) {
                        warn!(
                            "duplicate REQ from pid {} (ts = {}) without an intervening REL",
                            msg.pid, msg.ts
                        );
                    }

                    state.queue.insert(msg.ts, msg.pid);

                    let ack_ts = state.clock.tick();

                    Some(Message::ack(ack_ts, self.self_pid))
                }
                MsgType::Ack => {
                    let watermark = state.acks.entry(msg.pid).or_insert(0);
                    *watermark = (*watermark).max(msg.ts);

                    None
                }
                MsgType::Rel => {
                    state.queue.remove(msg.pid);
                    *state.completions.entry(msg.pid).or_insert(0) += 1;

                    None
                }
            }

            // state dropped here: broadcasts/sends release the mutex
            // around the socket write that follows.
        };

        self.cvar.notify_all();

        if let Some(ack) = ack_to_send {
            debug!(
                "peer {} acking REQ from {} (sender_pid = {})",
                self.self_pid, msg.pid, sender_pid
            );

            self.send_or_die(msg.pid, ack);
        }
    }

    fn broadcast_or_die(&self, msg: Message) {
        if let Err(e) = self.transport.broadcast(msg) {
            error!("fatal transport error broadcasting {:?}: {}", msg, e);
            std::process::exit(1);
        }
    }

    fn send_or_die(&self, pid: i32, msg: Message) {
        if let Err(e) = self.transport.send_to(pid, msg) {
            error!("fatal transport error sending {:?} to {}: {}", msg, pid, e);
            std::process::exit(1);
        }
    }
}
