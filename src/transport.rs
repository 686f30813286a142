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
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;

use crate::error::{LamportError, LamportResult};
use crate::message::{Message, WIRE_SIZE};

/// Point-to-point reliable, FIFO-per-channel transport between peers.
///
/// One TCP connection is opened per peer pair. The pair with the lower
/// pid listens (on `base_port + pid`), the pair with the higher pid
/// connects; this avoids the obvious connect/accept deadlock without
/// needing a barrier. Each connection is split into a read half (handed
/// to the caller to drive a dedicated receiver thread) and a write half
/// (kept here, behind a per-channel lock so a single socket's writes
/// stay serialized and therefore FIFO).
pub struct Transport {
    self_pid: i32,
    writers: HashMap<i32, Mutex<TcpStream>>,
}

impl Transport {
    /// Opens a channel to every other peer in `0..n`, returning the
    /// transport (for `send_to`/`broadcast`) and one read handle per peer
    /// (for the caller to spawn receiver threads over).
    pub fn bootstrap(
        self_pid: i32,
        n: i32,
        base_port: u16,
    ) -> LamportResult<(Transport, Vec<(i32, TcpStream)>)> {
        let mut writers = HashMap::new();
        let mut readers = Vec::new();

        let listener = if self_pid + 1 < n {
            Some(TcpListener::bind((
                "127.0.0.1",
                base_port + self_pid as u16,
            ))?)
        } else {
            None
        };

        // Connect out to every lower-pid peer first; their listeners were
        // bound before they started accepting, so a short retry loop
        // absorbs the startup race without a barrier.
        for peer in 0..self_pid {
            let mut stream = connect_with_retry(base_port + peer as u16)?;

            stream.set_nodelay(true)?;
            announce_self(&mut stream, self_pid)?;

            let read_half = stream.try_clone()?;

            writers.insert(peer, Mutex::new(stream));
            readers.push((peer, read_half));
        }

        // Accept one connection for every higher-pid peer.
        if let Some(listener) = listener {
            let expected = n - self_pid - 1;

            for _ in 0..expected {
                let (stream, _addr) = listener.accept()?;

                stream.set_nodelay(true)?;

                let peer_pid = identify_peer(&stream)?;

                let read_half = stream.try_clone()?;

                writers.insert(peer_pid, Mutex::new(stream));
                readers.push((peer_pid, read_half));
            }
        }

        Ok((Transport { self_pid, writers }, readers))
    }

    pub fn send_to(&self, pid: i32, msg: Message) -> LamportResult<()> {
        let writer = self
            .writers
            .get(&pid)
            .ok_or(LamportError::UnknownPeer(pid))?;

        let mut stream = writer.lock().unwrap();

        stream.write_all(&msg.to_bytes())?;
        stream.flush()?;

        Ok(())
    }

    /// Sends `m` to every peer except self. Need not be atomic across
    /// peers: callers rely on attached timestamps, not simultaneous
    /// delivery.
    pub fn broadcast(&self, msg: Message) -> LamportResult<()> {
        for pid in self.writers.keys().copied().collect::<Vec<_>>() {
            self.send_to(pid, msg)?;
        }

        Ok(())
    }

    pub fn self_pid(&self) -> i32 {
        self.self_pid
    }

    pub fn peer_count(&self) -> usize {
        self.writers.len()
    }
}

/// Blocks until the next message arrives on `stream`, reading one fixed
/// 12-byte frame. This is the per-channel form of the transport's
/// `deliver()` contract: each receiver thread calls this in a loop on its
/// own channel, tagging the result with the pid it already knows the
/// channel belongs to -- `peer_pid` is that known sender, used only to
/// stamp a disconnect error with the channel it came from.
pub fn recv_one(stream: &mut TcpStream, peer_pid: i32) -> LamportResult<Message> {
    let mut buf = [0u8; WIRE_SIZE];

    stream.read_exact(&mut buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            LamportError::PeerDisconnected(peer_pid)
        } else {
            LamportError::IoError(e)
        }
    })?;

    Message::from_wire(&buf)
}

fn connect_with_retry(port: u16) -> LamportResult<TcpStream> {
    let mut last_err = None;

    for _ in 0..200 {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(25));
            }
        }
    }

    Err(LamportError::IoError(last_err.unwrap()))
}

/// Reads the sending peer's pid off the wire without waiting for a full
/// protocol message: the accepting side needs to know which pid just
/// connected before it can file the stream under `writers`, so the
/// connecting side announces its own pid as a bare 4-byte little-endian
/// integer immediately after connecting, before any REQ/ACK/REL traffic.
fn identify_peer(mut stream: &TcpStream) -> LamportResult<i32> {
    let mut buf = [0u8; 4];

    stream.read_exact(&mut buf)?;

    Ok(i32::from_le_bytes(buf))
}

/// Called by the connecting side right after `TcpStream::connect`
/// succeeds, pairing with `identify_peer` above.
fn announce_self(stream: &mut TcpStream, self_pid: i32) -> LamportResult<()> {
    stream.write_all(&self_pid.to_le_bytes())?;
    stream.flush()?;

    Ok(())
}
