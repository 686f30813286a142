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

use std::convert::TryFrom;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use nom::combinator::map_res;
use nom::number::complete::le_i32;
use nom::IResult;

use crate::error::LamportError;

pub const WIRE_SIZE: usize = 12;

/// Message variants exchanged between peers.
///
/// Repr as a 4-byte little-endian enum on the wire, matching the
/// reference's `MsgType` discriminant layout.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MsgType {
    /// Request for the lock.
    Req = 0,

    /// Acknowledgement that a peer's REQ has been observed.
    Ack = 1,

    /// Release of the lock.
    Rel = 2,
}

impl TryFrom<i32> for MsgType {
    type Error = LamportError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            x if x == MsgType::Req as i32 => Ok(MsgType::Req),
            x if x == MsgType::Ack as i32 => Ok(MsgType::Ack),
            x if x == MsgType::Rel as i32 => Ok(MsgType::Rel),
            _ => Err(LamportError::MalformedMessage),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A fixed 12-byte wire message: `(type, timestamp, pid)`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Message {
    pub msg_type: MsgType,
    pub ts: i32,
    pub pid: i32,
}

impl Message {
    pub fn new(msg_type: MsgType, ts: i32, pid: i32) -> Self {
        Self { msg_type, ts, pid }
    }

    pub fn req(ts: i32, pid: i32) -> Self {
        Self::new(MsgType::Req, ts, pid)
    }

    pub fn ack(ts: i32, pid: i32) -> Self {
        Self::new(MsgType::Ack, ts, pid)
    }

    pub fn rel(ts: i32, pid: i32) -> Self {
        Self::new(MsgType::Rel, ts, pid)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Message> {
        let (input, msg_type) = map_res(le_i32, MsgType::try_from)(input)?;
        let (input, ts) = le_i32(input)?;
        let (input, pid) = le_i32(input)?;

        Ok((
            input,
            Message {
                msg_type,
                ts,
                pid,
            },
        ))
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(WIRE_SIZE);

        buf.put_i32_le(self.msg_type as i32);
        buf.put_i32_le(self.ts);
        buf.put_i32_le(self.pid);

        buf.freeze()
    }

    pub fn from_wire(buf: &[u8; WIRE_SIZE]) -> Result<Message, LamportError> {
        Message::parse(buf)
            .map(|(_, m)| m)
            .map_err(|_| LamportError::MalformedMessage)
    }
}
