//! Text wire protocol spoken over the raw TCP stream.
//!
//! Every message is a short ASCII record terminated by `;` or a newline:
//!
//! | Direction | Record |
//! |-----------|--------|
//! | server → client | `ID:<client_id>;` |
//! | server → client | `T:<tick>;` (starts a snapshot) |
//! | server → client | `P:<id>,<x>,<y>,<velocity>,<angle>;` |
//! | server → client | `W:<x1>,<y1>,<x2>,<y2>;` |
//! | server → client | `C:<client_id>,<x>,<y>;` |
//! | server → client | `DISCONNECTED_CLIENT:<client_id>;` |
//! | client → server | `MOVE:<x>,<y>` |
//!
//! Floats are printed in Rust's shortest round-trip form, so decoding a record
//! yields exactly the value that was encoded.

use crate::{Particle, Wall};
use std::fmt::Write;
use thiserror::Error;

/// Longest frame accepted before the decoder gives up on it.
pub const MAX_FRAME_LEN: usize = 4096;

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("unknown message tag `{0}`")]
    UnknownTag(String),
    #[error("`{tag}` expects {expected} fields, got {found}")]
    FieldCount {
        tag: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
}

/// Kinematic state of one particle as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleState {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub velocity: f64,
    pub angle: f64,
}

impl From<&Particle> for ParticleState {
    fn from(particle: &Particle) -> Self {
        Self {
            id: particle.id,
            x: particle.x,
            y: particle.y,
            velocity: particle.speed(),
            angle: particle.heading(),
        }
    }
}

impl From<ParticleState> for Particle {
    fn from(state: ParticleState) -> Self {
        Particle::new(state.id, state.x, state.y, state.velocity, state.angle)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Welcome { client_id: u32 },
    SnapshotStart { tick: u64 },
    Particle(ParticleState),
    Wall(Wall),
    Peer { client_id: u32, x: f64, y: f64 },
    PeerGone { client_id: u32 },
}

impl ServerMessage {
    /// Appends the encoded record, terminator included, to `out`.
    pub fn write_to(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = match self {
            ServerMessage::Welcome { client_id } => write!(out, "ID:{};", client_id),
            ServerMessage::SnapshotStart { tick } => write!(out, "T:{};", tick),
            ServerMessage::Particle(p) => write!(
                out,
                "P:{},{},{},{},{};",
                p.id, p.x, p.y, p.velocity, p.angle
            ),
            ServerMessage::Wall(wall) => {
                let (start, end) = (wall.start(), wall.end());
                write!(out, "W:{},{},{},{};", start.x, start.y, end.x, end.y)
            }
            ServerMessage::Peer { client_id, x, y } => {
                write!(out, "C:{},{},{};", client_id, x, y)
            }
            ServerMessage::PeerGone { client_id } => {
                write!(out, "DISCONNECTED_CLIENT:{};", client_id)
            }
        };
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Decodes a single frame with its terminator already stripped.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let (tag, body) = split_tag(frame)?;
        match tag {
            "ID" => Ok(ServerMessage::Welcome {
                client_id: parse_id(body)?,
            }),
            "T" => Ok(ServerMessage::SnapshotStart {
                tick: body
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::InvalidNumber(body.to_string()))?,
            }),
            "P" => {
                let f = fields::<5>("P", body)?;
                Ok(ServerMessage::Particle(ParticleState {
                    id: parse_id(f[0])?,
                    x: parse_float(f[1])?,
                    y: parse_float(f[2])?,
                    velocity: parse_float(f[3])?,
                    angle: parse_float(f[4])?,
                }))
            }
            "W" => {
                let f = fields::<4>("W", body)?;
                Ok(ServerMessage::Wall(Wall::new(
                    parse_float(f[0])?,
                    parse_float(f[1])?,
                    parse_float(f[2])?,
                    parse_float(f[3])?,
                )))
            }
            "C" => {
                let f = fields::<3>("C", body)?;
                Ok(ServerMessage::Peer {
                    client_id: parse_id(f[0])?,
                    x: parse_float(f[1])?,
                    y: parse_float(f[2])?,
                })
            }
            "DISCONNECTED_CLIENT" => Ok(ServerMessage::PeerGone {
                client_id: parse_id(body)?,
            }),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientMessage {
    Move { x: f64, y: f64 },
}

impl ClientMessage {
    pub fn encode(&self) -> String {
        match self {
            ClientMessage::Move { x, y } => format!("MOVE:{},{}\n", x, y),
        }
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let (tag, body) = split_tag(frame)?;
        match tag {
            "MOVE" => {
                let f = fields::<2>("MOVE", body)?;
                Ok(ClientMessage::Move {
                    x: parse_float(f[0])?,
                    y: parse_float(f[1])?,
                })
            }
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }
}

fn split_tag(frame: &str) -> Result<(&str, &str), ProtocolError> {
    let frame = frame.trim();
    if frame.is_empty() {
        return Err(ProtocolError::Empty);
    }
    frame
        .split_once(':')
        .map(|(tag, body)| (tag.trim(), body))
        .ok_or_else(|| ProtocolError::UnknownTag(frame.to_string()))
}

fn fields<'a, const N: usize>(
    tag: &'static str,
    body: &'a str,
) -> Result<[&'a str; N], ProtocolError> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    let found = parts.len();
    parts.try_into().map_err(|_| ProtocolError::FieldCount {
        tag,
        expected: N,
        found,
    })
}

fn parse_id(raw: &str) -> Result<u32, ProtocolError> {
    raw.trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber(raw.to_string()))
}

fn parse_float(raw: &str) -> Result<f64, ProtocolError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ProtocolError::InvalidNumber(raw.to_string())),
    }
}

/// Splits a raw byte stream into frames on `;` or `\n`.
///
/// Bytes are buffered across reads, so a record split over several TCP segments
/// is reassembled before decoding. A frame that grows past [`MAX_FRAME_LEN`]
/// without a terminator is dropped up to the next terminator.
///
/// Snapshots end in `\n`, so the decoder also remembers when it has consumed
/// a newline terminator; see [`FrameDecoder::take_line_end`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    discarding: bool,
    line_ended: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet terminated.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true once for every call to `next_frame` that consumed at least
    /// one `\n` terminator. Check it before handling the frame that call
    /// returned: the newline came first in the stream.
    pub fn take_line_end(&mut self) -> bool {
        std::mem::take(&mut self.line_ended)
    }

    /// Pops the next complete, non-empty frame.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let Some(end) = self.buffer.iter().position(|b| *b == b';' || *b == b'\n') else {
                if self.buffer.len() > MAX_FRAME_LEN {
                    self.buffer.clear();
                    self.discarding = true;
                }
                return None;
            };

            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            if raw[end] == b'\n' {
                self.line_ended = true;
            }
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if raw.len() - 1 > MAX_FRAME_LEN {
                continue;
            }

            let frame = String::from_utf8_lossy(&raw[..raw.len() - 1])
                .trim()
                .to_string();
            if !frame.is_empty() {
                return Some(frame);
            }
        }
    }
}
