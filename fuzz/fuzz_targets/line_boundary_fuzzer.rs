//! Fuzz target for the bounded line decoder
//!
//! Prevent unbounded buffering and malformed lines reaching the session
//! (HIGH priority)
//!
//! # Strategy
//!
//! - Chunking: The same stream split at arbitrary read boundaries
//! - Terminators: `\n`, NUL, `\r\n` and NUL padding between lines
//! - Length: Lines just under, at and over each protocol limit
//! - Encoding: Random bytes, including invalid UTF-8
//!
//! # Invariants
//!
//! - Decoded line content NEVER exceeds the limit
//! - Decoded lines NEVER contain `\n` or NUL
//! - While waiting for more bytes the buffer holds at most `limit` bytes
//! - All decode errors are structured (never panic)

#![no_main]

use arbitrary::Arbitrary;
use bytes::BytesMut;
use huddle_proto::{
    limits::{GROUP_LIST_LINE_LIMIT, MESSAGE_LINE_LIMIT, TOKEN_LINE_LIMIT},
    line::{decode_eof, decode_line},
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct LineStream {
    limit: LimitChoice,
    chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Arbitrary)]
enum LimitChoice {
    Token,
    GroupList,
    Message,
    Tiny(u8),
}

#[derive(Debug, Clone, Arbitrary)]
enum Chunk {
    Line { text: String, terminator: Terminator },
    Padding(u8),
    Filler { len: u16, byte: u8 },
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, Arbitrary)]
enum Terminator {
    Newline,
    CrLf,
    Nul,
    None,
}

fn check_line(line: &str, limit: usize) {
    assert!(line.len() <= limit, "line of {} bytes over limit {limit}", line.len());
    assert!(!line.contains('\n'));
    assert!(!line.contains('\0'));
}

fuzz_target!(|stream: LineStream| {
    let limit = match stream.limit {
        LimitChoice::Token => TOKEN_LINE_LIMIT,
        LimitChoice::GroupList => GROUP_LIST_LINE_LIMIT,
        LimitChoice::Message => MESSAGE_LINE_LIMIT,
        LimitChoice::Tiny(n) => n as usize,
    };

    let mut buf = BytesMut::new();

    for chunk in stream.chunks {
        match chunk {
            Chunk::Line { text, terminator } => {
                buf.extend_from_slice(text.as_bytes());
                match terminator {
                    Terminator::Newline => buf.extend_from_slice(b"\n"),
                    Terminator::CrLf => buf.extend_from_slice(b"\r\n"),
                    Terminator::Nul => buf.extend_from_slice(b"\0"),
                    Terminator::None => {},
                }
            },
            Chunk::Padding(n) => buf.extend(std::iter::repeat(0u8).take(n as usize)),
            Chunk::Filler { len, byte } => {
                buf.extend(std::iter::repeat(byte).take((len % 4096) as usize));
            },
            Chunk::Raw(bytes) => buf.extend_from_slice(&bytes),
        }

        loop {
            match decode_line(&mut buf, limit) {
                Ok(Some(line)) => check_line(&line, limit),
                Ok(None) => {
                    assert!(buf.len() <= limit, "buffered {} bytes over limit {limit}", buf.len());
                    break;
                },
                // the session closes here
                Err(_) => return,
            }
        }
    }

    if let Ok(Some(line)) = decode_eof(&mut buf, limit) {
        assert!(!line.contains('\n'));
    }
});
