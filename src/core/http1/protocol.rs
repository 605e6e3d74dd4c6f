/*
 * Copyright (C) 2020-2023 Fanout, Inc.
 * Copyright (C) 2024 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Line-level grammar shared by the head and trailer scanners.

use serde::Serialize;
use std::str;

const HTTP_PREFIX: &[u8] = b"HTTP/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("malformed start line")]
    MalformedStartLine,

    #[error("malformed header line")]
    MalformedHeaderLine,

    #[error("invalid content length")]
    InvalidContentLength,

    #[error("invalid chunk size")]
    InvalidChunkSize,

    #[error("invalid chunk suffix")]
    InvalidChunkSuffix,

    #[error("chunk size line too large")]
    ChunkSizeLineTooLarge,

    #[error("headers too large")]
    HeadersTooLarge,

    #[error("body too large")]
    BodyTooLarge,

    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
}

impl Error {
    // status a server would answer with before closing the connection
    pub fn status_code(&self) -> u16 {
        match self {
            Error::HeadersTooLarge => 431,
            Error::BodyTooLarge => 413,
            _ => 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Request,
    Response,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StartLine {
    Request {
        method: String,
        uri: String,
        protocol: String,
    },
    Response {
        protocol: String,
        status: u16,
        reason: String,
    },
}

impl StartLine {
    pub fn protocol(&self) -> &str {
        match self {
            StartLine::Request { protocol, .. } => protocol,
            StartLine::Response { protocol, .. } => protocol,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum HeaderLine<'a> {
    Field { name: &'a str, value: &'a [u8] },
    Continuation(&'a [u8]),
}

pub fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&c)
}

fn is_token(src: &[u8]) -> bool {
    !src.is_empty() && src.iter().all(|&c| is_token_char(c))
}

fn is_space(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

// field content may contain any visible octet, spaces and obs-text, but no
// other control characters
fn is_field_content(src: &[u8]) -> bool {
    src.iter().all(|&c| c == b'\t' || (c >= 0x20 && c != 0x7f))
}

pub fn trim_space(src: &[u8]) -> &[u8] {
    let start = match src.iter().position(|&c| !is_space(c)) {
        Some(pos) => pos,
        None => return &src[..0],
    };

    // a non-space byte exists, so this always succeeds
    let end = src.iter().rposition(|&c| !is_space(c)).unwrap_or(start);

    &src[start..(end + 1)]
}

// return (content length, consumed size) of the next line, excluding the
// terminator. lines end with LF, optionally preceded by CR
pub fn next_line(src: &[u8]) -> Option<(usize, usize)> {
    let pos = src.iter().position(|&c| c == b'\n')?;

    let len = if pos > 0 && src[pos - 1] == b'\r' {
        pos - 1
    } else {
        pos
    };

    Some((len, pos + 1))
}

// "HTTP/" 1*DIGIT "." 1*DIGIT, returning the part after the slash
fn parse_version(src: &[u8]) -> Result<&str, Error> {
    if !src.starts_with(HTTP_PREFIX) {
        return Err(Error::MalformedStartLine);
    }

    let ver = &src[HTTP_PREFIX.len()..];

    let dot = match ver.iter().position(|&c| c == b'.') {
        Some(pos) => pos,
        None => return Err(Error::MalformedStartLine),
    };

    let (major, minor) = (&ver[..dot], &ver[(dot + 1)..]);

    if major.is_empty()
        || minor.is_empty()
        || !major.iter().all(u8::is_ascii_digit)
        || !minor.iter().all(u8::is_ascii_digit)
    {
        return Err(Error::MalformedStartLine);
    }

    // digits and a dot are always utf-8
    str::from_utf8(ver).map_err(|_| Error::MalformedStartLine)
}

fn parse_request_line(line: &[u8]) -> Result<StartLine, Error> {
    let mut parts = line.split(|&c| c == b' ');

    let method = parts.next().unwrap_or_default();
    let uri = parts.next().unwrap_or_default();
    let version = parts.next().unwrap_or_default();

    if parts.next().is_some() || !is_token(method) || uri.is_empty() || !is_field_content(uri) {
        return Err(Error::MalformedStartLine);
    }

    let protocol = parse_version(version)?;

    // tokens are always ascii
    let method = str::from_utf8(method).map_err(|_| Error::MalformedStartLine)?;

    Ok(StartLine::Request {
        method: method.to_string(),
        uri: String::from_utf8_lossy(uri).into_owned(),
        protocol: protocol.to_string(),
    })
}

fn parse_status_line(line: &[u8]) -> Result<StartLine, Error> {
    let mut parts = line.splitn(3, |&c| c == b' ');

    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    let reason = parts.next().unwrap_or_default();

    let protocol = parse_version(version)?;

    if code.len() != 3 || !code.iter().all(u8::is_ascii_digit) || !is_field_content(reason) {
        return Err(Error::MalformedStartLine);
    }

    let status = code
        .iter()
        .fold(0u16, |acc, &c| acc * 10 + u16::from(c - b'0'));

    Ok(StartLine::Response {
        protocol: protocol.to_string(),
        status,
        reason: String::from_utf8_lossy(trim_space(reason)).into_owned(),
    })
}

pub fn parse_start_line(mode: Mode, line: &[u8]) -> Result<StartLine, Error> {
    match mode {
        Mode::Request => parse_request_line(line),
        Mode::Response => parse_status_line(line),
    }
}

pub fn parse_header_line(line: &[u8]) -> Result<HeaderLine, Error> {
    if !is_field_content(line) {
        return Err(Error::MalformedHeaderLine);
    }

    if let Some(&c) = line.first() {
        if is_space(c) {
            return Ok(HeaderLine::Continuation(trim_space(line)));
        }
    }

    let pos = match line.iter().position(|&c| c == b':') {
        Some(pos) => pos,
        None => return Err(Error::MalformedHeaderLine),
    };

    let name = &line[..pos];

    // no whitespace allowed between the name and the colon
    if !is_token(name) {
        return Err(Error::MalformedHeaderLine);
    }

    let name = str::from_utf8(name).map_err(|_| Error::MalformedHeaderLine)?;

    Ok(HeaderLine::Field {
        name,
        value: trim_space(&line[(pos + 1)..]),
    })
}

pub fn parse_content_length(src: &str) -> Result<u64, Error> {
    if src.is_empty() || !src.bytes().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidContentLength);
    }

    src.parse().map_err(|_| Error::InvalidContentLength)
}

pub fn header_contains_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .map(|part| match part.find(';') {
            Some(pos) => &part[..pos],
            None => part,
        })
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_next_line() {
        assert_eq!(next_line(b""), None);
        assert_eq!(next_line(b"GET / HTTP/1.1"), None);
        assert_eq!(next_line(b"GET / HTTP/1.1\r"), None);
        assert_eq!(next_line(b"abc\r\ndef"), Some((3, 5)));
        assert_eq!(next_line(b"abc\ndef"), Some((3, 4)));
        assert_eq!(next_line(b"\r\n"), Some((0, 2)));
        assert_eq!(next_line(b"\n"), Some((0, 1)));
    }

    #[test]
    fn test_trim_space() {
        assert_eq!(trim_space(b""), b"");
        assert_eq!(trim_space(b" \t "), b"");
        assert_eq!(trim_space(b"\t line2"), b"line2");
        assert_eq!(trim_space(b"  a b \t"), b"a b");
    }

    #[test]
    fn test_parse_request_line() {
        assert_eq!(
            parse_start_line(Mode::Request, b"GET / HTTP/1.1"),
            Ok(StartLine::Request {
                method: "GET".to_string(),
                uri: "/".to_string(),
                protocol: "1.1".to_string(),
            })
        );

        assert_eq!(
            parse_start_line(Mode::Request, b"OPTIONS * HTTP/1.0"),
            Ok(StartLine::Request {
                method: "OPTIONS".to_string(),
                uri: "*".to_string(),
                protocol: "1.0".to_string(),
            })
        );

        let bad: &[&[u8]] = &[
            b"",
            b"GET",
            b"GET /",
            b"GET / HTTP/1.1 extra",
            b"GET  / HTTP/1.1",
            b"G(T / HTTP/1.1",
            b"GET / HTTPS/1.1",
            b"GET / HTTP/1",
            b"GET / HTTP/1.x",
            b"GET /\x01 HTTP/1.1",
        ];

        for line in bad {
            assert_eq!(
                parse_start_line(Mode::Request, line),
                Err(Error::MalformedStartLine),
                "{:?}",
                String::from_utf8_lossy(line)
            );
        }
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(
            parse_start_line(Mode::Response, b"HTTP/1.1 200 OK"),
            Ok(StartLine::Response {
                protocol: "1.1".to_string(),
                status: 200,
                reason: "OK".to_string(),
            })
        );

        assert_eq!(
            parse_start_line(Mode::Response, b"HTTP/1.0 404 Not Found"),
            Ok(StartLine::Response {
                protocol: "1.0".to_string(),
                status: 404,
                reason: "Not Found".to_string(),
            })
        );

        // empty reason
        assert_eq!(
            parse_start_line(Mode::Response, b"HTTP/1.1 204"),
            Ok(StartLine::Response {
                protocol: "1.1".to_string(),
                status: 204,
                reason: String::new(),
            })
        );

        assert_eq!(
            parse_start_line(Mode::Response, b"HTTP/1.1 304 "),
            Ok(StartLine::Response {
                protocol: "1.1".to_string(),
                status: 304,
                reason: String::new(),
            })
        );

        let bad: &[&[u8]] = &[
            b"",
            b"HTTP/1.1",
            b"HTTP/1.1 20 OK",
            b"HTTP/1.1 2000 OK",
            b"HTTP/1.1 2x0 OK",
            b"HTTX/1.1 200 OK",
            b"GET / HTTP/1.1",
        ];

        for line in bad {
            assert_eq!(
                parse_start_line(Mode::Response, line),
                Err(Error::MalformedStartLine),
                "{:?}",
                String::from_utf8_lossy(line)
            );
        }
    }

    #[test]
    fn test_parse_header_line() {
        assert_eq!(
            parse_header_line(b"Host: localhost:80"),
            Ok(HeaderLine::Field {
                name: "Host",
                value: b"localhost:80",
            })
        );

        assert_eq!(
            parse_header_line(b"X-Empty:"),
            Ok(HeaderLine::Field {
                name: "X-Empty",
                value: b"",
            })
        );

        assert_eq!(
            parse_header_line(b"X-Spaced: \t a b \t"),
            Ok(HeaderLine::Field {
                name: "X-Spaced",
                value: b"a b",
            })
        );

        assert_eq!(
            parse_header_line(b"\t\x20line2"),
            Ok(HeaderLine::Continuation(b"line2"))
        );

        assert_eq!(
            parse_header_line(b"no colon"),
            Err(Error::MalformedHeaderLine)
        );
        assert_eq!(parse_header_line(b": value"), Err(Error::MalformedHeaderLine));
        assert_eq!(
            parse_header_line(b"Host : localhost"),
            Err(Error::MalformedHeaderLine)
        );
        assert_eq!(
            parse_header_line(b"Host: local\rhost"),
            Err(Error::MalformedHeaderLine)
        );
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length("0"), Ok(0));
        assert_eq!(parse_content_length("1992"), Ok(1992));
        assert_eq!(parse_content_length(""), Err(Error::InvalidContentLength));
        assert_eq!(parse_content_length("-1"), Err(Error::InvalidContentLength));
        assert_eq!(parse_content_length("+3"), Err(Error::InvalidContentLength));
        assert_eq!(parse_content_length("3 4"), Err(Error::InvalidContentLength));
        assert_eq!(
            parse_content_length("99999999999999999999999"),
            Err(Error::InvalidContentLength)
        );
    }

    #[test]
    fn test_header_contains_token() {
        assert!(header_contains_token("chunked", "chunked"));
        assert!(header_contains_token("Chunked", "chunked"));
        assert!(header_contains_token("gzip, chunked", "chunked"));
        assert!(header_contains_token("gzip,chunked;q=1", "chunked"));
        assert!(!header_contains_token("gzip", "chunked"));
        assert!(!header_contains_token("xchunked", "chunked"));
    }

    #[test]
    fn test_status_code() {
        assert_eq!(Error::MalformedStartLine.status_code(), 400);
        assert_eq!(Error::InvalidChunkSize.status_code(), 400);
        assert_eq!(Error::HeadersTooLarge.status_code(), 431);
        assert_eq!(Error::BodyTooLarge.status_code(), 413);
    }
}
