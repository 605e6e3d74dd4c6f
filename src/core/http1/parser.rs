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

use crate::core::config::ParserConfig;
use crate::core::http1::chunked::{ChunkState, ChunkedDecoder};
use crate::core::http1::headers::{HeaderTable, TRANSFER_ENCODING};
use crate::core::http1::protocol::{
    next_line, parse_header_line, parse_start_line, Error, HeaderLine, Mode, StartLine,
};
use log::{debug, trace, warn};
use serde::Serialize;
use std::cmp;
use std::collections::VecDeque;

/// Receives decoded body data, in wire order.
pub trait BodySink {
    fn write_body(&mut self, data: &[u8]);
}

impl<F> BodySink for F
where
    F: FnMut(&[u8]),
{
    fn write_body(&mut self, data: &[u8]) {
        self(data)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardBody;

impl BodySink for DiscardBody {
    fn write_body(&mut self, _data: &[u8]) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyStrategy {
    None,
    FixedLength(u64),
    Chunked(ChunkedDecoder),
}

/// Snapshot of the message being parsed.
///
/// Body data is never part of the result. It only reaches the sink the
/// parser was constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    #[serde(flatten)]
    pub start: StartLine,

    pub headers: HeaderTable,

    #[serde(rename = "headersOnly")]
    pub headers_only: bool,

    // start line and header block as received
    #[serde(skip)]
    pub trace: Vec<u8>,

    // body bytes delivered to the sink so far
    #[serde(skip)]
    pub body_len: u64,
}

impl ParseResult {
    pub fn method(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { uri, .. } => Some(uri),
            StartLine::Response { .. } => None,
        }
    }

    pub fn protocol(&self) -> &str {
        self.start.protocol()
    }

    pub fn status(&self) -> Option<u16> {
        match &self.start {
            StartLine::Request { .. } => None,
            StartLine::Response { status, .. } => Some(*status),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { .. } => None,
            StartLine::Response { reason, .. } => Some(reason),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.headers_only
    }
}

#[derive(Debug)]
enum Phase {
    StartLine,
    Headers,
    Body(BodyStrategy),

    // message reported complete. the next feed starts a new one
    Complete,

    Failed(Error),
}

/// Incremental HTTP/1.x message parser.
///
/// Bytes are appended with [`Parser::feed`], which advances as far as the
/// buffered input allows. Once the header block of a message is complete,
/// every call returns a [`ParseResult`] for it, with `headers_only` set until
/// the body has been fully delivered to the sink. Bytes following a complete
/// message stay buffered and begin the next message on the next call.
pub struct Parser<S = DiscardBody> {
    mode: Mode,
    config: ParserConfig,
    sink: S,
    buf: Vec<u8>,
    phase: Phase,
    start: Option<StartLine>,
    headers: HeaderTable,
    trace: Vec<u8>,
    body_len: u64,
    methods: VecDeque<String>,
}

impl<S: BodySink> Parser<S> {
    pub fn new(sink: S, mode: Mode) -> Self {
        Self::with_config(sink, mode, ParserConfig::default())
    }

    pub fn with_config(sink: S, mode: Mode, config: ParserConfig) -> Self {
        Self {
            mode,
            config,
            sink,
            buf: Vec::new(),
            phase: Phase::StartLine,
            start: None,
            headers: HeaderTable::new(),
            trace: Vec::new(),
            body_len: 0,
            methods: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    // unconsumed input
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buf
    }

    pub fn body_strategy(&self) -> Option<&BodyStrategy> {
        match &self.phase {
            Phase::Body(strategy) => Some(strategy),
            _ => None,
        }
    }

    pub fn chunk_state(&self) -> Option<ChunkState> {
        match &self.phase {
            Phase::Body(BodyStrategy::Chunked(d)) => Some(d.state()),
            _ => None,
        }
    }

    // true when no message is in progress
    pub fn is_idle(&self) -> bool {
        match self.phase {
            Phase::StartLine => self.start.is_none() && self.buf.is_empty(),
            Phase::Complete => self.buf.is_empty(),
            _ => false,
        }
    }

    pub fn pending_response_methods(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|s| s.as_str())
    }

    /// Registers the method of a request sent on the connection, so that the
    /// matching response can be framed. Call once per request, in send
    /// order. Has no effect in request mode.
    pub fn enqueue_response_method_match(&mut self, method: &str) {
        if self.mode != Mode::Response {
            warn!("ignoring response method match in request mode");
            return;
        }

        self.methods.push_back(method.to_string());
    }

    /// Appends `data` and parses as far as possible.
    ///
    /// Returns `Ok(None)` while the start line and header block of the
    /// current message are incomplete. `data` may be empty, to resume
    /// processing of already buffered input.
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<ParseResult>, Error> {
        if let Phase::Failed(e) = &self.phase {
            return Err(e.clone());
        }

        self.buf.extend_from_slice(data);

        if let Phase::Complete = self.phase {
            self.reset();
        }

        let mut pos = 0;
        let ret = self.advance(&mut pos);

        // drop consumed bytes even on failure, so the buffer never holds
        // input that was already processed
        self.buf.drain(..pos);

        if let Err(e) = ret {
            debug!("parse failed: {}", e);

            self.phase = Phase::Failed(e.clone());

            return Err(e);
        }

        Ok(match self.phase {
            Phase::Body(_) => self.snapshot(true),
            Phase::Complete => self.snapshot(false),
            _ => None,
        })
    }

    /// Signals that the input stream has ended.
    ///
    /// Fails with [`Error::UnexpectedEndOfInput`] if a message is in
    /// progress.
    pub fn finish(&mut self) -> Result<(), Error> {
        if let Phase::Failed(e) = &self.phase {
            return Err(e.clone());
        }

        if self.is_idle() {
            return Ok(());
        }

        self.phase = Phase::Failed(Error::UnexpectedEndOfInput);

        Err(Error::UnexpectedEndOfInput)
    }

    fn reset(&mut self) {
        self.phase = Phase::StartLine;
        self.start = None;
        self.headers = HeaderTable::new();
        self.trace.clear();
        self.body_len = 0;
    }

    fn snapshot(&self, headers_only: bool) -> Option<ParseResult> {
        let start = self.start.clone()?;

        Some(ParseResult {
            start,
            headers: self.headers.clone(),
            headers_only,
            trace: self.trace.clone(),
            body_len: self.body_len,
        })
    }

    fn check_head_size(&self, pending: usize) -> Result<(), Error> {
        if self.trace.len() + pending > self.config.max_header_bytes {
            return Err(Error::HeadersTooLarge);
        }

        Ok(())
    }

    fn advance(&mut self, pos: &mut usize) -> Result<(), Error> {
        loop {
            let progressed = match self.phase {
                Phase::StartLine => self.process_start_line(pos)?,
                Phase::Headers => self.process_header_line(pos)?,
                Phase::Body(_) => self.process_body(pos)?,
                Phase::Complete | Phase::Failed(_) => false,
            };

            if !progressed {
                return Ok(());
            }
        }
    }

    // returns true if a line was consumed
    fn process_start_line(&mut self, pos: &mut usize) -> Result<bool, Error> {
        let src = &self.buf[*pos..];

        let (len, size) = match next_line(src) {
            Some(ret) => ret,
            None => {
                self.check_head_size(src.len())?;

                return Ok(false);
            }
        };

        // tolerate empty lines ahead of the start line
        if len == 0 {
            *pos += size;

            return Ok(true);
        }

        self.check_head_size(size)?;

        let start = parse_start_line(self.mode, &src[..len])?;

        trace!("start line: {:?}", start);

        self.trace.extend_from_slice(&self.buf[*pos..(*pos + size)]);
        *pos += size;

        self.start = Some(start);
        self.phase = Phase::Headers;

        Ok(true)
    }

    fn process_header_line(&mut self, pos: &mut usize) -> Result<bool, Error> {
        let src = &self.buf[*pos..];

        let (len, size) = match next_line(src) {
            Some(ret) => ret,
            None => {
                self.check_head_size(src.len())?;

                return Ok(false);
            }
        };

        self.check_head_size(size)?;

        let line = &src[..len];

        if !line.is_empty() {
            match parse_header_line(line)? {
                HeaderLine::Field { name, value } => {
                    self.headers
                        .append(name, String::from_utf8_lossy(value).into_owned());
                }
                HeaderLine::Continuation(segment) => {
                    if !self.headers.fold(&String::from_utf8_lossy(segment)) {
                        return Err(Error::MalformedHeaderLine);
                    }
                }
            }

            self.trace.extend_from_slice(&self.buf[*pos..(*pos + size)]);
            *pos += size;

            return Ok(true);
        }

        self.trace.extend_from_slice(&self.buf[*pos..(*pos + size)]);
        *pos += size;

        let strategy = self.resolve_body()?;

        debug!("body strategy: {:?}", strategy);

        self.phase = match strategy {
            BodyStrategy::None => Phase::Complete,
            strategy => Phase::Body(strategy),
        };

        Ok(true)
    }

    fn resolve_body(&mut self) -> Result<BodyStrategy, Error> {
        if let Some(StartLine::Response { status, .. }) = &self.start {
            let method = self.methods.pop_front();

            let head = match &method {
                Some(m) => m.eq_ignore_ascii_case("HEAD"),
                None => false,
            };

            if head || matches!(status, 100..=199 | 204 | 304) {
                self.headers.coerce_content_length();

                return Ok(BodyStrategy::None);
            }
        }

        if self.headers.contains_token(TRANSFER_ENCODING, "chunked") {
            self.headers.coerce_content_length();

            return Ok(BodyStrategy::Chunked(ChunkedDecoder::new()));
        }

        if self.headers.contains(TRANSFER_ENCODING) {
            debug!("ignoring unsupported transfer encoding");
        }

        // framing depends on it, so it must be valid
        match self.headers.resolve_content_length()? {
            Some(len) => {
                if self.config.max_body_bytes > 0 && len > self.config.max_body_bytes {
                    return Err(Error::BodyTooLarge);
                }

                Ok(BodyStrategy::FixedLength(len))
            }
            None => Ok(BodyStrategy::None),
        }
    }

    fn process_body(&mut self, pos: &mut usize) -> Result<bool, Error> {
        let done = match &mut self.phase {
            Phase::Body(BodyStrategy::FixedLength(left)) => {
                let src = &self.buf[*pos..];
                let size = cmp::min(*left, src.len() as u64) as usize;

                if size > 0 {
                    self.sink.write_body(&src[..size]);

                    *left -= size as u64;
                    self.body_len += size as u64;
                    *pos += size;
                }

                *left == 0
            }
            Phase::Body(BodyStrategy::Chunked(decoder)) => {
                let size = decoder.decode(
                    &self.buf[*pos..],
                    &mut self.sink,
                    &mut self.body_len,
                    &self.config,
                )?;

                *pos += size;

                decoder.is_done()
            }
            _ => false,
        };

        if done {
            trace!("message complete, body {} bytes", self.body_len);

            self.phase = Phase::Complete;
        }

        Ok(done)
    }
}
