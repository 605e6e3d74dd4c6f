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
use crate::core::http1::parser::BodySink;
use crate::core::http1::protocol::{next_line, parse_header_line, Error, HeaderLine};
use arrayvec::ArrayVec;
use log::trace;
use std::cmp;

// size digits plus any extensions, excluding the line terminator
pub const CHUNK_SIZE_LINE_MAX: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    AwaitingSizeLine,
    AwaitingChunkData(u64),
    AwaitingChunkTrailingCrlf,
    AwaitingTrailers,
    Done,
}

fn parse_chunk_size_line(line: &[u8]) -> Result<u64, Error> {
    // httparse tolerates an empty size, we don't
    match line.first() {
        Some(c) if c.is_ascii_hexdigit() => {}
        _ => return Err(Error::InvalidChunkSize),
    }

    // httparse wants the CRLF, which may have arrived as a bare LF
    let mut staged = ArrayVec::<u8, { CHUNK_SIZE_LINE_MAX + 2 }>::new();

    if staged.try_extend_from_slice(line).is_err() {
        return Err(Error::ChunkSizeLineTooLarge);
    }

    if staged.try_extend_from_slice(b"\r\n").is_err() {
        return Err(Error::ChunkSizeLineTooLarge);
    }

    match httparse::parse_chunk_size(&staged) {
        Ok(httparse::Status::Complete((_, size))) => Ok(size),
        Ok(httparse::Status::Partial) | Err(_) => Err(Error::InvalidChunkSize),
    }
}

/// Decodes a chunked body, passing chunk data to a sink as it arrives.
///
/// Trailer fields are validated and consumed but never surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkState,
    trailers_size: usize,
    trailer_field: bool,
}

#[allow(clippy::new_without_default)]
impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: ChunkState::AwaitingSizeLine,
            trailers_size: 0,
            trailer_field: false,
        }
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    // consume as much of src as possible, returning the number of bytes
    // read. body_len is the amount of body delivered so far and is advanced
    // by the amount written to the sink
    pub fn decode<S: BodySink>(
        &mut self,
        src: &[u8],
        sink: &mut S,
        body_len: &mut u64,
        config: &ParserConfig,
    ) -> Result<usize, Error> {
        let mut pos = 0;

        loop {
            let rest = &src[pos..];

            match self.state {
                ChunkState::AwaitingSizeLine => {
                    let (len, size) = match next_line(rest) {
                        Some(ret) => ret,
                        None => {
                            if rest.len() > CHUNK_SIZE_LINE_MAX + 1 {
                                return Err(Error::ChunkSizeLineTooLarge);
                            }

                            break;
                        }
                    };

                    let chunk_size = parse_chunk_size_line(&rest[..len])?;

                    if config.max_body_bytes > 0
                        && body_len.saturating_add(chunk_size) > config.max_body_bytes
                    {
                        return Err(Error::BodyTooLarge);
                    }

                    pos += size;

                    trace!("chunk size {}", chunk_size);

                    self.state = if chunk_size == 0 {
                        ChunkState::AwaitingTrailers
                    } else {
                        ChunkState::AwaitingChunkData(chunk_size)
                    };
                }
                ChunkState::AwaitingChunkData(left) => {
                    let size = cmp::min(left, rest.len() as u64) as usize;

                    if size == 0 {
                        break;
                    }

                    sink.write_body(&rest[..size]);

                    *body_len += size as u64;
                    pos += size;

                    let left = left - size as u64;

                    self.state = if left == 0 {
                        ChunkState::AwaitingChunkTrailingCrlf
                    } else {
                        ChunkState::AwaitingChunkData(left)
                    };
                }
                ChunkState::AwaitingChunkTrailingCrlf => {
                    match rest {
                        [] | [b'\r'] => break,
                        [b'\n', ..] => pos += 1,
                        [b'\r', b'\n', ..] => pos += 2,
                        _ => return Err(Error::InvalidChunkSuffix),
                    }

                    self.state = ChunkState::AwaitingSizeLine;
                }
                ChunkState::AwaitingTrailers => {
                    let (len, size) = match next_line(rest) {
                        Some(ret) => ret,
                        None => {
                            if self.trailers_size + rest.len() > config.max_header_bytes {
                                return Err(Error::HeadersTooLarge);
                            }

                            break;
                        }
                    };

                    if self.trailers_size + size > config.max_header_bytes {
                        return Err(Error::HeadersTooLarge);
                    }

                    let line = &rest[..len];

                    if line.is_empty() {
                        pos += size;

                        trace!("chunked body done, {} trailer bytes", self.trailers_size);

                        self.state = ChunkState::Done;

                        continue;
                    }

                    match parse_header_line(line)? {
                        HeaderLine::Field { .. } => self.trailer_field = true,
                        HeaderLine::Continuation(_) => {
                            if !self.trailer_field {
                                return Err(Error::MalformedHeaderLine);
                            }
                        }
                    }

                    self.trailers_size += size;
                    pos += size;
                }
                ChunkState::Done => break,
            }
        }

        Ok(pos)
    }
}
