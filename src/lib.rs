/*
 * Copyright (C) 2020-2021 Fanout, Inc.
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

//! Incremental HTTP/1.x message parsing.
//!
//! A [`Parser`] accepts input in arbitrarily sized pieces and reports the
//! start line and headers of each message as soon as the header block is
//! complete. Body data is decoded (fixed length or chunked) and handed to a
//! [`BodySink`] as it arrives.

pub mod core;

pub use crate::core::config::ParserConfig;
pub use crate::core::http1::headers::{HeaderTable, HeaderValue};
pub use crate::core::http1::{
    BodySink, BodyStrategy, DiscardBody, Error, Mode, ParseResult, Parser, StartLine,
};
