/*
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

use crate::core::http1::protocol::{header_contains_token, parse_content_length, Error};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Text(String),
    Length(u64),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            HeaderValue::Length(_) => None,
        }
    }

    pub fn as_length(&self) -> Option<u64> {
        match self {
            HeaderValue::Text(_) => None,
            HeaderValue::Length(x) => Some(*x),
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeaderValue::Text(s) => write!(f, "{}", s),
            HeaderValue::Length(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Text(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Text(s)
    }
}

impl From<u64> for HeaderValue {
    fn from(x: u64) -> Self {
        HeaderValue::Length(x)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    values: Vec<HeaderValue>,
}

/// Header fields in wire order.
///
/// Each distinct name (compared case-insensitively) has one entry, keyed by
/// the casing it was first received with. Repeated fields append to that
/// entry's values.
#[derive(Debug, Clone, Default)]
pub struct HeaderTable {
    entries: Vec<Entry>,

    // entry that received the most recent field line, for folding
    last: Option<usize>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&[HeaderValue]> {
        self.find(name).map(|i| self.entries[i].values.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[HeaderValue])> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.values.as_slice()))
    }

    pub fn append<V: Into<HeaderValue>>(&mut self, name: &str, value: V) {
        let i = match self.find(name) {
            Some(i) => i,
            None => {
                self.entries.push(Entry {
                    name: name.to_string(),
                    values: Vec::new(),
                });

                self.entries.len() - 1
            }
        };

        self.entries[i].values.push(value.into());
        self.last = Some(i);
    }

    // append a continuation segment to the most recently received value.
    // returns false if there is no text value to continue
    pub fn fold(&mut self, segment: &str) -> bool {
        let i = match self.last {
            Some(i) => i,
            None => return false,
        };

        match self.entries[i].values.last_mut() {
            Some(HeaderValue::Text(s)) => {
                if !segment.is_empty() {
                    if !s.is_empty() {
                        s.push(' ');
                    }

                    s.push_str(segment);
                }

                true
            }
            _ => false,
        }
    }

    // convert Content-Length values to integers, returning the declared
    // length. repeated values must agree
    pub fn resolve_content_length(&mut self) -> Result<Option<u64>, Error> {
        let i = match self.find(CONTENT_LENGTH) {
            Some(i) => i,
            None => return Ok(None),
        };

        let mut len = None;

        for v in self.entries[i].values.iter_mut() {
            let x = match v {
                HeaderValue::Text(s) => parse_content_length(s)?,
                HeaderValue::Length(x) => *x,
            };

            if let Some(prev) = len {
                if prev != x {
                    return Err(Error::InvalidContentLength);
                }
            }

            *v = HeaderValue::Length(x);
            len = Some(x);
        }

        Ok(len)
    }

    // convert the Content-Length values that are valid integers, leaving
    // the rest as received. used when the field plays no part in framing
    pub fn coerce_content_length(&mut self) {
        let i = match self.find(CONTENT_LENGTH) {
            Some(i) => i,
            None => return,
        };

        for v in self.entries[i].values.iter_mut() {
            if let HeaderValue::Text(s) = v {
                if let Ok(x) = parse_content_length(s) {
                    *v = HeaderValue::Length(x);
                }
            }
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH)?
            .iter()
            .find_map(HeaderValue::as_length)
    }

    // whether any value of the named field lists the token
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        match self.get(name) {
            Some(values) => values
                .iter()
                .filter_map(HeaderValue::as_str)
                .any(|v| header_contains_token(v, token)),
            None => false,
        }
    }
}

// the folding cursor is parse state, not content
impl PartialEq for HeaderTable {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for HeaderTable {}

impl Serialize for HeaderTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;

        for e in self.entries.iter() {
            map.serialize_entry(&e.name, &e.values)?;
        }

        map.end()
    }
}
