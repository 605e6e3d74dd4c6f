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

use criterion::{criterion_group, criterion_main, Criterion};
use h1stream::{Mode, Parser};
use std::hint::black_box;

const REQUEST: &[u8] = b"GET /test HTTP/1.1\r\n\
    Host: localhost\r\n\
    Connection: keep-alive\r\n\
    User-Agent: Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.11\r\n\
    Accept: text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8\r\n\
    Accept-Encoding: gzip,deflate,sdch\r\n\
    Accept-Language: en-US,en;q=0.8\r\n\
    Content-Length: 64\r\n\
    \r\n\
    0123456789012345678901234567890123456789012345678901234567890123";

const CHUNKED_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
    Content-Type: text/plain\r\n\
    Transfer-Encoding: chunked\r\n\
    \r\n\
    10\r\n0123456789abcdef\r\n\
    10\r\n0123456789abcdef\r\n\
    8;ext=1\r\n01234567\r\n\
    0\r\n\
    Trailer-Field: value\r\n\
    \r\n";

fn parse(mode: Mode, src: &[u8], step: usize) -> u64 {
    let mut body_len = 0;
    let mut p = Parser::new(|data: &[u8]| body_len += data.len() as u64, mode);

    for part in src.chunks(step) {
        if let Some(r) = p.feed(part).unwrap() {
            if r.is_complete() {
                break;
            }
        }
    }

    drop(p);

    body_len
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("parse request whole", |b| {
        b.iter(|| parse(Mode::Request, black_box(REQUEST), REQUEST.len()))
    });

    c.bench_function("parse request byte at a time", |b| {
        b.iter(|| parse(Mode::Request, black_box(REQUEST), 1))
    });

    c.bench_function("parse chunked response whole", |b| {
        b.iter(|| parse(Mode::Response, black_box(CHUNKED_RESPONSE), CHUNKED_RESPONSE.len()))
    });

    c.bench_function("parse chunked response byte at a time", |b| {
        b.iter(|| parse(Mode::Response, black_box(CHUNKED_RESPONSE), 1))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
