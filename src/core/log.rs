/*
 * Copyright (C) 2020-2023 Fanout, Inc.
 * Copyright (C) 2023 Fastly, Inc.
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

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};
use std::str;
use std::sync::OnceLock;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

// stdout carries parse output, so log lines go to stderr
pub struct SimpleLogger {
    local_offset: Option<UtcOffset>,
    level: LevelFilter,
}

impl SimpleLogger {
    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

pub fn level_name(level: Level) -> &'static str {
    match level {
        log::Level::Error => "ERR",
        log::Level::Warn => "WARN",
        log::Level::Info => "INFO",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let now = OffsetDateTime::now_utc().to_offset(self.local_offset.unwrap_or(UtcOffset::UTC));

        let format = format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        );

        let mut ts = [0u8; 64];

        let size = {
            let mut ts = io::Cursor::new(&mut ts[..]);

            if now.format_into(&mut ts, &format).is_err() {
                return;
            }

            ts.position() as usize
        };

        let ts = str::from_utf8(&ts[..size]).unwrap_or_default();

        let lname = level_name(record.level());

        let mut output = io::stderr().lock();

        // nowhere left to report a failed log write
        let _ = if record.level() <= log::Level::Info {
            writeln!(&mut output, "[{}] {} {}", lname, ts, record.args())
        } else {
            writeln!(
                &mut output,
                "[{}] {} [{}] {}",
                lname,
                ts,
                record.target(),
                record.args()
            )
        };
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<SimpleLogger> = OnceLock::new();

fn new_simple_logger(level: LevelFilter) -> SimpleLogger {
    SimpleLogger {
        // fails if other threads are running, in which case we log in UTC
        local_offset: UtcOffset::current_local_offset().ok(),
        level,
    }
}

pub fn ensure_init_simple_logger(level: LevelFilter) {
    LOGGER.get_or_init(|| new_simple_logger(level));
}

pub fn get_simple_logger() -> &'static SimpleLogger {
    LOGGER.get_or_init(|| new_simple_logger(LevelFilter::Info))
}
