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

use clap::{Arg, ArgAction, Command};
use h1stream::core::config::CustomConfig;
use h1stream::core::log::{ensure_init_simple_logger, get_simple_logger};
use h1stream::{DiscardBody, Mode, ParseResult, Parser};
use log::{debug, LevelFilter};
use std::error::Error;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

const PROGRAM_NAME: &str = "h1stream-dump";
const READ_SIZE_DEFAULT: &str = "4096";

struct Args {
    mode: Mode,
    read_size: usize,
    expect: Vec<String>,
    config_file: Option<PathBuf>,
    input: Option<PathBuf>,
}

fn write_result<W: Write>(out: &mut W, r: &ParseResult) -> Result<(), Box<dyn Error>> {
    let mut v = serde_json::to_value(r)?;

    if let serde_json::Value::Object(m) = &mut v {
        m.insert("bodyLength".to_string(), r.body_len.into());
    }

    writeln!(out, "{}", v)?;

    Ok(())
}

fn parse_error(e: h1stream::Error) -> Box<dyn Error> {
    format!("{} ({})", e, e.status_code()).into()
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    if args.read_size == 0 {
        return Err("read size must be greater than 0".into());
    }

    let config = CustomConfig::new(args.config_file.as_deref())?;

    debug!("parser config: {:?}", config.parser);

    let mut input: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(io::stdin()),
    };

    let mut parser = Parser::with_config(DiscardBody, args.mode, config.parser);

    for method in args.expect.iter() {
        parser.enqueue_response_method_match(method);
    }

    let mut buf = vec![0; args.read_size];
    let mut out = io::stdout().lock();

    loop {
        let size = input.read(&mut buf)?;

        if size == 0 {
            break;
        }

        let mut data = &buf[..size];

        // drain every message completed by this read
        loop {
            match parser.feed(data).map_err(parse_error)? {
                Some(r) if r.is_complete() => write_result(&mut out, &r)?,
                _ => break,
            }

            if parser.buffered().is_empty() {
                break;
            }

            data = &[];
        }
    }

    parser.finish().map_err(parse_error)?;

    Ok(())
}

fn main() {
    let matches = Command::new(PROGRAM_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Parse HTTP/1.x messages and print them as JSON")
        .arg(
            Arg::new("input")
                .num_args(1)
                .value_name("file")
                .help("File to read from (default: standard input)"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .num_args(1)
                .value_name("mode")
                .value_parser(["request", "response"])
                .help("Kind of messages to expect")
                .default_value("request"),
        )
        .arg(
            Arg::new("read-size")
                .long("read-size")
                .num_args(1)
                .value_name("bytes")
                .help("Number of bytes to feed at a time")
                .default_value(READ_SIZE_DEFAULT),
        )
        .arg(
            Arg::new("expect")
                .short('e')
                .long("expect")
                .num_args(1)
                .value_name("method")
                .action(ArgAction::Append)
                .help("Method of a request the next response answers (response mode)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .num_args(1)
                .value_name("file")
                .help("Config file"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .value_name("x")
                .help("Log level (0-4)")
                .default_value("2"),
        )
        .get_matches();

    let log_level = matches.get_one::<String>("log-level").unwrap();

    let log_level: u8 = match log_level.parse() {
        Ok(x) => x,
        Err(e) => {
            eprintln!("Error: failed to parse log-level: {}", e);
            process::exit(1);
        }
    };

    let level = match log_level {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        4..=u8::MAX => LevelFilter::Trace,
    };

    ensure_init_simple_logger(level);
    log::set_logger(get_simple_logger()).unwrap();
    log::set_max_level(level);

    let mode = match matches.get_one::<String>("mode").unwrap().as_str() {
        "response" => Mode::Response,
        _ => Mode::Request,
    };

    let read_size = matches.get_one::<String>("read-size").unwrap();

    let read_size: usize = match read_size.parse() {
        Ok(x) => x,
        Err(e) => {
            eprintln!("Error: failed to parse read-size: {}", e);
            process::exit(1);
        }
    };

    let expect = matches
        .get_many::<String>("expect")
        .unwrap_or_default()
        .map(|v| v.to_owned())
        .collect();

    let config_file = matches.get_one::<String>("config").map(PathBuf::from);

    let input = matches.get_one::<String>("input").map(PathBuf::from);

    let args = Args {
        mode,
        read_size,
        expect,
        config_file,
        input,
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
