/*
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

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const ENV_PREFIX: &str = "H1STREAM";

pub const MAX_HEADER_BYTES_DEFAULT: usize = 8192;
pub const MAX_BODY_BYTES_DEFAULT: u64 = 10 * 1024 * 1024;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ParserConfig {
    // applies to the start line and header block, and separately to the
    // trailer block of a chunked body
    pub max_header_bytes: usize,

    // 0 means unlimited
    pub max_body_bytes: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: MAX_HEADER_BYTES_DEFAULT,
            max_body_bytes: MAX_BODY_BYTES_DEFAULT,
        }
    }
}

impl From<ParserConfig> for config::ValueKind {
    fn from(parser: ParserConfig) -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "max_header_bytes".to_string(),
            config::Value::from(parser.max_header_bytes as i64),
        );
        properties.insert(
            "max_body_bytes".to_string(),
            config::Value::from(parser.max_body_bytes as i64),
        );

        Self::Table(properties)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CustomConfig {
    pub parser: ParserConfig,
}

impl CustomConfig {
    // settings come from the defaults, then the optional ini file, then the
    // environment (e.g. H1STREAM_PARSER__MAX_BODY_BYTES=0)
    pub fn new(config_file: Option<&Path>) -> Result<CustomConfig, ConfigError> {
        let mut builder = Config::builder().set_default("parser", ParserConfig::default())?;

        if let Some(f) = config_file {
            builder = builder.add_source(File::from(f).format(FileFormat::Ini));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard};

    // the environment is process-wide, so tests that read it take turns
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_config(name: &str, content: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("h1stream-{}-{}.conf", name, std::process::id()));
        fs::write(&path, content).unwrap();

        path
    }

    #[test]
    fn test_defaults() {
        let _guard = lock_env();

        let c = CustomConfig::new(None).unwrap();

        assert_eq!(c.parser, ParserConfig::default());
        assert_eq!(c.parser.max_header_bytes, 8192);
        assert_eq!(c.parser.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_file() {
        let _guard = lock_env();

        let path = write_config(
            "file",
            "[parser]\nmax_header_bytes=4096\nmax_body_bytes=0\n",
        );

        let c = CustomConfig::new(Some(&path)).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(
            c.parser,
            ParserConfig {
                max_header_bytes: 4096,
                max_body_bytes: 0,
            }
        );
    }

    #[test]
    fn test_file_partial() {
        let _guard = lock_env();

        let path = write_config("partial", "[parser]\nmax_body_bytes=100\n");

        let c = CustomConfig::new(Some(&path)).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(c.parser.max_header_bytes, MAX_HEADER_BYTES_DEFAULT);
        assert_eq!(c.parser.max_body_bytes, 100);
    }

    #[test]
    fn test_missing_file() {
        let path = PathBuf::from("no/such/file.conf");

        assert!(CustomConfig::new(Some(&path)).is_err());
    }

    #[test]
    fn test_env_override() {
        let _guard = lock_env();

        let path = write_config(
            "env",
            "[parser]\nmax_header_bytes=4096\nmax_body_bytes=100\n",
        );

        env::set_var("H1STREAM_PARSER__MAX_HEADER_BYTES", "1234");

        let c = CustomConfig::new(Some(&path));

        env::remove_var("H1STREAM_PARSER__MAX_HEADER_BYTES");
        fs::remove_file(&path).unwrap();

        let c = c.unwrap();

        // environment wins over the file, which wins over the defaults
        assert_eq!(
            c.parser,
            ParserConfig {
                max_header_bytes: 1234,
                max_body_bytes: 100,
            }
        );
    }
}
