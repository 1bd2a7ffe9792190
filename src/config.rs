// Configuration file handling. Every field has a default, so the file is optional.
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

pub mod config_json;

pub use config_json::{ConsoleParameters, PortParameters, RunnerConfig, TransferParameters};

pub fn read_configuration(config_path: &Path) -> Result<RunnerConfig> {
    let config_str = fs::read_to_string(config_path)?;
    parse_configuration(config_path, &config_str)
}

fn parse_configuration(config_path: &Path, config_str: &str) -> Result<RunnerConfig> {
    serde_json::from_str(config_str).map_err(|source| Error::Config {
        path: config_path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = parse_configuration(Path::new("config.json"), "{}").unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.port.tx_buffer_size, 4096);
        assert_eq!(config.console.trigger_key, 'x');
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_configuration(
            Path::new("config.json"),
            r#"{"transfer": {"stall_timeout_msec": 500}, "console": {"trigger_key": "b"}}"#,
        )
        .unwrap();
        assert_eq!(config.transfer.stall_timeout_msec, 500);
        assert_eq!(config.transfer.stall_retry_msec, 1);
        assert_eq!(config.console.trigger_key, 'b');
        assert_eq!(config.console.poll_interval_msec, 1);
    }

    #[test]
    fn trigger_key_must_be_a_letter_other_than_c() {
        for bad in ["c", "C", "1", "é"] {
            let text = format!(r#"{{"console": {{"trigger_key": "{}"}}}}"#, bad);
            let err = parse_configuration(Path::new("config.json"), &text).unwrap_err();
            assert!(
                format!("{err}").contains("trigger_key must be an ASCII letter"),
                "{bad}: {err}"
            );
        }
        let config =
            parse_configuration(Path::new("config.json"), r#"{"console": {"trigger_key": "B"}}"#)
                .unwrap();
        assert_eq!(config.console.trigger_key, 'b');
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let err = parse_configuration(Path::new("bad.json"), "{ port: ").unwrap_err();
        match err {
            Error::Config { path, .. } => assert_eq!(path, Path::new("bad.json")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
