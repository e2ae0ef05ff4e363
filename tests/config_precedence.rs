//! Exercises the real `clap` parser (not a hand-built `CliArgs` literal) to
//! confirm argv wins over the config file the way `main.rs` relies on.

use std::time::Duration;

use clap::Parser;

use shelfd::config::{CliArgs, ServerConfig};

#[test]
fn argv_flag_overrides_the_same_key_in_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelfd.conf");
    std::fs::write(&path, "flush-graphite = 10.0.0.9:3003\n").unwrap();

    let args = CliArgs::parse_from([
        "shelfd",
        "--config-file",
        path.to_str().unwrap(),
        "--flush-graphite",
        "10.0.0.1:2003",
    ]);
    let merged = args.merge_config_file().unwrap();
    let config = ServerConfig::from_cli_args(&merged).unwrap();

    let graphite_addrs: Vec<String> = config
        .destinations
        .iter()
        .filter_map(|dest| match dest {
            shelfd::config::DestinationSpec::Graphite(addr) => Some(addr.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(graphite_addrs, vec!["10.0.0.1:2003"]);
}

#[test]
fn config_file_value_is_used_when_argv_omits_the_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelfd.conf");
    std::fs::write(&path, "flush-graphite = 10.0.0.9:3003\n").unwrap();

    let args = CliArgs::parse_from(["shelfd", "--config-file", path.to_str().unwrap()]);
    let merged = args.merge_config_file().unwrap();
    let config = ServerConfig::from_cli_args(&merged).unwrap();

    let graphite_addrs: Vec<String> = config
        .destinations
        .iter()
        .filter_map(|dest| match dest {
            shelfd::config::DestinationSpec::Graphite(addr) => Some(addr.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(graphite_addrs, vec!["10.0.0.9:3003"]);
}

#[test]
fn flush_interval_set_only_in_the_config_file_still_takes_effect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelfd.conf");
    std::fs::write(&path, "flush-interval = 30\n").unwrap();

    let args = CliArgs::parse_from(["shelfd", "--config-file", path.to_str().unwrap()]);
    let merged = args.merge_config_file().unwrap();
    let config = ServerConfig::from_cli_args(&merged).unwrap();

    assert_eq!(config.flush_interval, Duration::from_secs(30));
}

#[test]
fn argv_flush_interval_overrides_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelfd.conf");
    std::fs::write(&path, "flush-interval = 30\n").unwrap();

    let args = CliArgs::parse_from([
        "shelfd",
        "--config-file",
        path.to_str().unwrap(),
        "--flush-interval",
        "5",
    ]);
    let merged = args.merge_config_file().unwrap();
    let config = ServerConfig::from_cli_args(&merged).unwrap();

    assert_eq!(config.flush_interval, Duration::from_secs(5));
}
