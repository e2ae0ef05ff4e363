//! Reload preserves shelf state across the collector/destination swap and
//! never mixes the old and new destination sets within one flush.

use std::fs::File;
use std::io::Read;
use std::net::UdpSocket;
use std::time::Duration;

use shelfd::config::{CollectorSpec, DestinationSpec, ServerConfig};
use shelfd::server::Server;

fn config_with(port: u16, dest_path: std::path::PathBuf) -> ServerConfig {
    ServerConfig {
        flush_interval: Duration::from_millis(150),
        destinations: vec![DestinationSpec::File(dest_path)],
        udp_collectors: vec![CollectorSpec {
            host: "127.0.0.1".to_string(),
            port,
        }],
        tcp_collectors: vec![],
        collector_threads: 1,
        collector_threads_limit: 2,
        user: None,
        group: None,
        queue_capacity: None,
        internal_stats: false,
    }
}

fn read_file(path: &std::path::Path) -> String {
    let mut contents = String::new();
    if let Ok(mut file) = File::open(path) {
        file.read_to_string(&mut contents).unwrap();
    }
    contents
}

#[test]
fn metrics_folded_before_reload_appear_in_the_first_post_reload_flush() {
    let dir = tempfile::tempdir().unwrap();
    let old_path = dir.path().join("old.txt");
    let new_path = dir.path().join("new.txt");

    let server = Server::new(config_with(19401, old_path.clone()));
    server.start().unwrap();
    assert!(server.wait_until_running(Duration::from_secs(2)));

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(b"preserved:1|c", "127.0.0.1:19401").unwrap();

    // Reload fast enough that the pre-reload metric almost certainly has
    // not been flushed yet (flush_interval is 150ms).
    std::thread::sleep(Duration::from_millis(20));
    server
        .reload(config_with(19401, new_path.clone()), Duration::from_secs(2))
        .unwrap();

    std::thread::sleep(Duration::from_millis(300));
    server.stop(Duration::from_secs(2));

    let old_contents = read_file(&old_path);
    let new_contents = read_file(&new_path);
    assert!(
        new_contents.contains("preserved 1 "),
        "expected the new destination to receive the pre-reload metric, got: {new_contents}"
    );
    assert!(
        !old_contents.contains("preserved 1 "),
        "the old destination should not have been flushed again after reload, got: {old_contents}"
    );
}

#[test]
fn collectors_accept_new_metrics_again_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");

    let server = Server::new(config_with(19402, path.clone()));
    server.start().unwrap();
    assert!(server.wait_until_running(Duration::from_secs(2)));

    server
        .reload(config_with(19402, path.clone()), Duration::from_secs(2))
        .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(b"post.reload:1|c", "127.0.0.1:19402").unwrap();

    std::thread::sleep(Duration::from_millis(300));
    server.stop(Duration::from_secs(2));

    let contents = read_file(&path);
    assert!(contents.contains("post.reload 1 "), "got: {contents}");
}
