// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;

use graphpack_core::BlockSink;
use graphpack_webhdfs::{WebHdfsConfig, WebHdfsSink};

#[derive(Debug)]
struct Seen {
    method: String,
    target: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Seen {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let target = parts.next().unwrap_or_default().to_owned();

    let mut length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).unwrap();
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                length = value.trim().parse().unwrap();
            }
        }
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).unwrap();
    Seen {
        method,
        target,
        body,
    }
}

/// Serves `requests` requests: name-node calls get a 307 to a fake data node
/// path on the same listener, data-node calls succeed.
fn spawn_namenode(requests: usize) -> (String, mpsc::Receiver<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for _ in 0..requests {
            let (mut stream, _) = listener.accept().unwrap();
            let seen = read_request(&mut stream);
            let response = if seen.target.starts_with("/webhdfs/v1/") {
                let location = format!("http://{addr}/datanode{}", seen.target);
                format!(
                    "HTTP/1.1 307 Temporary Redirect\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                )
            } else {
                "HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_owned()
            };
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            tx.send(seen).unwrap();
        }
    });
    (format!("http://{addr}"), rx)
}

#[test]
fn create_then_buffered_append_on_finish() {
    let (endpoint, seen) = spawn_namenode(4);
    let config = WebHdfsConfig::new(endpoint).with_user("graph");

    let mut sink = WebHdfsSink::create(config, "/out/part-0.dat").unwrap();
    sink.append(b"abc").unwrap();
    sink.flush().unwrap();
    sink.append(b"def").unwrap();
    sink.flush().unwrap();
    assert_eq!(sink.committed_bytes(), 0);
    sink.finish().unwrap();
    assert_eq!(sink.committed_bytes(), 6);

    let requests: Vec<Seen> = seen.iter().take(4).collect();
    assert_eq!(requests[0].method, "PUT");
    assert_eq!(
        requests[0].target,
        "/webhdfs/v1/out/part-0.dat?op=CREATE&overwrite=true&user.name=graph"
    );
    assert_eq!(requests[1].method, "PUT");
    assert!(requests[1].target.starts_with("/datanode/webhdfs/v1/out/part-0.dat"));
    assert!(requests[1].body.is_empty());
    assert_eq!(requests[2].method, "POST");
    assert_eq!(
        requests[2].target,
        "/webhdfs/v1/out/part-0.dat?op=APPEND&user.name=graph"
    );
    assert_eq!(requests[3].body, b"abcdef");
}

#[test]
fn flush_commits_once_threshold_is_reached() {
    let (endpoint, seen) = spawn_namenode(4);
    let config = WebHdfsConfig::new(endpoint).with_commit_threshold(4);

    let mut sink = WebHdfsSink::create(config, "/p1.dat").unwrap();
    sink.append(b"12345").unwrap();
    sink.flush().unwrap();
    assert_eq!(sink.committed_bytes(), 5);
    sink.finish().unwrap();
    assert_eq!(sink.committed_bytes(), 5);

    let requests: Vec<Seen> = seen.iter().take(4).collect();
    assert_eq!(requests[3].body, b"12345");
}

#[test]
fn unreachable_namenode_is_a_sink_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    assert!(WebHdfsSink::create(WebHdfsConfig::new(endpoint), "/x.dat").is_err());
}
