use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use brew_debug::DebugServer;
use brew_host::{EngineRegistry, TraceEngine};
use serde_json::{json, Value};

fn send(stream: &mut TcpStream, seq: u32, command: &str, arguments: Value) {
    let body = json!({
        "seq": seq,
        "type": "request",
        "command": command,
        "arguments": arguments,
    })
    .to_string();
    write!(stream, "Content-Length: {}\r\n\r\n{body}", body.len()).unwrap();
    stream.flush().unwrap();
}

fn receive(reader: &mut BufReader<TcpStream>) -> Value {
    let mut length = None;
    loop {
        let mut line = String::new();
        assert!(reader.read_line(&mut line).unwrap() > 0, "connection closed");
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            length = Some(value.trim().parse::<usize>().unwrap());
        }
    }
    let mut body = vec![0; length.unwrap()];
    reader.read_exact(&mut body).unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Read messages until one satisfies `matches`, returning everything seen.
fn receive_until(
    reader: &mut BufReader<TcpStream>,
    matches: impl Fn(&Value) -> bool,
) -> Vec<Value> {
    let mut seen = Vec::new();
    loop {
        let message = receive(reader);
        let done = matches(&message);
        seen.push(message);
        if done {
            return seen;
        }
    }
}

fn is_event(message: &Value, name: &str) -> bool {
    message["type"] == json!("event") && message["event"] == json!(name)
}

#[test]
fn tcp_session_launches_stops_and_disconnects() {
    let dir = tempfile::tempdir().unwrap();
    let program = dir.path().join("main.trace");
    fs::write(&program, "fn main\n  print hello\n  nop\nend\n").unwrap();

    let mut registry = EngineRegistry::new();
    registry.register("trace", Arc::new(TraceEngine::new()));
    let server = DebugServer::bind("127.0.0.1:0", Arc::new(registry)).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || server.serve());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    send(&mut stream, 1, "initialize", json!({"adapterID": "brew"}));
    let seen = receive_until(&mut reader, |message| is_event(message, "initialized"));
    let response = &seen[0];
    assert_eq!(response["type"], json!("response"));
    assert_eq!(response["request_seq"], json!(1));
    assert_eq!(response["body"]["supportsInstructionBreakpoints"], json!(true));

    send(
        &mut stream,
        2,
        "setBreakpoints",
        json!({"source": {"path": program.display().to_string()}, "lines": [3]}),
    );
    let response = receive(&mut reader);
    assert_eq!(response["command"], json!("setBreakpoints"));
    assert_eq!(response["body"]["breakpoints"][0]["verified"], json!(false));

    send(
        &mut stream,
        3,
        "launch",
        json!({"program": program.display().to_string()}),
    );
    let seen = receive_until(&mut reader, |message| is_event(message, "stopped"));
    let launch = seen
        .iter()
        .position(|message| message["command"] == json!("launch"))
        .unwrap();
    let stopped = seen.len() - 1;
    assert!(launch < stopped, "stopped event arrived before the launch response");
    assert_eq!(seen[stopped]["body"]["reason"], json!("breakpoint"));
    assert_eq!(seen[stopped]["body"]["threadId"], json!(1));
    assert!(seen
        .iter()
        .any(|message| is_event(message, "output")
            && message["body"]["output"] == json!("hello\n")));

    send(&mut stream, 4, "stackTrace", json!({"threadId": 1}));
    let response = receive(&mut reader);
    assert_eq!(response["body"]["stackFrames"][0]["line"], json!(3));

    send(&mut stream, 5, "disconnect", json!({"terminateDebuggee": true}));
    let seen = receive_until(&mut reader, |message| is_event(message, "terminated"));
    assert!(seen
        .iter()
        .any(|message| message["command"] == json!("disconnect")
            && message["success"] == json!(true)));
}
