//! Scripted bridge server for exercising the client and the loop.
//!
//! Answers the four protocol commands from in-memory state. Knobs let a test
//! drop connections after reading a request, replace the response to a
//! command with an arbitrary raw line, and inspect every request received.

use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

#[derive(Default)]
struct Script {
    state: Value,
    events: VecDeque<Vec<Value>>,
    debug: Option<bool>,
    drop_remaining: usize,
    raw: HashMap<String, String>,
    requests: Vec<Value>,
    connections: usize,
}

/// In-process bridge listening on an ephemeral localhost port.
///
/// Stops accepting on drop.
pub struct FakeBridge {
    addr: SocketAddr,
    script: Arc<Mutex<Script>>,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl FakeBridge {
    /// Bind `127.0.0.1:0` and start serving.
    #[must_use]
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake bridge");
        let addr = listener.local_addr().expect("fake bridge address");
        let script = Arc::new(Mutex::new(Script {
            state: json!({}),
            ..Script::default()
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_script = Arc::clone(&script);
        let accept_shutdown = Arc::clone(&shutdown);
        let acceptor = thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                let drop_after_read = {
                    let mut script = accept_script.lock().unwrap();
                    script.connections += 1;
                    if script.drop_remaining > 0 {
                        script.drop_remaining -= 1;
                        true
                    } else {
                        false
                    }
                };
                let conn_script = Arc::clone(&accept_script);
                thread::spawn(move || serve(stream, &conn_script, drop_after_read));
            }
        });

        Self {
            addr,
            script,
            shutdown,
            acceptor: Some(acceptor),
        }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Object returned by the `state` command.
    pub fn set_state(&self, state: Value) {
        self.lock().state = state;
    }

    /// Queue one batch for a later `events` command. Batches drain in order.
    pub fn push_events(&self, events: Vec<Value>) {
        self.lock().events.push_back(events);
    }

    /// Close the next `n` accepted connections right after reading a request.
    pub fn drop_connections(&self, n: usize) {
        self.lock().drop_remaining = n;
    }

    /// Answer `cmd` with `line` verbatim instead of the scripted response.
    pub fn respond_raw(&self, cmd: &str, line: &str) {
        self.lock().raw.insert(cmd.to_string(), line.to_string());
    }

    pub fn clear_raw(&self) {
        self.lock().raw.clear();
    }

    /// Every request line received, parsed.
    #[must_use]
    pub fn requests(&self) -> Vec<Value> {
        self.lock().requests.clone()
    }

    /// Number of requests with the given `cmd`.
    #[must_use]
    pub fn request_count(&self, cmd: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.get("cmd").and_then(Value::as_str) == Some(cmd))
            .count()
    }

    /// Connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    /// Last value set through the `set debug` command.
    #[must_use]
    pub fn debug(&self) -> Option<bool> {
        self.lock().debug
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }
}

impl Drop for FakeBridge {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the blocking accept.
        let _ = TcpStream::connect(self.addr);
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

fn serve(stream: TcpStream, script: &Mutex<Script>, drop_after_read: bool) {
    let Ok(mut writer) = stream.try_clone() else {
        return;
    };
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else { return };
        let request: Value = serde_json::from_str(&line).unwrap_or(Value::Null);
        let response = {
            let mut script = script.lock().unwrap();
            script.requests.push(request.clone());
            if drop_after_read {
                return;
            }
            respond(&mut script, &request)
        };
        if writer.write_all(response.as_bytes()).is_err()
            || writer.write_all(b"\n").is_err()
            || writer.flush().is_err()
        {
            return;
        }
    }
}

fn respond(script: &mut Script, request: &Value) -> String {
    let cmd = request.get("cmd").and_then(Value::as_str).unwrap_or("");
    if let Some(raw) = script.raw.get(cmd) {
        return raw.clone();
    }
    let response = match cmd {
        "ping" => json!({ "ok": true, "pong": true }),
        "state" => json!({ "ok": true, "state": script.state }),
        "events" => {
            let events = script.events.pop_front().unwrap_or_default();
            json!({ "ok": true, "events": events })
        }
        "set" if request.get("key").and_then(Value::as_str) == Some("debug") => {
            script.debug = request.get("value").and_then(Value::as_bool);
            json!({ "ok": true, "debug": script.debug })
        }
        _ => json!({ "ok": false, "error": "unknown command" }),
    };
    response.to_string()
}
