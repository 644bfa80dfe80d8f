//! ClipVault relay - thin client for the clipvault daemon
//!
//! Forwards newline-delimited JSON requests from the command line (one request
//! per argument) or from stdin (one request per line) to the daemon socket and
//! prints each response on its own line. `--watch` subscribes and prints
//! history pushes until the daemon goes away.

use serde_json::{json, Value};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

const DEFAULT_SOCKET_PATH: &str = "/tmp/clipvault.sock";
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

fn socket_path() -> String {
    std::env::var("CLIPVAULT_SOCKET").unwrap_or_else(|_| DEFAULT_SOCKET_PATH.to_string())
}

/// One daemon connection, reused for every request
struct Connection {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl Connection {
    fn open(path: &str, timeout: Option<Duration>) -> io::Result<Self> {
        let stream = UnixStream::connect(path)?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(Some(SOCKET_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            writer: stream,
            reader,
        })
    }

    fn send(&mut self, request: &str) -> io::Result<()> {
        // Send message with newline delimiter
        self.writer.write_all(request.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    /// Next response line, or None once the daemon closes the connection
    fn receive(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end().to_string()))
    }

    fn request(&mut self, request: &str) -> io::Result<String> {
        self.send(request)?;
        self.receive()?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "daemon closed the connection")
        })
    }
}

/// Create an error response JSON in the daemon's format
fn error_response(message: &str) -> String {
    json!({ "type": "error", "message": message }).to_string()
}

/// Re-encode a request on one line, rejecting anything that is not a JSON object
fn normalize_request(raw: &str) -> Result<String, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value.to_string()),
        Ok(_) => Err("Request must be a JSON object".to_string()),
        Err(e) => Err(format!("Invalid JSON: {}", e)),
    }
}

fn relay(requests: impl Iterator<Item = String>) -> io::Result<()> {
    let path = socket_path();
    let mut connection: Option<Connection> = None;
    let mut stdout = io::stdout().lock();

    for raw in requests {
        if raw.trim().is_empty() {
            continue;
        }

        let response = match normalize_request(&raw) {
            Err(message) => error_response(&message),
            Ok(request) => {
                if connection.is_none() {
                    match Connection::open(&path, Some(SOCKET_TIMEOUT)) {
                        Ok(opened) => connection = Some(opened),
                        Err(e) => {
                            eprintln!("Cannot reach daemon at {}: {}", path, e);
                        }
                    }
                }
                let result = match connection.as_mut() {
                    Some(open) => open.request(&request),
                    None => Err(io::Error::new(io::ErrorKind::NotConnected, "no connection")),
                };
                match result {
                    Ok(response) => response,
                    Err(e) => {
                        eprintln!("Service error: {}", e);
                        connection = None;
                        error_response(&format!("Service unavailable: {}", e))
                    }
                }
            }
        };

        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
    }

    Ok(())
}

fn watch() -> io::Result<()> {
    let path = socket_path();
    let mut connection = Connection::open(&path, None)?;
    connection.send(&json!({ "op": "subscribe" }).to_string())?;

    let mut stdout = io::stdout().lock();
    while let Some(line) = connection.receive()? {
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
    }
    eprintln!("Daemon closed the connection");
    Ok(())
}

fn print_help() {
    println!(
        r#"clipvault-relay - send requests to the clipvault daemon

USAGE:
    clipvault-relay [REQUEST...]
    clipvault-relay --watch

Each REQUEST is a JSON object such as '{{"op":"get_history","query":"foo"}}'.
Without arguments, requests are read from stdin, one per line.

OPTIONS:
    -h, --help      Show this help message
    -w, --watch     Subscribe and print history updates as they happen

ENVIRONMENT:
    CLIPVAULT_SOCKET    Daemon socket path (default: {})
"#,
        DEFAULT_SOCKET_PATH
    );
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let result = match args.first().map(String::as_str) {
        Some("--help") | Some("-h") => {
            print_help();
            return;
        }
        Some("--watch") | Some("-w") => watch(),
        Some(_) => relay(args.into_iter()),
        None => relay(io::stdin().lock().lines().map_while(Result::ok)),
    };

    if let Err(e) = result {
        eprintln!("Relay error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_escapes_quotes() {
        let response = error_response(r#"bad "thing""#);
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], r#"bad "thing""#);
    }

    #[test]
    fn test_normalize_request_compacts_objects() {
        let request = normalize_request("{ \"op\" : \"get_history\" ,\n \"query\": \"x\" }").unwrap();
        assert!(!request.contains('\n'));
        let value: Value = serde_json::from_str(&request).unwrap();
        assert_eq!(value["op"], "get_history");
    }

    #[test]
    fn test_normalize_request_rejects_non_objects() {
        assert!(normalize_request("[1, 2]").is_err());
        assert!(normalize_request("not json").unwrap_err().starts_with("Invalid JSON"));
    }
}
