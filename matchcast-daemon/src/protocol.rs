//! Newline-delimited JSON protocol and blocking client helpers.
//!
//! Every request line gets exactly one response line. A connection that has
//! sent `join` additionally receives event lines (`{"event": ..., "payload":
//! ...}`) interleaved with its responses.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use matchcast_core::{Document, ServerEvent};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(rename = "matchData", default, skip_serializing_if = "Option::is_none")]
    pub match_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlays: Option<Value>,
    #[serde(rename = "wagonData", default, skip_serializing_if = "Option::is_none")]
    pub wagon_data: Option<Value>,
}

impl DaemonRequest {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            ..Self::default()
        }
    }

    pub fn for_tenant(cmd: &str, tenant: Option<String>) -> Self {
        Self {
            tenant,
            ..Self::new(cmd)
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let (mut reader, _stream) = open_and_send(home, request)?;
    let line = read_line(&mut reader, home)?;
    Ok(serde_json::from_str(line.trim_end())?)
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::new("stop"))?;
    response_into_data(response).map(|_| ())
}

pub fn request_snapshot(home: &Path, tenant: Option<String>) -> Result<Document, DaemonError> {
    let response = send_request(home, &DaemonRequest::for_tenant("snapshot", tenant))?;
    Ok(serde_json::from_value(response_into_data(response)?)?)
}

pub fn request_publish(
    home: &Path,
    tenant: Option<String>,
    match_data: Option<Value>,
    overlays: Option<Value>,
) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        match_data,
        overlays,
        ..DaemonRequest::for_tenant("publish_update", tenant)
    };
    response_into_data(send_request(home, &request)?)
}

pub fn request_sequence(
    home: &Path,
    tenant: Option<String>,
    wagon_data: Value,
) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        wagon_data: Some(wagon_data),
        ..DaemonRequest::for_tenant("publish_sequence", tenant)
    };
    response_into_data(send_request(home, &request)?)
}

/// Join `tenant` and hand every pushed event to `on_event` until it returns
/// `false` or the daemon closes the connection.
///
/// Returns the normalized tenant key the daemon acknowledged.
pub fn watch(
    home: &Path,
    tenant: Option<String>,
    mut on_event: impl FnMut(ServerEvent) -> bool,
) -> Result<String, DaemonError> {
    let (mut reader, _stream) = open_and_send(home, &DaemonRequest::for_tenant("join", tenant))?;
    let ack: DaemonResponse = serde_json::from_str(read_line(&mut reader, home)?.trim_end())?;
    let joined = response_into_data(ack)?
        .get("tenant")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| io_err(socket_path(home), e))?;
        if read == 0 {
            return Ok(joined);
        }
        let event: ServerEvent = serde_json::from_str(line.trim_end())?;
        if !on_event(event) {
            return Ok(joined);
        }
    }
}

fn open_and_send(
    home: &Path,
    request: &DaemonRequest,
) -> Result<(BufReader<UnixStream>, UnixStream), DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let reader = BufReader::new(stream.try_clone().map_err(|e| io_err(&socket, e))?);
    Ok((reader, stream))
}

fn read_line(reader: &mut BufReader<UnixStream>, home: &Path) -> Result<String, DaemonError> {
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(socket_path(home), e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }
    Ok(line)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn request_uses_document_field_names() {
        let request = DaemonRequest {
            match_data: Some(json!({"period": 1})),
            ..DaemonRequest::for_tenant("publish_update", Some("arena".into()))
        };
        let value = serde_json::to_value(&request).expect("encode");
        assert_eq!(
            value,
            json!({"cmd": "publish_update", "tenant": "arena", "matchData": {"period": 1}})
        );
    }

    #[test]
    fn missing_fields_decode_as_none() {
        let request: DaemonRequest = serde_json::from_str(r#"{"cmd":"snapshot"}"#).expect("decode");
        assert_eq!(request.cmd, "snapshot");
        assert!(request.tenant.is_none());
        assert!(request.wagon_data.is_none());
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = response_into_data(DaemonResponse::error("boom")).unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(ref msg) if msg == "boom"));
    }

    #[test]
    fn send_without_daemon_reports_not_running() {
        let home = TempDir::new().expect("home");
        let err = send_request(home.path(), &DaemonRequest::new("status")).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }
}
