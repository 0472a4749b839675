// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Thin client over the daemon's Unix-domain socket: one connection, one
//! request, one response. Admin commands are request/response only — they
//! never open a `monitor:subscribe_stream` tail.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ksi_wire::{decode, encode, read_message, write_message, ProtocolError, Request, Response};
use tokio::net::UnixStream;

use crate::exit_error::ExitError;

pub struct DaemonClient {
    stream: UnixStream,
    socket_path: PathBuf,
}

impl DaemonClient {
    pub async fn connect(socket_path: &Path) -> Result<Self, ExitError> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused => ExitError::socket(format!("daemon not running at {}", socket_path.display())),
            _ => ExitError::socket(format!("failed to connect to {}: {e}", socket_path.display())),
        })?;
        Ok(Self { stream, socket_path: socket_path.to_path_buf() })
    }

    pub async fn send(&mut self, request: Request) -> Result<Response, ExitError> {
        let bytes = encode(&request).map_err(|e| ExitError::generic(format!("failed to encode request: {e}")))?;
        write_message(&mut self.stream, &bytes).await.map_err(|e| self.io_error(e))?;

        let timeout = ksid::env::ipc_timeout();
        let raw = tokio::time::timeout(timeout, read_message(&mut self.stream))
            .await
            .map_err(|_| ExitError::generic(format!("daemon did not respond to {} within {timeout:?}", request.event)))?
            .map_err(|e| self.io_error(e))?;

        decode(&raw).map_err(|e| ExitError::generic(format!("malformed response from daemon: {e}")))
    }

    fn io_error(&self, e: ProtocolError) -> ExitError {
        ExitError::socket(format!("lost connection to {}: {e}", self.socket_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksi_core::{Context, Originator};
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn round_trips_a_request_against_a_mock_server() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("ksid.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = ksi_wire::read_request(&mut stream).await.unwrap();
            assert_eq!(request.event, "system:status");
            let response = Response::new("system:status:ok", serde_json::json!({"patterns": []}), Context::root(Originator::system()));
            ksi_wire::write_response(&mut stream, &response).await.unwrap();
        });

        let mut client = DaemonClient::connect(&socket_path).await.unwrap();
        let response = client.send(Request::new("system:status", serde_json::json!({}))).await.unwrap();
        assert_eq!(response.event, "system:status:ok");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn reports_socket_error_when_daemon_is_not_listening() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("nothing-here.sock");
        let err = DaemonClient::connect(&socket_path).await.unwrap_err();
        assert_eq!(err.code, crate::exit_error::EXIT_SOCKET);
    }
}
