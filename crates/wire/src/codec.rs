// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Typed read/write helpers layered on top of the raw frame codec.

use crate::frame::{decode, encode, read_message, write_message, ProtocolError};
use crate::request::Request;
use crate::response::Response;
use tokio::io::{AsyncRead, AsyncWrite};

pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Request, ProtocolError> {
    let bytes = read_message(reader).await?;
    decode(&bytes)
}

pub async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<(), ProtocolError> {
    let bytes = encode(response)?;
    write_message(writer, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksi_core::{Context, Originator};

    #[tokio::test]
    async fn round_trips_request_then_response_over_one_pipe() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let req = Request::new("agent:log", serde_json::json!({"text": "hi"}));
        let bytes = encode(&req).unwrap();
        write_message(&mut a, &bytes).await.unwrap();
        let received = read_request(&mut b).await.unwrap();
        assert_eq!(received.event, "agent:log");

        let resp = Response::new("agent:log", serde_json::json!({"ok": true}), Context::root(Originator::system()));
        write_response(&mut b, &resp).await.unwrap();
        let raw = read_message(&mut a).await.unwrap();
        let decoded: Response = decode(&raw).unwrap();
        assert_eq!(decoded.event, "agent:log");
    }
}
