// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! ksi-wire: the length-prefixed JSON frame protocol spoken over the
//! daemon's Unix-domain socket.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod frame;
mod request;
mod response;

pub use codec::{read_request, write_response};
pub use frame::{decode, encode, read_message, write_message, ProtocolError, MAX_FRAME_BYTES};
pub use request::Request;
pub use response::Response;
