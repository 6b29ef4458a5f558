//! `remobridge-server` – network front end of the bridge.
//!
//! Controllers connect over WebSocket, pair with the configured PIN and
//! then list, read and write accessory characteristics addressed by
//! `(aid, iid)`.  A plain HTTP `GET` returns the same listing as JSON.
//!
//! - [`protocol`] – request/response messages and their handling.
//! - [`server`] – [`AccessoryServer`], the TCP accept loop.

pub mod protocol;
pub mod server;

pub use protocol::{Envelope, Handler, Request, Response, ResponseBody, Session};
pub use server::{AccessoryServer, DEFAULT_PORT, ServerError};
