//! `remobridge-remote` – the cloud side of the bridge.
//!
//! Everything that talks to the remote smart-remote API lives here, behind
//! the [`RemoteApi`] trait so the accessory layer never depends on the
//! transport.
//!
//! # Modules
//!
//! - [`api`] – the [`RemoteApi`] collaborator trait and [`RemoteError`].
//! - [`http`] – [`NatureClient`], a thin typed HTTP client for the cloud API.
//! - [`cache`] – [`RemoteSnapshotCache`]: rate-limited, fallback-safe device
//!   and appliance snapshots shared by every accessory.
//! - [`dispatcher`] – [`CommandDispatcher`]: sends commands after a jittered
//!   delay so that scenes touching many accessories do not burst the API.
//! - [`stub`] – [`StubRemote`] and [`ManualClock`], in-process doubles for
//!   tests and CI.

pub mod api;
pub mod cache;
pub mod dispatcher;
pub mod http;
pub mod stub;

pub use api::{RemoteApi, RemoteError};
pub use cache::{CacheEntry, Clock, RemoteSnapshotCache, SystemClock};
pub use dispatcher::{CommandDispatcher, DelayPolicy, NoDelay, UniformJitter};
pub use http::NatureClient;
pub use stub::{ManualClock, RecordedCommand, StubRemote};
