//! JSON request/response messages of the accessory protocol and their
//! handling.
//!
//! Requests carry an `op` tag and an optional client-chosen `id` that is
//! echoed back, so responses may arrive out of order:
//!
//! ```json
//! {"id": 1, "op": "pair", "pin": "12344321"}
//! {"id": 2, "op": "accessories"}
//! {"id": 3, "op": "read", "aid": 2, "iid": 1}
//! {"id": 4, "op": "write", "aid": 2, "iid": 3, "value": 2}
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use remobridge_accessory::characteristic::{
    STATUS_INSUFFICIENT_PRIVILEGES, STATUS_INVALID_VALUE, STATUS_NOT_FOUND, STATUS_OK,
};
use remobridge_accessory::{AccessoryDescription, AccessoryRegistry, status_for};
use remobridge_types::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Pair { pin: String },
    Accessories,
    Read { aid: u64, iid: u64 },
    Write { aid: u64, iid: u64, value: Value },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Accessories {
        accessories: Vec<AccessoryDescription>,
    },
    Value {
        aid: u64,
        iid: u64,
        value: Value,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub status: i32,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
}

impl Response {
    fn ok(id: Option<u64>) -> Self {
        Self {
            id,
            status: STATUS_OK,
            body: None,
        }
    }

    fn error(id: Option<u64>, status: i32, error: impl Into<String>) -> Self {
        Self {
            id,
            status,
            body: Some(ResponseBody::Error {
                error: error.into(),
            }),
        }
    }
}

/// Per-connection state.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    paired: AtomicBool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            paired: AtomicBool::new(false),
        }
    }

    pub fn is_paired(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a request handler needs; cloned into each request task.
#[derive(Clone)]
pub struct Handler {
    pub registry: Arc<AccessoryRegistry>,
    pub pin: Arc<str>,
}

impl Handler {
    /// Parse and answer one raw text frame.
    pub async fn handle_text(&self, session: &Session, text: &str) -> Response {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => self.handle(session, envelope).await,
            Err(e) => {
                warn!(session = %session.id, error = %e, "malformed request");
                Response::error(None, STATUS_INVALID_VALUE, format!("malformed request: {e}"))
            }
        }
    }

    pub async fn handle(&self, session: &Session, envelope: Envelope) -> Response {
        let id = envelope.id;
        match envelope.request {
            Request::Pair { pin } => {
                if pin == *self.pin {
                    session.paired.store(true, Ordering::SeqCst);
                    info!(session = %session.id, "controller paired");
                    Response::ok(id)
                } else {
                    warn!(session = %session.id, "pairing rejected: wrong pin");
                    Response::error(id, STATUS_INSUFFICIENT_PRIVILEGES, "wrong pin")
                }
            }
            Request::Accessories => Response {
                id,
                status: STATUS_OK,
                body: Some(ResponseBody::Accessories {
                    accessories: self.registry.describe(),
                }),
            },
            Request::Read { .. } | Request::Write { .. } if !session.is_paired() => {
                Response::error(id, STATUS_INSUFFICIENT_PRIVILEGES, "pair first")
            }
            Request::Read { aid, iid } => {
                if !self.registry.contains(aid, iid) {
                    return Response::error(id, STATUS_NOT_FOUND, format!("no characteristic {aid}.{iid}"));
                }
                match self.registry.read(aid, iid).await {
                    Ok(read) => Response {
                        id,
                        status: read.status,
                        body: Some(ResponseBody::Value {
                            aid,
                            iid,
                            value: read.value,
                        }),
                    },
                    Err(e) => Response::error(id, status_for(&e), e.to_string()),
                }
            }
            Request::Write { aid, iid, value } => {
                if !self.registry.contains(aid, iid) {
                    return Response::error(id, STATUS_NOT_FOUND, format!("no characteristic {aid}.{iid}"));
                }
                match self.registry.write(aid, iid, value).await {
                    Ok(()) => {
                        debug!(session = %session.id, aid, iid, "write applied");
                        Response::ok(id)
                    }
                    Err(e) => Response::error(id, status_for(&e), e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remobridge_accessory::{BridgeContext, discover};
    use remobridge_accessory::characteristic::STATUS_READ_ONLY;
    use remobridge_remote::{
        CommandDispatcher, ManualClock, NoDelay, RecordedCommand, RemoteSnapshotCache, StubRemote,
    };
    use remobridge_types::{
        AirConRange, AirConSettings, AirConSpec, CharacteristicKind, DeviceCore, ModeRange,
        OperationMode, RemoteAppliance,
    };

    fn aircon() -> RemoteAppliance {
        RemoteAppliance {
            id: "ac-1".into(),
            nickname: "Living AC".into(),
            appliance_type: "AC".into(),
            image: "ico_ac_1".into(),
            device: DeviceCore::default(),
            model: None,
            settings: Some(AirConSettings {
                temperature: "26".into(),
                operation_mode: OperationMode::Cool,
                button: String::new(),
            }),
            aircon: Some(AirConSpec {
                range: AirConRange {
                    modes: [(
                        OperationMode::Cool,
                        ModeRange {
                            temperature: vec!["24".into(), "25".into(), "26".into()],
                        },
                    )]
                    .into_iter()
                    .collect(),
                },
            }),
            signals: vec![],
        }
    }

    async fn handler() -> (Arc<StubRemote>, Handler) {
        let remote = Arc::new(StubRemote::builder().with_appliance(aircon()).build());
        let ctx = BridgeContext {
            api: remote.clone(),
            cache: Arc::new(
                RemoteSnapshotCache::new(remote.clone()).with_clock(Arc::new(ManualClock::new())),
            ),
            dispatcher: Arc::new(
                CommandDispatcher::new(remote.clone()).with_delay_policy(Arc::new(NoDelay)),
            ),
        };
        let registry = discover("Test Bridge", &ctx).await;
        (
            remote,
            Handler {
                registry: Arc::new(registry),
                pin: Arc::from("12344321"),
            },
        )
    }

    #[test]
    fn requests_parse_with_optional_id() {
        let env: Envelope = serde_json::from_str(r#"{"id":7,"op":"read","aid":2,"iid":1}"#).unwrap();
        assert_eq!(env.id, Some(7));
        assert_eq!(env.request, Request::Read { aid: 2, iid: 1 });

        let env: Envelope = serde_json::from_str(r#"{"op":"accessories"}"#).unwrap();
        assert_eq!(env.id, None);
        assert_eq!(env.request, Request::Accessories);
    }

    #[test]
    fn responses_serialize_flat() {
        let json = serde_json::to_value(Response::ok(Some(1))).unwrap();
        assert_eq!(json, serde_json::json!({"id": 1, "status": 0}));

        let json = serde_json::to_value(Response {
            id: None,
            status: STATUS_OK,
            body: Some(ResponseBody::Value {
                aid: 2,
                iid: 3,
                value: Value::Float(24.5),
            }),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"status": 0, "aid": 2, "iid": 3, "value": 24.5}));
    }

    #[tokio::test]
    async fn read_and_write_require_pairing() {
        let (remote, handler) = handler().await;
        let session = Session::new();

        let resp = handler
            .handle_text(&session, r#"{"op":"write","aid":2,"iid":1,"value":0}"#)
            .await;
        assert_eq!(resp.status, STATUS_INSUFFICIENT_PRIVILEGES);

        let resp = handler.handle_text(&session, r#"{"op":"pair","pin":"00000000"}"#).await;
        assert_eq!(resp.status, STATUS_INSUFFICIENT_PRIVILEGES);
        assert!(!session.is_paired());

        let resp = handler.handle_text(&session, r#"{"op":"pair","pin":"12344321"}"#).await;
        assert_eq!(resp.status, STATUS_OK);
        assert!(session.is_paired());

        let resp = handler
            .handle_text(&session, r#"{"op":"write","aid":2,"iid":1,"value":0}"#)
            .await;
        assert_eq!(resp.status, STATUS_OK);
        assert_eq!(remote.commands().len(), 1);
    }

    #[tokio::test]
    async fn listing_needs_no_pairing() {
        let (_remote, handler) = handler().await;
        let resp = handler
            .handle_text(&Session::new(), r#"{"id":1,"op":"accessories"}"#)
            .await;
        match resp.body {
            Some(ResponseBody::Accessories { accessories }) => assert_eq!(accessories.len(), 2),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_codes_follow_the_failure() {
        let (remote, handler) = handler().await;
        let session = Session::new();
        handler.handle_text(&session, r#"{"op":"pair","pin":"12344321"}"#).await;

        let resp = handler.handle_text(&session, r#"{"op":"read","aid":2,"iid":99}"#).await;
        assert_eq!(resp.status, STATUS_NOT_FOUND);

        let (_, current) = handler
            .registry
            .find(2, CharacteristicKind::CurrentHeaterCoolerState)
            .unwrap();
        let resp = handler
            .handle(
                &session,
                Envelope {
                    id: Some(5),
                    request: Request::Write {
                        aid: 2,
                        iid: current,
                        value: Value::Int(1),
                    },
                },
            )
            .await;
        assert_eq!(resp.id, Some(5));
        assert_eq!(resp.status, STATUS_READ_ONLY);

        let (_, target) = handler
            .registry
            .find(2, CharacteristicKind::TargetHeaterCoolerState)
            .unwrap();
        let resp = handler
            .handle(
                &session,
                Envelope {
                    id: None,
                    request: Request::Write {
                        aid: 2,
                        iid: target,
                        value: Value::Int(1),
                    },
                },
            )
            .await;
        assert_eq!(resp.status, STATUS_INVALID_VALUE);
        assert!(remote.commands().is_empty());

        let resp = handler.handle_text(&session, "not json").await;
        assert_eq!(resp.status, STATUS_INVALID_VALUE);
    }

    #[tokio::test]
    async fn read_reports_fresh_value() {
        let (remote, handler) = handler().await;
        let session = Session::new();
        handler.handle_text(&session, r#"{"op":"pair","pin":"12344321"}"#).await;
        let (aid, iid) = handler
            .registry
            .find(2, CharacteristicKind::CoolingThresholdTemperature)
            .unwrap();

        let resp = handler
            .handle(
                &session,
                Envelope {
                    id: Some(1),
                    request: Request::Read { aid, iid },
                },
            )
            .await;
        assert_eq!(resp.status, STATUS_OK);
        assert_eq!(
            resp.body,
            Some(ResponseBody::Value {
                aid,
                iid,
                value: Value::Float(26.0)
            })
        );

        let resp = handler
            .handle(
                &session,
                Envelope {
                    id: Some(2),
                    request: Request::Write {
                        aid,
                        iid,
                        value: Value::Int(25),
                    },
                },
            )
            .await;
        assert_eq!(resp.status, STATUS_OK);
        assert!(matches!(
            remote.commands().as_slice(),
            [RecordedCommand::Settings { appliance_id, .. }] if appliance_id == "ac-1"
        ));
    }
}
