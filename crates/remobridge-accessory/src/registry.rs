//! [`AccessoryRegistry`] – addressable accessory table and request router.
//!
//! The registry owns every constructed [`Accessory`] and assigns protocol
//! addresses: accessory ids (`aid`) start at 2 because 1 is the bridge
//! itself, and instance ids (`iid`) number the characteristics of one
//! accessory from 1 across all of its services.
//!
//! Reads and writes take `&self`; the registry is built once at startup and
//! shared behind an `Arc` by every protocol connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use remobridge_types::{BridgeError, CharacteristicKind, CharacteristicSchema, Value};
use serde::Serialize;
use tracing::{debug, info};

use crate::accessory::{Accessory, AccessoryCategory, AccessoryInfo, ServiceKind};
use crate::characteristic::{Characteristic, ReadResponse};

/// Accessory id of the bridge.
pub const BRIDGE_AID: u64 = 1;

struct RegisteredAccessory {
    accessory: Box<dyn Accessory>,
    /// `(service, [(iid, characteristic)])` in exposure order.
    layout: Vec<(ServiceKind, Vec<(u64, Arc<Characteristic>)>)>,
}

impl RegisteredAccessory {
    fn new(accessory: Box<dyn Accessory>) -> Self {
        let mut next_iid = 1;
        let layout = accessory
            .services()
            .iter()
            .map(|service| {
                let chars = service
                    .characteristics()
                    .iter()
                    .map(|c| {
                        let iid = next_iid;
                        next_iid += 1;
                        (iid, Arc::clone(c))
                    })
                    .collect();
                (service.kind(), chars)
            })
            .collect();
        Self { accessory, layout }
    }

    fn characteristic(&self, iid: u64) -> Option<&Arc<Characteristic>> {
        self.layout
            .iter()
            .flat_map(|(_, chars)| chars.iter())
            .find(|(id, _)| *id == iid)
            .map(|(_, c)| c)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicDescription {
    pub iid: u64,
    #[serde(flatten)]
    pub schema: CharacteristicSchema,
    pub value: Value,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDescription {
    pub kind: ServiceKind,
    pub characteristics: Vec<CharacteristicDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessoryDescription {
    pub aid: u64,
    pub category: AccessoryCategory,
    pub info: AccessoryInfo,
    pub services: Vec<ServiceDescription>,
}

/// Central accessory table.
pub struct AccessoryRegistry {
    bridge: AccessoryInfo,
    accessories: BTreeMap<u64, RegisteredAccessory>,
    next_aid: u64,
}

impl AccessoryRegistry {
    pub fn new(bridge: AccessoryInfo) -> Self {
        Self {
            bridge,
            accessories: BTreeMap::new(),
            next_aid: BRIDGE_AID + 1,
        }
    }

    /// Register an accessory and return its assigned `aid`.
    pub fn register(&mut self, accessory: Box<dyn Accessory>) -> u64 {
        let aid = self.next_aid;
        self.next_aid += 1;
        info!(aid, name = %accessory.info().name, category = ?accessory.category(), "accessory registered");
        self.accessories.insert(aid, RegisteredAccessory::new(accessory));
        aid
    }

    pub fn bridge_info(&self) -> &AccessoryInfo {
        &self.bridge
    }

    pub fn set_bridge_info(&mut self, bridge: AccessoryInfo) {
        self.bridge = bridge;
    }

    /// Number of registered accessories, not counting the bridge.
    pub fn len(&self) -> usize {
        self.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.is_empty()
    }

    pub fn accessory(&self, aid: u64) -> Option<&dyn Accessory> {
        self.accessories.get(&aid).map(|entry| entry.accessory.as_ref())
    }

    pub fn contains(&self, aid: u64, iid: u64) -> bool {
        self.accessories
            .get(&aid)
            .is_some_and(|entry| entry.characteristic(iid).is_some())
    }

    /// `(aid, iid)` of the first characteristic of `kind` on accessory `aid`.
    pub fn find(&self, aid: u64, kind: CharacteristicKind) -> Option<(u64, u64)> {
        let entry = self.accessories.get(&aid)?;
        entry
            .layout
            .iter()
            .flat_map(|(_, chars)| chars.iter())
            .find(|(_, c)| c.kind() == kind)
            .map(|(iid, _)| (aid, *iid))
    }

    fn resolve(&self, aid: u64, iid: u64) -> Result<Arc<Characteristic>, BridgeError> {
        self.accessories
            .get(&aid)
            .and_then(|entry| entry.characteristic(iid))
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("characteristic {aid}.{iid}")))
    }

    /// Read characteristic `iid` of accessory `aid`.
    pub async fn read(&self, aid: u64, iid: u64) -> Result<ReadResponse, BridgeError> {
        let characteristic = self.resolve(aid, iid)?;
        let response = characteristic.read().await;
        debug!(aid, iid, status = response.status, "characteristic read");
        Ok(response)
    }

    /// Write `value` to characteristic `iid` of accessory `aid`.
    pub async fn write(&self, aid: u64, iid: u64, value: Value) -> Result<(), BridgeError> {
        let characteristic = self.resolve(aid, iid)?;
        info!(aid, iid, kind = ?characteristic.kind(), ?value, "characteristic write");
        characteristic.write(value).await
    }

    /// Full listing, bridge first.
    pub fn describe(&self) -> Vec<AccessoryDescription> {
        let bridge = AccessoryDescription {
            aid: BRIDGE_AID,
            category: AccessoryCategory::Bridge,
            info: self.bridge.clone(),
            services: Vec::new(),
        };
        std::iter::once(bridge)
            .chain(self.accessories.iter().map(|(aid, entry)| AccessoryDescription {
                aid: *aid,
                category: entry.accessory.category(),
                info: entry.accessory.info().clone(),
                services: entry
                    .layout
                    .iter()
                    .map(|(kind, chars)| ServiceDescription {
                        kind: *kind,
                        characteristics: chars
                            .iter()
                            .map(|(iid, c)| CharacteristicDescription {
                                iid: *iid,
                                schema: c.schema().clone(),
                                value: c.value(),
                                writable: c.is_writable(),
                            })
                            .collect(),
                    })
                    .collect(),
            }))
            .collect()
    }
}
