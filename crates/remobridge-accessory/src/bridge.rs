//! Startup discovery: one pass over the remote account that turns hubs and
//! appliances into registered accessories.
//!
//! An appliance that cannot be mapped is logged and left out; the rest of
//! the bridge still starts.  The same holds for a snapshot that cannot be
//! fetched: that kind of accessory is missing until the next restart.

use std::sync::Arc;

use remobridge_remote::{CommandDispatcher, RemoteApi, RemoteSnapshotCache};
use remobridge_types::{ApplianceKind, BridgeError, RemoteAppliance, SensorKind};
use tracing::{debug, error, info, warn};

use crate::accessory::{AccessoryInfo, HUB_MANUFACTURER};
use crate::air_conditioner::AirConditionerAccessory;
use crate::fan::FanAccessory;
use crate::registry::AccessoryRegistry;
use crate::sensor::SensorAccessory;

/// Collaborators shared by every accessory of one bridge.
#[derive(Clone)]
pub struct BridgeContext {
    pub api: Arc<dyn RemoteApi>,
    pub cache: Arc<RemoteSnapshotCache>,
    pub dispatcher: Arc<CommandDispatcher>,
}

/// Discover accessories and build the registry for a bridge named `name`.
///
/// Never fails: a fetch error is logged and treated as an empty list.
pub async fn discover(name: &str, ctx: &BridgeContext) -> AccessoryRegistry {
    let mut registry = AccessoryRegistry::new(AccessoryInfo {
        name: name.to_string(),
        manufacturer: HUB_MANUFACTURER.to_string(),
        ..AccessoryInfo::default()
    });
    let mut bridge_hub = None;

    let devices = match ctx.cache.devices().await {
        Ok(entry) => entry.payload.clone(),
        Err(err) => {
            error!(error = %err, "device list unavailable, continuing without sensor hubs");
            Vec::new()
        }
    };
    for device in &devices {
        if device.newest_events.is_empty() {
            debug!(device = %device.name, "hub reports no sensors");
            continue;
        }
        if bridge_hub.is_none() && device.reading(SensorKind::Temperature).is_some() {
            bridge_hub = Some(device.core());
        }
        match SensorAccessory::new(device, Arc::clone(&ctx.cache)) {
            Ok(sensor) => {
                info!(device = %device.name, "sensor hub found");
                registry.register(Box::new(sensor));
            }
            Err(err) => error!(device = %device.name, error = %err, "skipping sensor hub"),
        }
    }

    let appliances = match ctx.cache.appliances().await {
        Ok(entry) => entry.payload.clone(),
        Err(err) => {
            error!(error = %err, "appliance list unavailable, continuing without appliances");
            Vec::new()
        }
    };
    for appliance in &appliances {
        match appliance.kind() {
            ApplianceKind::AirConditioner => {
                match AirConditionerAccessory::new(
                    appliance,
                    &devices,
                    Arc::clone(&ctx.cache),
                    Arc::clone(&ctx.dispatcher),
                ) {
                    Ok(aircon) => {
                        info!(appliance = %appliance.nickname, id = %appliance.id, "air conditioner found");
                        registry.register(Box::new(aircon));
                        if bridge_hub.is_none() {
                            bridge_hub = Some(appliance.device.clone());
                        }
                    }
                    Err(err) => error!(
                        appliance = %appliance.nickname,
                        error = %err,
                        "skipping air conditioner"
                    ),
                }
            }
            ApplianceKind::InfraredFan => match build_fan(appliance, ctx).await {
                Ok(fan) => {
                    info!(appliance = %appliance.nickname, id = %appliance.id, "fan found");
                    registry.register(Box::new(fan));
                }
                Err(err) => error!(appliance = %appliance.nickname, error = %err, "skipping fan"),
            },
            ApplianceKind::Other => {
                debug!(appliance = %appliance.nickname, kind = %appliance.appliance_type, "unsupported appliance");
            }
        }
    }

    match bridge_hub {
        Some(hub) => registry.set_bridge_info(AccessoryInfo::for_hub(name, &hub)),
        None => warn!("no hub with a thermometer or air conditioner, bridge info left generic"),
    }
    info!(accessories = registry.len(), "discovery finished");
    registry
}

async fn build_fan(appliance: &RemoteAppliance, ctx: &BridgeContext) -> Result<FanAccessory, BridgeError> {
    let signals = if appliance.signals.is_empty() {
        debug!(appliance = %appliance.nickname, "fetching signals");
        ctx.api.list_signals(&appliance.id).await?
    } else {
        appliance.signals.clone()
    };
    FanAccessory::new(appliance, &signals, Arc::clone(&ctx.dispatcher))
}
