//! Characteristic model: typed values with optional read and write hooks.
//!
//! A [`Characteristic`] owns its [`CharacteristicSchema`] and last known
//! value.  Live behaviour is attached through the [`Readable`] and
//! [`Writable`] capability traits, which each adapter implements with plain
//! structs holding the references they need.
//!
//! # Example
//!
//! ```rust
//! use remobridge_accessory::characteristic::{Characteristic, STATUS_OK};
//! use remobridge_types::{CharacteristicKind, CharacteristicSchema, Value};
//!
//! # tokio_test_block(async {
//! let on = Characteristic::new(CharacteristicSchema::new(
//!     CharacteristicKind::On,
//!     Value::Bool(false),
//! ));
//! let response = on.read().await;
//! assert_eq!(response.status, STATUS_OK);
//! assert_eq!(response.value, Value::Bool(false));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use remobridge_types::{BridgeError, CharacteristicKind, CharacteristicSchema, Value};
use serde::Serialize;
use tracing::warn;

pub const STATUS_OK: i32 = 0;
pub const STATUS_INSUFFICIENT_PRIVILEGES: i32 = -70401;
/// The backing remote data could not be obtained.
pub const STATUS_UNAVAILABLE: i32 = -70402;
pub const STATUS_READ_ONLY: i32 = -70404;
pub const STATUS_NOT_FOUND: i32 = -70409;
pub const STATUS_INVALID_VALUE: i32 = -70410;

/// Protocol status code reported for a failed write.
pub fn status_for(err: &BridgeError) -> i32 {
    match err {
        BridgeError::ReadOnly(_) => STATUS_READ_ONLY,
        BridgeError::InvalidValue { .. } | BridgeError::Mapping { .. } => STATUS_INVALID_VALUE,
        BridgeError::NotFound(_) | BridgeError::Remote(_) | BridgeError::Serialization(_) => {
            STATUS_UNAVAILABLE
        }
    }
}

/// Produces the current value of a characteristic on demand.
#[async_trait]
pub trait Readable: Send + Sync {
    async fn read(&self) -> Result<Value, BridgeError>;
}

/// Applies a controller-initiated change to the remote side.
#[async_trait]
pub trait Writable: Send + Sync {
    async fn write(&self, value: Value) -> Result<(), BridgeError>;
}

/// Result of a characteristic read as reported to protocol clients.
///
/// A negative `status` means the value could not be refreshed; `value` is
/// then the last known value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadResponse {
    pub value: Value,
    pub status: i32,
}

/// One addressable, typed state value of an accessory.
pub struct Characteristic {
    schema: CharacteristicSchema,
    value: Mutex<Value>,
    reader: Option<Arc<dyn Readable>>,
    writer: Option<Arc<dyn Writable>>,
}

impl Characteristic {
    pub fn new(schema: CharacteristicSchema) -> Self {
        Self {
            value: Mutex::new(schema.initial),
            schema,
            reader: None,
            writer: None,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn Readable>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn Writable>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn kind(&self) -> CharacteristicKind {
        self.schema.kind
    }

    pub fn schema(&self) -> &CharacteristicSchema {
        &self.schema
    }

    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    /// Last known value.
    pub fn value(&self) -> Value {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, value: Value) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Refresh through the reader, if any, and report the value.
    pub async fn read(&self) -> ReadResponse {
        let Some(reader) = &self.reader else {
            return ReadResponse {
                value: self.value(),
                status: STATUS_OK,
            };
        };
        match reader.read().await {
            Ok(value) => {
                self.store(value);
                ReadResponse {
                    value,
                    status: STATUS_OK,
                }
            }
            Err(err) => {
                warn!(characteristic = ?self.kind(), error = %err, "read failed");
                ReadResponse {
                    value: self.value(),
                    status: STATUS_UNAVAILABLE,
                }
            }
        }
    }

    /// Validate `value`, hand it to the writer and remember it on success.
    pub async fn write(&self, value: Value) -> Result<(), BridgeError> {
        let writer = self
            .writer
            .as_ref()
            .ok_or(BridgeError::ReadOnly(self.kind()))?;
        let value = self.normalize(value)?;
        writer.write(value).await?;
        self.store(value);
        Ok(())
    }

    /// Coerce `value` to the schema's value type and check its constraints.
    pub fn normalize(&self, value: Value) -> Result<Value, BridgeError> {
        let invalid = |details: String| BridgeError::InvalidValue {
            characteristic: self.kind(),
            details,
        };

        let value = match self.schema.initial {
            Value::Bool(_) => value.as_bool().map(Value::Bool),
            Value::Int(_) => match value {
                Value::Bool(b) => Some(Value::Int(i64::from(b))),
                other => other.as_i64().map(Value::Int),
            },
            Value::Float(_) => value.as_f64().map(Value::Float),
        }
        .ok_or_else(|| invalid(format!("{value:?} has the wrong type")))?;

        if let Some(valid) = &self.schema.valid_values {
            let code = value.as_i64().unwrap_or_default();
            if !valid.contains(&code) {
                return Err(invalid(format!("{code} is not one of {valid:?}")));
            }
        }
        if let Some(range) = self.schema.range
            && let Some(v) = value.as_f64()
            && (v < range.min || v > range.max)
        {
            return Err(invalid(format!(
                "{v} is outside {}..={}",
                range.min, range.max
            )));
        }
        Ok(value)
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("kind", &self.schema.kind)
            .field("value", &self.value())
            .field("readable", &self.reader.is_some())
            .field("writable", &self.writer.is_some())
            .finish()
    }
}
