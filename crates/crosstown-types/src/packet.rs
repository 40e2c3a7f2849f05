use serde::{Deserialize, Serialize};

/// What the connector hands to the BLS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRequest {
    pub amount: u64,
    pub destination: String,
    /// Base64 of a compact-encoded event, possibly wrapped in the
    /// protocol-data envelope.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_account: Option<String>,
}

/// Stable reject-code taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectCode {
    /// Invalid data, encoding, signature, event, or stale claim.
    F00,
    /// Insufficient amount.
    F06,
    /// Internal/store error.
    T00,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<i64>,
}

/// `{accept:true, fulfillment, ...}` or `{accept:false, code, message, ...}`.
///
/// Hand-rolled (de)serialization rather than a derived tagged enum: the
/// discriminant on the wire is the JSON boolean `accept`, not a string tag,
/// which `serde`'s built-in enum representations don't model directly.
#[derive(Debug, Clone)]
pub enum PacketResponse {
    Accept {
        /// 32-byte fulfillment, hex-encoded.
        fulfillment: String,
        metadata: PacketMetadata,
    },
    Reject {
        code: RejectCode,
        message: String,
        required: Option<u64>,
        received: Option<u64>,
    },
}

impl Serialize for PacketResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            PacketResponse::Accept { fulfillment, metadata } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("accept", &true)?;
                map.serialize_entry("fulfillment", fulfillment)?;
                if let Some(id) = &metadata.event_id {
                    map.serialize_entry("eventId", id)?;
                }
                if let Some(at) = &metadata.stored_at {
                    map.serialize_entry("storedAt", at)?;
                }
                map.end()
            }
            PacketResponse::Reject { code, message, required, received } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("accept", &false)?;
                map.serialize_entry("code", code)?;
                map.serialize_entry("message", message)?;
                if let Some(r) = required {
                    map.serialize_entry("required", r)?;
                }
                if let Some(r) = received {
                    map.serialize_entry("received", r)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for PacketResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let value = serde_json::Value::deserialize(deserializer)?;
        let accept = value
            .get("accept")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| D::Error::missing_field("accept"))?;
        if accept {
            let fulfillment = value
                .get("fulfillment")
                .and_then(|v| v.as_str())
                .ok_or_else(|| D::Error::missing_field("fulfillment"))?
                .to_string();
            let metadata = PacketMetadata {
                event_id: value.get("eventId").and_then(|v| v.as_str()).map(String::from),
                stored_at: value.get("storedAt").and_then(|v| v.as_i64()),
            };
            Ok(PacketResponse::Accept { fulfillment, metadata })
        } else {
            let code: RejectCode = serde_json::from_value(
                value.get("code").cloned().ok_or_else(|| D::Error::missing_field("code"))?,
            )
            .map_err(D::Error::custom)?;
            let message = value
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Ok(PacketResponse::Reject {
                code,
                message,
                required: value.get("required").and_then(|v| v.as_u64()),
                received: value.get("received").and_then(|v| v.as_u64()),
            })
        }
    }
}

impl PacketResponse {
    pub fn reject(code: RejectCode, message: impl Into<String>) -> Self {
        PacketResponse::Reject {
            code,
            message: message.into(),
            required: None,
            received: None,
        }
    }

    pub fn insufficient_amount(required: u64, received: u64) -> Self {
        PacketResponse::Reject {
            code: RejectCode::F06,
            message: "insufficient amount".to_string(),
            required: Some(required),
            received: Some(received),
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, PacketResponse::Accept { .. })
    }
}
