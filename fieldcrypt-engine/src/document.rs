//! Document and binary value types shared across the boundary.
//!
//! Binary values use the canonical extended JSON form:
//! `{"$binary": {"base64": "...", "subType": "06"}}`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A decoded document.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// A decoded value.
pub type Value = serde_json::Value;

/// Binary subtype for RFC 4122 UUIDs (data key ids).
pub const BINARY_SUBTYPE_UUID: u8 = 0x04;

/// Binary subtype for field-level encrypted payloads.
pub const BINARY_SUBTYPE_ENCRYPTED: u8 = 0x06;

/// A BSON binary value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExtendedBinary", into = "ExtendedBinary")]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn new(subtype: u8, bytes: Vec<u8>) -> Self {
        Self { subtype, bytes }
    }

    /// Wraps ciphertext produced by the engine.
    pub fn encrypted(bytes: Vec<u8>) -> Self {
        Self::new(BINARY_SUBTYPE_ENCRYPTED, bytes)
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self::new(BINARY_SUBTYPE_UUID, id.as_bytes().to_vec())
    }

    /// Returns the UUID if this is a 16-byte subtype 4 binary.
    pub fn to_uuid(&self) -> Option<Uuid> {
        if self.subtype != BINARY_SUBTYPE_UUID {
            return None;
        }
        Uuid::from_slice(&self.bytes).ok()
    }

    pub fn is_encrypted(&self) -> bool {
        self.subtype == BINARY_SUBTYPE_ENCRYPTED
    }

    /// Renders the value as canonical extended JSON.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "$binary": {
                "base64": STANDARD.encode(&self.bytes),
                "subType": format!("{:02x}", self.subtype),
            }
        })
    }

    /// Parses a canonical extended JSON binary. Returns `None` for any
    /// other value shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }
}

impl From<Binary> for Value {
    fn from(binary: Binary) -> Self {
        binary.to_value()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtendedBinary {
    #[serde(rename = "$binary")]
    binary: ExtendedBinaryBody,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtendedBinaryBody {
    base64: String,
    #[serde(rename = "subType")]
    sub_type: String,
}

impl TryFrom<ExtendedBinary> for Binary {
    type Error = String;

    fn try_from(ext: ExtendedBinary) -> Result<Self, Self::Error> {
        let subtype = u8::from_str_radix(&ext.binary.sub_type, 16)
            .map_err(|e| format!("invalid binary subtype {:?}: {e}", ext.binary.sub_type))?;
        let bytes = STANDARD
            .decode(ext.binary.base64.as_bytes())
            .map_err(|e| format!("invalid base64 payload: {e}"))?;
        Ok(Self { subtype, bytes })
    }
}

impl From<Binary> for ExtendedBinary {
    fn from(binary: Binary) -> Self {
        Self {
            binary: ExtendedBinaryBody {
                base64: STANDARD.encode(&binary.bytes),
                sub_type: format!("{:02x}", binary.subtype),
            },
        }
    }
}
