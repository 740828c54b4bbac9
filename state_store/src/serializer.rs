use std::{any::type_name, fmt::Debug};

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};

pub struct JsonEncoder;

pub trait JsonEncode {
    fn encode<T: Serialize + Debug>(value: &T) -> Result<Vec<u8>>;
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}

impl JsonEncode for JsonEncoder {
    fn encode<T: Serialize + Debug>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            anyhow::anyhow!(
                "error serializing into json: {}, type: {}, value: {:?}",
                e,
                type_name::<T>(),
                value
            )
        })
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            anyhow::anyhow!(
                "error deserializing from json bytes, {}, value: {:?}",
                e,
                type_name::<T>()
            )
        })
    }
}

/// Binary encoding for rows that carry raw content. Byte strings are stored
/// as-is instead of being expanded into JSON arrays.
pub struct CborEncoder;

impl CborEncoder {
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).map_err(|e| {
            anyhow::anyhow!("error serializing into cbor: {}, type: {}", e, type_name::<T>())
        })?;
        Ok(buf)
    }

    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        ciborium::from_reader(bytes).map_err(|e| {
            anyhow::anyhow!(
                "error deserializing from cbor bytes, {}, type: {}",
                e,
                type_name::<T>()
            )
        })
    }
}
