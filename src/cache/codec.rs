//! Conversion between the beacon API's JSON committees payload and the
//! protobuf encoding records are stored in.
//!
//! 64-bit integers travel as decimal strings in JSON (numbers are accepted on
//! input too). Every field is emitted, defaults included. Unknown JSON fields
//! are ignored so upstream additions do not make responses uncacheable.

use prost::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROTOBUF_CONTENT_TYPE: &str = "application/protobuf";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Committee assignments for one epoch, as returned by
/// `/eth/v1/beacon/states/{state_id}/committees`.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitteesResponse {
    #[prost(bool, tag = "1")]
    pub execution_optimistic: bool,
    #[prost(bool, tag = "2")]
    pub finalized: bool,
    #[prost(message, repeated, tag = "3")]
    pub data: Vec<Committee>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Committee {
    #[prost(uint64, tag = "1")]
    #[serde(with = "quoted_u64")]
    pub index: u64,
    #[prost(uint64, tag = "2")]
    #[serde(with = "quoted_u64")]
    pub slot: u64,
    #[prost(uint64, repeated, tag = "3")]
    #[serde(with = "quoted_u64_seq")]
    pub validators: Vec<u64>,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid committees json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid committees protobuf: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Convert an upstream JSON body into the stored encoding.
pub fn json_to_canonical(json: &[u8]) -> Result<Vec<u8>, CodecError> {
    let message: CommitteesResponse = serde_json::from_slice(json)?;
    Ok(message.encode_to_vec())
}

/// Convert a stored record back into the upstream JSON shape.
pub fn canonical_to_json(canonical: &[u8]) -> Result<Vec<u8>, CodecError> {
    let message = CommitteesResponse::decode(canonical)?;
    Ok(serde_json::to_vec(&message)?)
}

mod quoted_u64 {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_any(QuotedU64Visitor)
    }

    struct QuotedU64Visitor;

    impl Visitor<'_> for QuotedU64Visitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an unsigned 64-bit integer or its decimal string")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(E::invalid_value(de::Unexpected::Str(value), &self));
            }
            value
                .parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
        }
    }
}

mod quoted_u64_seq {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    struct Quoted(#[serde(with = "super::quoted_u64")] u64);

    pub fn serialize<S: Serializer>(values: &[u64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(u64::to_string))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u64>, D::Error> {
        let values = Vec::<Quoted>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|Quoted(value)| value).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn sample() -> Value {
        json!({
            "execution_optimistic": false,
            "finalized": true,
            "data": [
                {"index": "0", "slot": "1", "validators": ["12", "4096", "18446744073709551615"]},
                {"index": "1", "slot": "1", "validators": []}
            ]
        })
    }

    #[test]
    fn json_survives_canonical_roundtrip() {
        let original = sample();
        let canonical =
            json_to_canonical(original.to_string().as_bytes()).expect("json should encode");
        let restored = canonical_to_json(&canonical).expect("protobuf should decode");

        let restored: Value = serde_json::from_slice(&restored).expect("output is json");
        assert_eq!(restored, original);
    }

    #[test]
    fn numeric_integers_are_accepted_and_emitted_as_strings() {
        let input = json!({"data": [{"index": 3, "slot": 96, "validators": [7, "8"]}]});
        let canonical = json_to_canonical(input.to_string().as_bytes()).expect("encodes");
        let restored: Value =
            serde_json::from_slice(&canonical_to_json(&canonical).expect("decodes"))
                .expect("output is json");

        assert_eq!(
            restored,
            json!({
                "execution_optimistic": false,
                "finalized": false,
                "data": [{"index": "3", "slot": "96", "validators": ["7", "8"]}]
            })
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let input = json!({"finalized": true, "data": [], "version": "deneb"});
        let canonical = json_to_canonical(input.to_string().as_bytes()).expect("encodes");
        let message = CommitteesResponse::decode(canonical.as_slice()).expect("decodes");
        assert!(message.finalized);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            json_to_canonical(b"not json"),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            json_to_canonical(br#"{"data":[{"index":"-1"}]}"#),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            json_to_canonical(br#"{"data":[{"slot":"1e3"}]}"#),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn garbage_protobuf_is_rejected() {
        assert!(matches!(
            canonical_to_json(&[0xff, 0xff, 0xff]),
            Err(CodecError::Decode(_))
        ));
    }
}
