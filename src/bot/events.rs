//! Lock-event recognition and payload extraction.
//!
//! An event qualifies when its first topic decodes to text containing
//! `lock`. Payloads may arrive as symbol-keyed maps or as positional
//! vectors; both produce the same [`LockEvent`]. Individually missing fields
//! fall back to defaults, but a payload that is not a map or vector at all
//! disqualifies the event.

use serde_json::Value as Json;
use tracing::warn;

use crate::soroban::rpc::RawEvent;
use crate::soroban::scval::{DecodeError, ScVal};

use super::types::LockEvent;

/// Field order of positional payload vectors.
const FIELD_ORDER: [&str; 8] = [
    "user",
    "amount",
    "duration_minutes",
    "reward_multiplier",
    "tx_hash",
    "timestamp",
    "lock_index",
    "unlock_timestamp",
];

/// Decode one raw event into a [`LockEvent`], or `None` when the event does
/// not qualify or its payload cannot be decoded.
pub fn extract_lock_event(raw: &RawEvent) -> Option<LockEvent> {
    if !has_lock_topic(&raw.topic) {
        return None;
    }
    let fields = match payload_fields(&raw.value) {
        Ok(fields) => fields,
        Err(e) => {
            warn!(event_id = %raw.id, error = %e, "skipping event with undecodable payload");
            return None;
        }
    };
    let field = |name: &str| fields.iter().find(|(k, _)| k == name).map(|(_, v)| v);

    Some(LockEvent {
        user: field("user").and_then(ScVal::as_text).unwrap_or_default(),
        amount: field("amount").and_then(ScVal::as_u128).unwrap_or(0),
        duration_minutes: field("duration_minutes").and_then(ScVal::as_u64).unwrap_or(0),
        reward_multiplier: field("reward_multiplier").and_then(ScVal::as_u64).unwrap_or(0),
        tx_hash: event_tx_hash(&raw.id),
        timestamp: field("timestamp").and_then(ScVal::as_u64).unwrap_or(0),
        lock_index: field("lock_index").and_then(ScVal::as_u32).unwrap_or(0),
        unlock_timestamp: field("unlock_timestamp").and_then(ScVal::as_u64).unwrap_or(0),
        ledger: raw.ledger,
    })
}

/// The ledger transaction hash is the first segment of the event id.
fn event_tx_hash(event_id: &str) -> String {
    event_id.split('-').next().unwrap_or_default().to_string()
}

fn has_lock_topic(topics: &[Json]) -> bool {
    let first = match topics.first() {
        Some(t) => t,
        None => return false,
    };
    decode_value(first)
        .ok()
        .and_then(|v| v.as_text())
        .map(|text| text.contains("lock"))
        .unwrap_or(false)
}

/// Decode either payload encoding into named fields.
fn payload_fields(value: &Json) -> Result<Vec<(String, ScVal)>, DecodeError> {
    match decode_value(value)? {
        ScVal::Map(entries) => Ok(entries
            .into_iter()
            .filter_map(|(key, val)| key.as_text().map(|name| (name, val)))
            .collect()),
        ScVal::Vec(items) => Ok(items
            .into_iter()
            .zip(FIELD_ORDER)
            .map(|(val, name)| (name.to_string(), val))
            .collect()),
        _ => Err(DecodeError::NotAContainer),
    }
}

fn decode_value(value: &Json) -> Result<ScVal, DecodeError> {
    match value {
        Json::String(b64) => ScVal::from_xdr_base64(b64),
        other => ScVal::from_json(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soroban::strkey;
    use serde_json::json;

    fn sym(s: &str) -> ScVal {
        ScVal::Symbol(s.to_string())
    }

    fn user_address() -> String {
        strkey::encode_account(&[9u8; 32])
    }

    fn lock_payload_map() -> ScVal {
        ScVal::Map(vec![
            (sym("user"), ScVal::Address(user_address())),
            (sym("amount"), ScVal::I128(100_0000000)),
            (sym("duration_minutes"), ScVal::U64(60)),
            (sym("reward_multiplier"), ScVal::U64(2)),
            (sym("tx_hash"), ScVal::Bytes(vec![0xaa, 0xbb])),
            (sym("timestamp"), ScVal::U64(1_700_000_000)),
            (sym("lock_index"), ScVal::U32(3)),
            (sym("unlock_timestamp"), ScVal::U64(1_700_003_600)),
        ])
    }

    fn raw_event(topic: Json, value: Json) -> RawEvent {
        RawEvent {
            id: "0004599586954117120-0000000001".to_string(),
            ledger: 4500,
            topic: vec![topic],
            value,
        }
    }

    #[test]
    fn extracts_from_xdr_map_payload() {
        let topic = Json::String(sym("lock").to_xdr_base64().unwrap());
        let value = Json::String(lock_payload_map().to_xdr_base64().unwrap());
        let event = extract_lock_event(&raw_event(topic, value)).unwrap();

        assert_eq!(event.user, user_address());
        assert_eq!(event.amount, 100_0000000);
        assert_eq!(event.duration_minutes, 60);
        assert_eq!(event.reward_multiplier, 2);
        assert_eq!(event.lock_index, 3);
        assert_eq!(event.unlock_timestamp, 1_700_003_600);
        assert_eq!(event.ledger, 4500);
        // Derived from the event id, not the payload field.
        assert_eq!(event.tx_hash, "0004599586954117120");
    }

    #[test]
    fn extracts_from_structural_vector_payload() {
        let topic = json!({"type": "symbol", "value": "lock"});
        let value = json!({
            "type": "vec",
            "value": [
                {"type": "address", "value": user_address()},
                {"type": "i128", "value": {"hi": 0, "lo": 100_0000000u64}},
                {"type": "u64", "value": 60},
                {"type": "u64", "value": 2},
                {"type": "bytes", "value": "aabb"},
                {"type": "u64", "value": 1_700_000_000u64},
                {"type": "u32", "value": 3},
                {"type": "u64", "value": 1_700_003_600u64}
            ]
        });
        let event = extract_lock_event(&raw_event(topic, value)).unwrap();

        assert_eq!(event.user, user_address());
        assert_eq!(event.amount, 100_0000000);
        assert_eq!(event.lock_index, 3);
    }

    #[test]
    fn short_vector_defaults_missing_fields() {
        let topic = json!({"type": "symbol", "value": "lock"});
        let value = json!({
            "type": "vec",
            "value": [
                {"type": "address", "value": user_address()},
                {"type": "i128", "value": "500"}
            ]
        });
        let event = extract_lock_event(&raw_event(topic, value)).unwrap();
        assert_eq!(event.amount, 500);
        assert_eq!(event.lock_index, 0);
        assert_eq!(event.duration_minutes, 0);
    }

    #[test]
    fn non_lock_topic_is_ignored() {
        let topic = Json::String(sym("deposit").to_xdr_base64().unwrap());
        let value = Json::String(lock_payload_map().to_xdr_base64().unwrap());
        assert!(extract_lock_event(&raw_event(topic, value)).is_none());
    }

    #[test]
    fn empty_topics_are_ignored() {
        let mut event = raw_event(Json::Null, Json::Null);
        event.topic.clear();
        assert!(extract_lock_event(&event).is_none());
    }

    #[test]
    fn scalar_payload_is_rejected() {
        let topic = json!({"type": "symbol", "value": "lock"});
        let value = Json::String(ScVal::U32(7).to_xdr_base64().unwrap());
        assert!(extract_lock_event(&raw_event(topic, value)).is_none());
    }

    #[test]
    fn negative_amount_defaults_to_zero() {
        let topic = json!({"type": "symbol", "value": "lock"});
        let value = Json::String(
            ScVal::Map(vec![
                (sym("user"), ScVal::Address(user_address())),
                (sym("amount"), ScVal::I128(-100)),
            ])
            .to_xdr_base64()
            .unwrap(),
        );
        let event = extract_lock_event(&raw_event(topic, value)).unwrap();
        assert_eq!(event.amount, 0);
    }
}
