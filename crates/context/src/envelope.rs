//! Response envelope decoding.
//!
//! Engine responses reach us bare, wrapped as `{result: ..}`, wrapped as
//! `{output: ..}`, or wrapped twice. Everything is peeled here so the typed
//! client only ever sees payloads.

use meropools_types::{BatchMatchResult, UserOrder};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{ContextError, Result};

const WRAPPERS: [&str; 2] = ["result", "output"];
const ORDER_ID_FIELDS: [&str; 3] = ["output", "result", "success"];

/// Peel single-key `{result: ..}` / `{output: ..}` wrappers until a payload
/// remains. Objects with other keys are payloads.
pub fn unwrap_payload(mut value: Value) -> Value {
    loop {
        match single_wrapper(&mut value) {
            Some(inner) => value = inner,
            None => return value,
        }
    }
}

fn single_wrapper(value: &mut Value) -> Option<Value> {
    let map = value.as_object_mut()?;
    if map.len() != 1 {
        return None;
    }
    WRAPPERS.iter().find_map(|key| map.remove(*key))
}

/// Unwrap and deserialize a payload.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(unwrap_payload(value))?)
}

/// Decode a `get_batch_orders` response.
///
/// Accepts the 2-element `[batch, orders]` tuple or a `{result, orders}`
/// object. `null` means the batch is unknown. Any other shape is rejected.
pub fn decode_batch_orders(value: Value) -> Result<Option<(BatchMatchResult, Vec<UserOrder>)>> {
    match unwrap_payload(value) {
        Value::Null => Ok(None),
        Value::Array(items) if items.len() == 2 => {
            let mut items = items.into_iter();
            let batch = items.next().unwrap_or(Value::Null);
            let orders = items.next().unwrap_or(Value::Null);
            decode_pair(batch, orders).map(Some)
        }
        Value::Array(items) => Err(ContextError::MalformedEnvelope(format!(
            "expected [batch, orders], got array of {}",
            items.len()
        ))),
        Value::Object(map) if is_result_orders(&map) => {
            let mut map = map;
            let batch = map.remove("result").unwrap_or(Value::Null);
            let orders = map.remove("orders").unwrap_or(Value::Null);
            decode_pair(batch, orders).map(Some)
        }
        other => Err(ContextError::MalformedEnvelope(format!(
            "unrecognised batch orders shape: {}",
            shape_of(&other)
        ))),
    }
}

fn is_result_orders(map: &Map<String, Value>) -> bool {
    map.len() == 2 && map.contains_key("result") && map.contains_key("orders")
}

fn decode_pair(batch: Value, orders: Value) -> Result<(BatchMatchResult, Vec<UserOrder>)> {
    let batch: BatchMatchResult = serde_json::from_value(batch)?;
    let orders: Vec<UserOrder> = serde_json::from_value(orders)?;
    Ok((batch, orders))
}

/// Normalize a listing response into a list, defaulting to empty when the
/// shape is not a list at all.
pub fn normalize_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    match unwrap_payload(value) {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(ContextError::from))
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => {
            warn!(shape = shape_of(&other), "Unrecognised list response, treating as empty");
            Ok(Vec::new())
        }
    }
}

/// Pull the new order id out of a `submit_order` response.
pub fn extract_order_id(value: Value) -> Result<String> {
    match value {
        Value::String(id) if !id.is_empty() => Ok(id),
        Value::Object(mut map) => {
            for key in ORDER_ID_FIELDS {
                if let Some(inner) = map.remove(key) {
                    return extract_order_id(inner);
                }
            }
            Err(ContextError::MalformedEnvelope(
                "order id response has no output, result or success field".to_string(),
            ))
        }
        other => Err(ContextError::MalformedEnvelope(format!(
            "order id must be a non-empty string, got {}",
            shape_of(&other)
        ))),
    }
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch_json() -> Value {
        json!({
            "batch_id": "batch_1",
            "matched_orders": [["order_1", "order_2"]],
            "clearing_price": "2000000000000000000",
            "total_volume": "100",
            "nullifiers": [],
            "timestamp": 1
        })
    }

    fn order_json(id: &str) -> Value {
        json!({
            "id": id,
            "user_id": "pk_alice",
            "commitment": {
                "commitment_hash": vec![0u8; 32],
                "encrypted_payload": [1],
                "nullifier_seed": vec![0u8; 32],
                "proof_of_funds": vec![0u8; 32],
                "timestamp": 1,
                "expiry": 2
            },
            "token_deposited": "B3TR",
            "amount_deposited": "100",
            "escrow_confirmed": true,
            "vechain_address": "0x00000000000000000000000000000000000a11ce",
            "expected_price": "2000000000000000000",
            "expected_exchange_token": "VET",
            "spread": 50,
            "time_limit": 60,
            "status": "FullyMatched",
            "matched": true,
            "created_at": 1,
            "updated_at": 1
        })
    }

    #[test]
    fn test_unwrap_peels_nested_wrappers() {
        assert_eq!(unwrap_payload(json!({"result": {"output": 5}})), json!(5));
        assert_eq!(unwrap_payload(json!({"output": [1, 2]})), json!([1, 2]));
        assert_eq!(unwrap_payload(json!("bare")), json!("bare"));
    }

    #[test]
    fn test_unwrap_keeps_multi_key_objects() {
        let value = json!({"result": 1, "orders": []});
        assert_eq!(unwrap_payload(value.clone()), value);
    }

    #[test]
    fn test_nested_and_bare_batch_orders_agree() {
        let pair = json!([batch_json(), [order_json("order_1"), order_json("order_2")]]);
        let wrapped = json!({"result": {"output": pair.clone()}});

        let from_bare = decode_batch_orders(pair).unwrap().unwrap();
        let from_wrapped = decode_batch_orders(wrapped).unwrap().unwrap();

        assert_eq!(from_bare, from_wrapped);
        assert_eq!(from_bare.0.batch_id, "batch_1");
        assert_eq!(from_bare.1.len(), 2);
    }

    #[test]
    fn test_result_orders_object_accepted() {
        let value = json!({"output": {"result": batch_json(), "orders": [order_json("order_1")]}});
        let (batch, orders) = decode_batch_orders(value).unwrap().unwrap();
        assert_eq!(batch.batch_id, "batch_1");
        assert_eq!(orders[0].id, "order_1");
    }

    #[test]
    fn test_unknown_batch_is_none() {
        assert!(decode_batch_orders(json!({"output": null})).unwrap().is_none());
    }

    #[test]
    fn test_malformed_batch_shapes_rejected() {
        for value in [
            json!([batch_json()]),
            json!([batch_json(), [], []]),
            json!({"batch": batch_json(), "orders": []}),
            json!("batch_1"),
            json!(7),
        ] {
            assert!(matches!(
                decode_batch_orders(value),
                Err(ContextError::MalformedEnvelope(_))
            ));
        }
    }

    #[test]
    fn test_normalize_list_shapes() {
        let bare: Vec<String> = normalize_list(json!(["a", "b"])).unwrap();
        let wrapped: Vec<String> = normalize_list(json!({"result": ["a", "b"]})).unwrap();
        let odd: Vec<String> = normalize_list(json!({"users": ["a"]})).unwrap();
        let null: Vec<String> = normalize_list(json!({"output": null})).unwrap();

        assert_eq!(bare, wrapped);
        assert!(odd.is_empty());
        assert!(null.is_empty());
    }

    #[test]
    fn test_normalize_list_rejects_bad_items() {
        let result: Result<Vec<u32>> = normalize_list(json!(["not a number"]));
        assert!(matches!(result, Err(ContextError::Decode(_))));
    }

    #[test]
    fn test_extract_order_id_cases() {
        assert_eq!(extract_order_id(json!("order_1")).unwrap(), "order_1");
        assert_eq!(extract_order_id(json!({"output": "order_2"})).unwrap(), "order_2");
        assert_eq!(extract_order_id(json!({"result": "order_3"})).unwrap(), "order_3");
        assert_eq!(extract_order_id(json!({"success": "order_4"})).unwrap(), "order_4");
        assert_eq!(
            extract_order_id(json!({"result": {"output": "order_5"}})).unwrap(),
            "order_5"
        );
    }

    #[test]
    fn test_extract_order_id_failures() {
        for value in [
            json!(null),
            json!(""),
            json!(42),
            json!({"id": "order_1"}),
            json!({"output": 1}),
            json!(["order_1"]),
        ] {
            assert!(extract_order_id(value).is_err());
        }
    }
}
