//! Operations decoded from the JSON envelope.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use x8_model::{Response, StoreOperation, X8ErrorCode};

    use crate::{indices, run, seeded_store};

    fn decode(value: serde_json::Value) -> StoreOperation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_should_run_decoded_query() {
        let store = seeded_store().unwrap();
        let op = decode(json!({
            "name": "query",
            "args": {
                "where": "pk = @p1 and int >= @p2",
                "order_by": "int DESC",
                "limit": 2,
                "params": {"p1": "pk01", "p2": 6},
            }
        }));
        assert_eq!(indices(run(&store, op).unwrap()), vec![9, 8]);
    }

    #[test]
    fn test_should_run_decoded_update() {
        let store = seeded_store().unwrap();
        let op = decode(json!({
            "name": "update",
            "args": {
                "key": {"id": "7", "pk": "pk01"},
                "set": "opt=delete(), float=increment(1)",
                "where": "opt = 'wxyz'",
                "returning": "new",
            }
        }));
        let item = run(&store, op).unwrap().into_item().unwrap();
        let value = item.value.unwrap();
        assert!(value.get("opt").is_none());
        assert_eq!(value["float"], json!(8.5));
    }

    #[test]
    fn test_should_round_trip_response() {
        let store = seeded_store().unwrap();
        let op = decode(json!({"name": "count", "args": {"where": "bool = true"}}));
        let response = run(&store, op).unwrap();
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded, json!({"type": "count", "result": 5}));
        let decoded: Response = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_should_surface_decoded_errors() {
        let store = seeded_store().unwrap();
        let op = decode(json!({
            "name": "get",
            "args": {"key": {"id": "42", "pk": "pk00"}}
        }));
        let err = run(&store, op).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::NotFound);
        assert_eq!(err.status_code(), 404);
    }
}
