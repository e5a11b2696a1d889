//! Batch and transact semantics.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use x8_model::{Returning, StoreOperation, X8ErrorCode};

    use crate::{documents, empty_store, get_value, key, run, seeded_store};

    #[test]
    fn test_should_leave_every_key_untouched_on_failed_transaction() {
        let store = seeded_store().unwrap();
        let before: Vec<_> = [0, 5, 6]
            .into_iter()
            .map(|i| get_value(&store, key(i)).unwrap())
            .collect();

        let err = run(
            &store,
            StoreOperation::transact(vec![
                StoreOperation::update(key(0), "int=put(100)"),
                StoreOperation::delete(key(5)),
                StoreOperation::update(key(6), "int=put(600)").with_where("int = 7"),
            ]),
        )
        .unwrap_err();
        assert_eq!(err.code, X8ErrorCode::Conflict);
        assert_eq!(err.status_code(), 409);

        let after: Vec<_> = [0, 5, 6]
            .into_iter()
            .map(|i| get_value(&store, key(i)).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_should_fail_transaction_on_missing_target() {
        let store = seeded_store().unwrap();
        let mut doc = documents().unwrap().remove(0);
        doc["id"] = json!("new");

        let err = run(
            &store,
            StoreOperation::transact(vec![
                StoreOperation::put(doc),
                StoreOperation::delete(x8_model::Key::with_pk("missing", "pk00")),
            ]),
        )
        .unwrap_err();
        assert_eq!(err.code, X8ErrorCode::Conflict);
        let err = run(
            &store,
            StoreOperation::get(x8_model::Key::with_pk("new", "pk00")),
        )
        .unwrap_err();
        assert_eq!(err.code, X8ErrorCode::NotFound);
    }

    #[test]
    fn test_should_commit_transaction() {
        let store = seeded_store().unwrap();
        let results = run(
            &store,
            StoreOperation::transact(vec![
                StoreOperation::update(key(1), "int=increment(10)")
                    .with_where("int = 1")
                    .with_returning(Returning::New),
                StoreOperation::delete(key(2)).with_where("exists()"),
                StoreOperation::put(json!({"id": "x", "pk": "pk02", "int": 42}))
                    .with_where("not_exists()"),
            ]),
        )
        .unwrap()
        .into_batch()
        .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().value.as_ref().unwrap()["int"], json!(11));
        assert!(results[1].is_none());
        assert!(results[2].as_ref().unwrap().value.is_none());

        assert_eq!(get_value(&store, key(1)).unwrap()["int"], json!(11));
        assert_eq!(
            run(&store, StoreOperation::get(key(2))).unwrap_err().code,
            X8ErrorCode::NotFound
        );
        assert_eq!(run(&store, StoreOperation::count()).unwrap().count(), Some(10));
    }

    #[test]
    fn test_should_see_earlier_writes_within_transaction() {
        let store = empty_store();
        let results = run(
            &store,
            StoreOperation::transact(vec![
                StoreOperation::put(json!({"id": "a", "n": 1})),
                StoreOperation::update("a", "n=increment(1)").with_where("n = 1"),
                StoreOperation::update("a", "n=increment(1)").with_where("n = 2"),
            ]),
        )
        .unwrap()
        .into_batch()
        .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(get_value(&store, "a".into()).unwrap()["n"], json!(3));
    }

    #[test]
    fn test_should_apply_batch_in_order() {
        let store = empty_store();
        let docs = documents().unwrap();
        let results = run(
            &store,
            StoreOperation::batch(vec![
                StoreOperation::put(docs[0].clone()),
                StoreOperation::put(docs[1].clone()),
                StoreOperation::delete(key(0)),
            ]),
        )
        .unwrap()
        .into_batch()
        .unwrap();

        assert_eq!(results[0].as_ref().unwrap().key, key(0));
        assert_eq!(results[1].as_ref().unwrap().key, key(1));
        assert!(results[2].is_none());
        assert_eq!(run(&store, StoreOperation::count()).unwrap().count(), Some(1));
    }

    #[test]
    fn test_should_reject_conditional_operations_in_batch() {
        let store = empty_store();
        let err = run(
            &store,
            StoreOperation::batch(vec![StoreOperation::update("a", "n=put(1)")]),
        )
        .unwrap_err();
        assert_eq!(err.code, X8ErrorCode::BadRequest);
    }

    #[test]
    fn test_should_key_transact_put_like_plain_put() {
        let value = json!({"id": "1", "n": 1});
        let plain = empty_store();
        run(&plain, StoreOperation::put(value.clone()).with_key("2")).unwrap();

        let transacted = empty_store();
        let results = run(
            &transacted,
            StoreOperation::transact(vec![StoreOperation::put(value).with_key("2")]),
        )
        .unwrap()
        .into_batch()
        .unwrap();
        assert_eq!(results[0].as_ref().unwrap().key, "1".into());

        for store in [&plain, &transacted] {
            assert_eq!(get_value(store, "1".into()).unwrap()["n"], json!(1));
            let err = run(store, StoreOperation::get("2")).unwrap_err();
            assert_eq!(err.code, X8ErrorCode::NotFound);
        }
    }
}
