//! Single-document operations: put, get, update, delete.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use x8_model::{Key, Returning, StoreOperation, X8ErrorCode};

    use crate::{documents, empty_store, get_value, key, run, seeded_store};

    #[test]
    fn test_should_keep_state_after_repeated_put() {
        let store = empty_store();
        let doc = documents().unwrap().remove(0);
        run(&store, StoreOperation::put(doc.clone())).unwrap();
        run(&store, StoreOperation::put(doc.clone())).unwrap();

        let mut stored = get_value(&store, key(0)).unwrap();
        stored.as_object_mut().unwrap().remove("_etag");
        assert_eq!(stored, doc);
        assert_eq!(run(&store, StoreOperation::count()).unwrap().count(), Some(1));
    }

    #[test]
    fn test_should_change_etag_on_every_write() {
        let store = seeded_store().unwrap();
        let mut etags = vec![get_value(&store, key(3)).unwrap()["_etag"].clone()];

        let doc = documents().unwrap().remove(3);
        let put = run(&store, StoreOperation::put(doc)).unwrap().into_item().unwrap();
        etags.push(json!(put.etag().unwrap()));

        let updated = run(
            &store,
            StoreOperation::update(key(3), "int=increment(1)").with_returning(Returning::New),
        )
        .unwrap()
        .into_item()
        .unwrap();
        etags.push(json!(updated.etag().unwrap()));

        assert_ne!(etags[0], etags[1]);
        assert_ne!(etags[1], etags[2]);
        assert_ne!(etags[0], etags[2]);
    }

    #[test]
    fn test_should_apply_update_to_nested_fields() {
        let store = seeded_store().unwrap();
        run(
            &store,
            StoreOperation::update(
                key(0),
                "int=put(99), obj.nstr=put('90'), arrint=put([1,2,3])",
            ),
        )
        .unwrap();

        let doc = get_value(&store, key(0)).unwrap();
        assert_eq!(doc["int"], json!(99));
        assert_eq!(doc["obj"]["nstr"], json!("90"));
        assert_eq!(doc["arrint"], json!([1, 2, 3]));
        assert_eq!(doc["obj"]["nint"], json!(0));
    }

    #[test]
    fn test_should_apply_array_updates() {
        let store = seeded_store().unwrap();
        run(
            &store,
            StoreOperation::update(
                key(9),
                "arrstr[0]=insert('first'), arrstr[-]=insert('last'), arrint=array_union([9, 11, 12]), obj.narr=array_remove([900])",
            ),
        )
        .unwrap();

        let doc = get_value(&store, key(9)).unwrap();
        assert_eq!(doc["arrstr"][0], json!("first"));
        assert_eq!(doc["arrstr"][5], json!("last"));
        assert_eq!(doc["arrint"], json!([9, 10, 11, 12]));
        assert_eq!(doc["obj"]["narr"], json!([950]));
    }

    #[test]
    fn test_should_move_field() {
        let store = seeded_store().unwrap();
        run(&store, StoreOperation::update(key(4), "newarrstr=move(arrstr)")).unwrap();
        let doc = get_value(&store, key(4)).unwrap();
        assert!(doc.get("arrstr").is_none());
        assert_eq!(doc["newarrstr"][0], json!("four"));
    }

    #[test]
    fn test_should_enforce_not_exists_on_put() {
        let store = empty_store();
        let doc = documents().unwrap().remove(1);

        run(&store, StoreOperation::put(doc.clone()).with_where("not_exists()")).unwrap();
        let err = run(&store, StoreOperation::put(doc).with_where("not_exists()")).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::PreconditionFailed);
        assert_eq!(err.status_code(), 412);
    }

    #[test]
    fn test_should_enforce_etag_on_update() {
        let store = seeded_store().unwrap();
        let etag = get_value(&store, key(5)).unwrap()["_etag"]
            .as_str()
            .unwrap()
            .to_owned();

        let err = run(
            &store,
            StoreOperation::update(key(5), "str=put('x')").with_where("$etag = 'nope'"),
        )
        .unwrap_err();
        assert_eq!(err.code, X8ErrorCode::PreconditionFailed);

        run(
            &store,
            StoreOperation::update(key(5), "str=put('x')").with_where(format!("$etag = '{etag}'")),
        )
        .unwrap();
        assert_eq!(get_value(&store, key(5)).unwrap()["str"], json!("x"));
    }

    #[test]
    fn test_should_scope_keys_by_partition() {
        let store = seeded_store().unwrap();
        let err = run(&store, StoreOperation::get(Key::with_pk("0", "pk01"))).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::NotFound);
        let err = run(&store, StoreOperation::get("0")).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::NotFound);
    }

    #[test]
    fn test_should_delete_conditionally() {
        let store = seeded_store().unwrap();
        let err = run(&store, StoreOperation::delete(key(2)).with_where("int > 5")).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::PreconditionFailed);

        run(&store, StoreOperation::delete(key(2)).with_where("int = 2")).unwrap();
        let err = run(&store, StoreOperation::get(key(2))).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::NotFound);

        let err = run(&store, StoreOperation::delete(key(2))).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::NotFound);
    }

    #[test]
    fn test_should_report_update_index_errors_as_bad_request() {
        let store = seeded_store().unwrap();
        let err = run(&store, StoreOperation::update(key(1), "arrint[7]=delete()")).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::BadRequest);
        assert_eq!(get_value(&store, key(1)).unwrap()["arrint"], json!([1, 2]));
    }

    #[test]
    fn test_should_report_malformed_update_as_parse_error() {
        let store = seeded_store().unwrap();
        let err = run(&store, StoreOperation::update(key(1), "int=")).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::ParseError);
    }
}
