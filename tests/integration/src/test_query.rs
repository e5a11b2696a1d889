//! Query and count over the fixture documents.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use x8_model::{QueryArgs, StoreOperation, X8ErrorCode};
    use x8_ql::{Expression, OrderBy, Params, Select};

    use x8_store::{Memory, MemoryConfig};

    use crate::{COLLECTION, indices, run, seeded_store};

    fn query(where_: &str, order_by: Option<&str>) -> Vec<usize> {
        let store = seeded_store().unwrap();
        let args = match order_by {
            Some(order_by) => QueryArgs::builder().where_(where_).order_by(order_by).build(),
            None => QueryArgs::builder().where_(where_).build(),
        };
        indices(run(&store, StoreOperation::query(args)).unwrap())
    }

    fn sorted(mut values: Vec<usize>) -> Vec<usize> {
        values.sort_unstable();
        values
    }

    #[test]
    fn test_should_filter_range_in_descending_order() {
        assert_eq!(
            query("pk = 'pk00' and int between 1 and 3", Some("int DESC")),
            vec![3, 2, 1]
        );
    }

    #[test]
    fn test_should_filter_by_array_membership() {
        assert_eq!(
            sorted(query("pk = 'pk00' and array_contains(arrstr, 'zero')", None)),
            vec![0, 2, 3, 4]
        );
        assert_eq!(
            query("pk = 'pk00' and array_contains(arrstr, 'zero')", Some("str")),
            vec![4, 3, 2, 0]
        );
    }

    #[test]
    fn test_should_match_object_in_array() {
        assert_eq!(
            query(
                r#"pk = 'pk01' and array_contains(arrobj, {"ostr": "nine million", "oint": 9000000})"#,
                Some("str"),
            ),
            vec![9]
        );
    }

    #[test]
    fn test_should_combine_comparisons() {
        assert_eq!(query("pk = 'pk01' and str > 'eight'", Some("str")), vec![5, 9, 7, 6]);
        assert_eq!(sorted(query("pk = 'pk01' and int != 7", None)), vec![5, 6, 8, 9]);
        assert_eq!(
            query("pk = 'pk01' and str = 'xsix' and (int = 5 or bool = true)", Some("str")),
            vec![6]
        );
        assert_eq!(sorted(query("pk = 'pk00' and obj.nint >= -1", None)), vec![0, 1]);
    }

    #[test]
    fn test_should_evaluate_membership_lists() {
        assert_eq!(
            sorted(query("pk = 'pk00' and opt in ('abcd', 'cdef', 'xxx')", None)),
            vec![2, 4]
        );
        assert_eq!(sorted(query("pk = 'pk00' and int not in (1, 3, 5)", None)), vec![0, 2, 4]);
    }

    #[test]
    fn test_should_evaluate_string_functions() {
        assert_eq!(query("pk = 'pk01' and starts_with(str, 'xs')", Some("str")), vec![7, 6]);
        assert_eq!(query("pk = 'pk00' and contains(opt, 'cde')", Some("int")), vec![3, 4]);
        assert_eq!(
            query("pk = 'pk00' and array_contains_any(obj.narr, [400, 200, 1000])", Some("int DESC")),
            vec![4, 2]
        );
    }

    #[test]
    fn test_should_navigate_indexed_paths() {
        assert_eq!(
            query(
                "pk = 'pk00' and arrstr[3] = 'zero' and obj.narr[0] <= 200 and arrobj[1].oint >= 2000000000",
                None,
            ),
            vec![2]
        );
    }

    #[test]
    fn test_should_treat_undefined_fields_as_non_matching() {
        assert_eq!(sorted(query("opt between 'a' and 'z'", None)), vec![2, 3, 4, 7]);
        assert_eq!(sorted(query("is_not_defined(opt) and pk = 'pk00'", None)), vec![0, 1]);
    }

    #[test]
    fn test_should_paginate_ordered_results() {
        let store = seeded_store().unwrap();
        let page = |limit: Option<usize>, offset: Option<usize>| {
            let args = QueryArgs {
                where_: Some("pk = 'pk01'".into()),
                order_by: Some("id DESC".into()),
                limit,
                offset,
                ..QueryArgs::default()
            };
            indices(run(&store, StoreOperation::query(args)).unwrap())
        };

        let full = page(None, None);
        assert_eq!(full, vec![9, 8, 7, 6, 5]);
        assert_eq!(page(Some(3), None), vec![9, 8, 7]);
        assert_eq!(page(Some(10), Some(3)), vec![6, 5]);
        for offset in 0..6 {
            for limit in 1..6 {
                let expected: Vec<_> = full.iter().copied().skip(offset).take(limit).collect();
                assert_eq!(page(Some(limit), Some(offset)), expected);
            }
        }

        let count = run(&store, StoreOperation::count().with_where("pk = 'pk01'"))
            .unwrap()
            .count();
        assert_eq!(count, Some(full.len()));
    }

    #[test]
    fn test_should_project_selected_fields() {
        let store = seeded_store().unwrap();
        let args = QueryArgs::builder()
            .select("obj.nstr, $id AS key")
            .where_("pk = 'pk00' and int <= 1")
            .order_by("int")
            .build();
        let items = run(&store, StoreOperation::query(args))
            .unwrap()
            .into_items()
            .unwrap();
        let values: Vec<_> = items.into_iter().map(|item| item.value.unwrap()).collect();
        assert_eq!(
            values,
            vec![
                json!({"obj": {"nstr": "0"}, "key": "0"}),
                json!({"obj": {"nstr": "10"}, "key": "1"}),
            ]
        );
    }

    #[test]
    fn test_should_accept_parsed_clauses_and_params() {
        let store = seeded_store().unwrap();
        let params: Params = [("p1".to_owned(), json!("pk00")), ("p2".to_owned(), json!(2))]
            .into_iter()
            .collect();
        let where_ = x8_ql::parse_condition("$pk = @p1 and int <= @p2", Some(&params)).unwrap();
        let args = QueryArgs::builder()
            .select(Select::new().field("$id"))
            .where_(where_)
            .order_by(OrderBy::new().desc("int"))
            .build();
        let items = run(&store, StoreOperation::query(args))
            .unwrap()
            .into_items()
            .unwrap();
        let ids: Vec<_> = items.iter().map(|item| item.value.clone().unwrap()).collect();
        assert_eq!(ids, vec![json!({"id": "2"}), json!({"id": "1"}), json!({"id": "0"})]);

        let count = run(
            &store,
            StoreOperation::count().with_where(Expression::eq(
                Expression::field("pk"),
                Expression::value("pk01"),
            )),
        )
        .unwrap()
        .count();
        assert_eq!(count, Some(5));
    }

    #[test]
    fn test_should_resolve_params_from_operation() {
        let store = seeded_store().unwrap();
        let params: Params = [("p1".to_owned(), json!(["abcd", "cdef"]))].into_iter().collect();
        let count = run(
            &store,
            StoreOperation::count()
                .with_where("opt in @p1")
                .with_params(params),
        )
        .unwrap()
        .count();
        assert_eq!(count, Some(2));
    }

    #[test]
    fn test_should_reject_malformed_and_unsupported_conditions() {
        let store = seeded_store().unwrap();
        let err = run(&store, StoreOperation::count().with_where("int >")).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::ParseError);
        let err = run(
            &store,
            StoreOperation::count().with_where("text_search(query='zero')"),
        )
        .unwrap_err();
        assert_eq!(err.code, X8ErrorCode::BadRequest);
    }

    #[test]
    fn test_should_return_suppressed_field_only_when_selected() {
        let store = Memory::new(
            MemoryConfig::builder()
                .collection(COLLECTION)
                .suppress_fields(vec!["_etag".to_owned()])
                .build(),
        );
        run(&store, StoreOperation::put(json!({"id": "a", "n": 1}))).unwrap();

        let all = run(&store, StoreOperation::query(QueryArgs::default()))
            .unwrap()
            .into_items()
            .unwrap();
        assert_eq!(all[0].value, Some(json!({"id": "a", "n": 1})));
        assert!(all[0].etag().is_some());

        let args = QueryArgs::builder().select("id, _etag").build();
        let selected = run(&store, StoreOperation::query(args))
            .unwrap()
            .into_items()
            .unwrap();
        let value = selected[0].value.as_ref().unwrap();
        assert_eq!(value["id"], json!("a"));
        assert_eq!(value["_etag"].as_str(), selected[0].etag());
        assert!(value.get("n").is_none());
    }
}
