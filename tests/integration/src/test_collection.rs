//! Collection and index lifecycle.

#[cfg(test)]
mod tests {
    use x8_model::{
        CollectionConfig, CollectionStatus, Index, IndexKind, IndexStatus, Response,
        StoreOperation, X8ErrorCode,
    };

    use crate::{COLLECTION, empty_store, run, seeded_store};

    #[test]
    fn test_should_create_and_drop_collection() {
        let store = empty_store();
        let op = StoreOperation::create_collection().with_where("not_exists()");
        assert_eq!(
            run(&store, op.clone()).unwrap().collection_status(),
            Some(CollectionStatus::Created)
        );
        assert_eq!(run(&store, op).unwrap_err().code, X8ErrorCode::Conflict);
        assert_eq!(
            run(&store, StoreOperation::has_collection()).unwrap(),
            Response::Bool(true)
        );

        let op = StoreOperation::drop_collection().with_where("exists()");
        assert_eq!(
            run(&store, op.clone()).unwrap().collection_status(),
            Some(CollectionStatus::Dropped)
        );
        assert_eq!(run(&store, op).unwrap_err().code, X8ErrorCode::NotFound);
        assert_eq!(
            run(&store, StoreOperation::drop_collection())
                .unwrap()
                .collection_status(),
            Some(CollectionStatus::NotExists)
        );
    }

    #[test]
    fn test_should_drop_documents_with_collection() {
        let store = seeded_store().unwrap();
        run(&store, StoreOperation::drop_collection()).unwrap();
        assert_eq!(run(&store, StoreOperation::count()).unwrap().count(), Some(0));
        assert_eq!(
            run(&store, StoreOperation::list_collections()).unwrap(),
            Response::Names(Vec::new())
        );
    }

    #[test]
    fn test_should_list_collections_in_name_order() {
        let store = seeded_store().unwrap();
        run(&store, StoreOperation::create_collection().in_collection("archive")).unwrap();
        assert_eq!(
            run(&store, StoreOperation::list_collections()).unwrap(),
            Response::Names(vec!["archive".to_owned(), COLLECTION.to_owned()])
        );
    }

    #[test]
    fn test_should_create_collection_indexes() {
        let store = empty_store();
        let config = CollectionConfig {
            indexes: vec![
                Index::new(IndexKind::Range, vec!["int".to_owned()]),
                Index::new(IndexKind::Hash, vec!["str".to_owned()]).named("by_str"),
            ],
        };
        let Response::Collection(result) = run(
            &store,
            StoreOperation::create_collection().with_config(config.clone()),
        )
        .unwrap() else {
            panic!("expected collection result");
        };
        assert_eq!(result.status, CollectionStatus::Created);
        assert!(result.indexes.iter().all(|r| r.status == IndexStatus::Created));

        let Response::Collection(result) =
            run(&store, StoreOperation::create_collection().with_config(config)).unwrap()
        else {
            panic!("expected collection result");
        };
        assert_eq!(result.status, CollectionStatus::Exists);
        assert!(result.indexes.iter().all(|r| r.status == IndexStatus::Exists));

        let Response::Indexes(indexes) = run(&store, StoreOperation::list_indexes()).unwrap()
        else {
            panic!("expected indexes");
        };
        let names: Vec<_> = indexes.iter().filter_map(|i| i.name.as_deref()).collect();
        assert_eq!(names, vec!["by_str", "range_int"]);
    }

    #[test]
    fn test_should_follow_index_tri_state() {
        let store = empty_store();
        let index = Index::new(IndexKind::Composite, vec!["pk".to_owned(), "obj.nint".to_owned()]);

        let created = run(&store, StoreOperation::create_index(index.clone())).unwrap();
        assert_eq!(created.index_status(), Some(IndexStatus::Created));
        let err = run(
            &store,
            StoreOperation::create_index(index.clone()).with_where("not_exists()"),
        )
        .unwrap_err();
        assert_eq!(err.code, X8ErrorCode::Conflict);

        let dropped = run(&store, StoreOperation::drop_index(index.clone())).unwrap();
        assert_eq!(dropped.index_status(), Some(IndexStatus::Dropped));
        let err = run(&store, StoreOperation::drop_index(index).with_where("exists()")).unwrap_err();
        assert_eq!(err.code, X8ErrorCode::NotFound);
    }

    #[test]
    fn test_should_close_without_effect() {
        let store = seeded_store().unwrap();
        assert_eq!(run(&store, StoreOperation::close()).unwrap(), Response::Empty);
        assert_eq!(run(&store, StoreOperation::count()).unwrap().count(), Some(10));
    }
}
