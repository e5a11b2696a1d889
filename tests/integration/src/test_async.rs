//! The await-based calling convention.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use x8_model::{Context, StoreOperation};
    use x8_store::AsyncStoreProvider;

    use crate::{empty_store, key, seeded_store};

    #[tokio::test]
    async fn test_should_match_sync_results() {
        let store = seeded_store().unwrap();
        let ctx = Context::with_trace_id("integration");
        let item = store
            .arun(&StoreOperation::get(key(8)), &ctx)
            .await
            .unwrap()
            .into_item()
            .unwrap();
        assert_eq!(item.value.unwrap()["str"], json!("eight"));
    }

    #[tokio::test]
    async fn test_should_serialize_concurrent_increments() {
        let store = Arc::new(empty_store());
        let ctx = Context::default();
        store
            .arun(&StoreOperation::put(json!({"id": "counter", "n": 0})), &ctx)
            .await
            .unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let op = StoreOperation::update("counter", "n=increment(1)");
                    store.arun(&op, &Context::default()).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let item = store
            .arun(&StoreOperation::get("counter"), &ctx)
            .await
            .unwrap()
            .into_item()
            .unwrap();
        assert_eq!(item.value.unwrap()["n"], json!(16));
    }
}
