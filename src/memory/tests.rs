//! Memory Module Tests
//!
//! Validates the coherence protocol at the block and store level, without any networking.
//!
//! ## Test Scopes
//! - **Block**: Mapping rules, version monotonicity, stale-write rejection, update semantics.
//! - **Wait**: Immediate return when stale, release on write, broadcast to every waiter.
//! - **BlockStore**: Range validation, routing and per-client cleanup.

#[cfg(test)]
mod tests {
    use crate::memory::block::Block;
    use crate::memory::store::BlockStore;
    use crate::memory::types::*;
    use std::sync::Arc;
    use std::time::Duration;

    const SIZE: usize = 32;

    fn payload(byte: u8) -> Vec<u8> {
        vec![byte; SIZE]
    }

    // ============================================================
    // BLOCK MAPPING TESTS
    // ============================================================

    #[test]
    fn test_map_twice_is_already_mapped() {
        let block = Block::new(SIZE);
        let client = ClientId::new();

        assert!(block.map(client).is_ok());
        assert_eq!(block.map(client), Err(BlockError::AlreadyMapped));

        // After an unmap the same client may map again.
        block.unmap(client).unwrap();
        assert!(block.map(client).is_ok());
    }

    #[test]
    fn test_unmap_without_map_fails() {
        let block = Block::new(SIZE);
        assert_eq!(block.unmap(ClientId::new()), Err(BlockError::NotMapped));
    }

    #[test]
    fn test_operations_require_mapping() {
        let block = Block::new(SIZE);
        let client = ClientId::new();

        assert_eq!(block.write(client, &payload(1)), Err(BlockError::NotMapped));
        assert_eq!(block.update(client), Err(BlockError::NotMapped));
        assert_eq!(block.version(), 0);
    }

    #[test]
    fn test_client_ids_are_never_reused() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(b > a);
        assert!(b.get() > a.get());
        assert_eq!(a.to_string(), format!("client-{}", a.get()));
    }

    // ============================================================
    // VERSION PROTOCOL TESTS
    // ============================================================

    #[test]
    fn test_write_advances_version_and_data() {
        let block = Block::new(SIZE);
        let writer = ClientId::new();
        block.map(writer).unwrap();

        block.write(writer, &payload(0xAA)).unwrap();
        assert_eq!(block.version(), 1);

        // The writer's copy is current after its own write.
        assert_eq!(block.update(writer), Ok(UpdateOutcome::UpToDate));

        let reader = ClientId::new();
        assert_eq!(block.map(reader).unwrap(), payload(0xAA));
    }

    #[test]
    fn test_stale_write_is_rejected_without_side_effects() {
        let block = Block::new(SIZE);
        let a = ClientId::new();
        let b = ClientId::new();
        block.map(a).unwrap();
        block.map(b).unwrap();

        block.write(a, &payload(1)).unwrap();

        assert_eq!(block.write(b, &payload(2)), Err(BlockError::Stale));
        assert_eq!(block.version(), 1);
        assert_eq!(
            block.update(b),
            Ok(UpdateOutcome::Refreshed(payload(1))),
            "data must be untouched by the rejected write"
        );

        // After updating, b may write.
        block.write(b, &payload(2)).unwrap();
        assert_eq!(block.version(), 2);
    }

    #[test]
    fn test_update_refreshes_exactly_once() {
        let block = Block::new(SIZE);
        let a = ClientId::new();
        let b = ClientId::new();
        block.map(a).unwrap();
        block.map(b).unwrap();

        block.write(a, &payload(7)).unwrap();

        assert_eq!(block.update(b), Ok(UpdateOutcome::Refreshed(payload(7))));
        assert_eq!(block.update(b), Ok(UpdateOutcome::UpToDate));
    }

    #[test]
    fn test_version_is_monotonic() {
        let block = Block::new(SIZE);
        let a = ClientId::new();
        let b = ClientId::new();
        block.map(a).unwrap();
        block.map(b).unwrap();

        let mut last = block.version();
        for i in 0..50u8 {
            let who = if i % 3 == 0 { a } else { b };
            let _ = block.write(who, &payload(i));
            let _ = block.update(who);
            if i % 7 == 0 {
                block.unmap(who).unwrap();
                block.map(who).unwrap();
            }
            let now = block.version();
            assert!(now >= last, "version went from {} to {}", last, now);
            last = now;
        }
    }

    #[test]
    fn test_clean_is_idempotent() {
        let block = Block::new(SIZE);
        let client = ClientId::new();
        block.map(client).unwrap();

        assert!(block.clean(client));
        assert!(!block.clean(client));
        assert_eq!(block.mapped_clients(), 0);
    }

    // ============================================================
    // WAIT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_wait_returns_immediately_when_stale() {
        let block = Block::new(SIZE);
        let a = ClientId::new();
        let b = ClientId::new();
        block.map(a).unwrap();
        block.map(b).unwrap();
        block.write(a, &payload(1)).unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(200), block.wait(b))
            .await
            .expect("wait on a stale copy must not block");
        assert_eq!(outcome, Ok(WaitOutcome::Invalidated));
        assert_eq!(block.waiters(), 0);
    }

    #[tokio::test]
    async fn test_wait_unmapped_fails() {
        let block = Block::new(SIZE);
        assert_eq!(
            block.wait(ClientId::new()).await,
            Err(BlockError::NotMapped)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_write_releases_every_waiter() {
        let block = Arc::new(Block::new(SIZE));
        let writer = ClientId::new();
        block.map(writer).unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let waiter = ClientId::new();
            block.map(waiter).unwrap();
            let block = block.clone();
            handles.push(tokio::spawn(async move { block.wait(waiter).await }));
        }

        // Let every waiter park.
        while block.waiters() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for handle in &handles {
            assert!(!handle.is_finished());
        }

        block.write(writer, &payload(9)).unwrap();

        for handle in handles {
            let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("waiter was not released")
                .unwrap();
            assert_eq!(outcome, Ok(WaitOutcome::Invalidated));
        }
        assert_eq!(block.waiters(), 0);
    }

    #[tokio::test]
    async fn test_wait_timeout_expires_without_write() {
        let block = Block::new(SIZE);
        let client = ClientId::new();
        block.map(client).unwrap();

        let outcome = block
            .wait_timeout(client, Duration::from_millis(30))
            .await;
        assert_eq!(outcome, Ok(WaitOutcome::TimedOut));
        assert_eq!(block.waiters(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_timeout_released_by_write() {
        let block = Arc::new(Block::new(SIZE));
        let writer = ClientId::new();
        let waiter = ClientId::new();
        block.map(writer).unwrap();
        block.map(waiter).unwrap();

        let handle = {
            let block = block.clone();
            tokio::spawn(async move { block.wait_timeout(waiter, Duration::from_secs(10)).await })
        };
        while block.waiters() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        block.write(writer, &payload(3)).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(WaitOutcome::Invalidated));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_serialize() {
        // Each writer retries update+write until it lands exactly one write.
        let block = Arc::new(Block::new(SIZE));
        let writers = 8;

        let mut handles = Vec::new();
        for i in 0..writers {
            let block = block.clone();
            handles.push(tokio::spawn(async move {
                let me = ClientId::new();
                block.map(me).unwrap();
                let data: Vec<u8> = (0..SIZE).map(|_| rand::random::<u8>() | 1).collect();
                loop {
                    match block.write(me, &data) {
                        Ok(()) => break,
                        Err(BlockError::Stale) => {
                            let _ = block.update(me);
                            tokio::task::yield_now().await;
                        }
                        Err(e) => panic!("writer {} failed: {}", i, e),
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(block.version(), writers as u64);
    }

    // ============================================================
    // BLOCK STORE TESTS
    // ============================================================

    #[test]
    fn test_store_rejects_inverted_range() {
        assert!(BlockStore::new(10, 5, SIZE).is_err());
        assert!(BlockStore::new(0, 0, 0).is_err());
    }

    #[test]
    fn test_store_owns_inclusive_range() {
        let store = BlockStore::new(5, 9, SIZE).unwrap();

        assert_eq!(store.block_count(), 5);
        assert!(store.owns(5));
        assert!(store.owns(9));
        assert!(!store.owns(4));
        assert!(!store.owns(10));
    }

    #[test]
    fn test_store_unknown_block() {
        let store = BlockStore::new(5, 9, SIZE).unwrap();
        let client = ClientId::new();

        assert_eq!(
            store.map_client(client, 10),
            Err(BlockError::UnknownBlock(10))
        );
        assert_eq!(
            store.unmap_client(client, 4),
            Err(BlockError::UnknownBlock(4))
        );
        assert_eq!(
            store.write_block(client, 100, &payload(0)),
            Err(BlockError::UnknownBlock(100))
        );
        assert!(store.info(4).is_none());
    }

    #[test]
    fn test_store_routes_to_the_right_block() {
        let store = BlockStore::new(5, 9, SIZE).unwrap();
        let client = ClientId::new();

        store.map_client(client, 7).unwrap();
        store.write_block(client, 7, &payload(4)).unwrap();

        assert_eq!(store.info(7).unwrap().version, 1);
        assert_eq!(store.info(6).unwrap().version, 0);
        assert_eq!(store.info(8).unwrap().version, 0);
    }

    #[test]
    fn test_clean_client_removes_every_mapping() {
        let store = BlockStore::new(0, 9, SIZE).unwrap();
        let leaving = ClientId::new();
        let staying = ClientId::new();

        for id in [1, 3, 5] {
            store.map_client(leaving, id).unwrap();
        }
        store.map_client(staying, 3).unwrap();

        assert_eq!(store.clean_client(leaving), 3);
        assert_eq!(store.mappings_of(leaving), 0);
        assert_eq!(store.mappings_of(staying), 1);

        for id in [1, 3, 5] {
            assert_eq!(
                store.write_block(leaving, id, &payload(1)),
                Err(BlockError::NotMapped)
            );
            assert_eq!(store.update_block(leaving, id), Err(BlockError::NotMapped));
            assert_eq!(store.unmap_client(leaving, id), Err(BlockError::NotMapped));
        }
        assert_eq!(store.clean_client(leaving), 0);
    }

    #[tokio::test]
    async fn test_store_wait_after_clean_is_not_mapped() {
        let store = BlockStore::new(0, 3, SIZE).unwrap();
        let client = ClientId::new();
        store.map_client(client, 2).unwrap();
        store.clean_client(client);

        assert_eq!(
            store.wait_block(client, 2).await,
            Err(BlockError::NotMapped)
        );
    }
}
