//! The engine over the RocksDB chunk store.

use std::sync::Arc;

use shroud_encrypt::{decrypt_bytes, encrypt_bytes, SelfEncryptor};
use shroud_store::{ChunkStore, RocksChunkStore, StoreConfig, StoreError};
use shroud_tests::{random_bytes, small_config};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("shroud_store=debug,shroud_encrypt=debug")
        .with_test_writer()
        .try_init();
}

#[test]
fn test_item_survives_reopen() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(dir.path().to_path_buf());
    let data = random_bytes(1, 30_000);

    let map = {
        let store = Arc::new(RocksChunkStore::open_config(&config).unwrap());
        let map = encrypt_bytes(store.clone(), small_config(), &data).unwrap();
        assert_eq!(store.list_chunks().unwrap().len(), map.chunks.len());
        assert_eq!(
            store.total_size().unwrap(),
            map.chunks.iter().map(|c| c.size as u64).sum::<u64>()
        );
        map
    };

    let store = Arc::new(RocksChunkStore::open_config(&config).unwrap());
    assert_eq!(decrypt_bytes(store, &map).unwrap(), data);
}

#[test]
fn test_missing_chunk_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksChunkStore::open(dir.path()).unwrap());
    let map = encrypt_bytes(store.clone(), small_config(), &random_bytes(2, 5_000)).unwrap();

    store.delete(&map.chunks[1].hash).unwrap();
    let err = decrypt_bytes(store, &map).unwrap_err();
    assert!(matches!(
        err,
        shroud_encrypt::EncryptError::Io(StoreError::NotFound(_))
    ));
}

#[test]
fn test_delete_all_chunks_empties_store() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksChunkStore::open(dir.path()).unwrap());
    let map = encrypt_bytes(store.clone(), small_config(), &random_bytes(3, 9_000)).unwrap();
    let count = map.chunks.len();
    assert_eq!(store.list_chunks().unwrap().len(), count);

    let encryptor = SelfEncryptor::open(store.clone(), map, small_config()).unwrap();
    encryptor.delete_all_chunks().unwrap();
    assert!(store.list_chunks().unwrap().is_empty());
    assert_eq!(store.stats().deletes, count as u64);
    assert!(encryptor.data_map().is_empty());
}
