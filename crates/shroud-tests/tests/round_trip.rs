//! Whole-item round trips through the engine.

use std::sync::Arc;

use shroud_encrypt::{
    decrypt_bytes, encrypt_bytes, CompressionKind, CompressionMode, EncryptorConfig,
    SelfEncryptor, MAX_CHUNKS, MIN_CHUNKS,
};
use shroud_store::MemoryChunkStore;
use shroud_tests::{random_bytes, small_config};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("shroud_encrypt=debug,shroud_tests=debug")
        .with_test_writer()
        .try_init();
}

fn round_trip(data: &[u8]) {
    let store = Arc::new(MemoryChunkStore::new());
    let map = encrypt_bytes(store.clone(), small_config(), data).unwrap();

    assert_eq!(map.total_size, data.len() as u64);
    if !map.is_inline() {
        assert!((MIN_CHUNKS..=MAX_CHUNKS).contains(&map.chunks.len()));
        let sum: u64 = map.chunks.iter().map(|c| c.pre_size as u64).sum();
        assert_eq!(sum, data.len() as u64);
        assert!(store.len() <= map.chunks.len());
    }
    assert_eq!(decrypt_bytes(store, &map).unwrap(), data);
}

#[test]
fn test_boundary_sizes() {
    init_tracing();
    let avg = small_config().chunk_size as usize;
    for size in [0, 1, 64, 65, 3 * avg - 1, 3 * avg, 40 * avg + 1] {
        round_trip(&random_bytes(size as u64, size));
    }
}

#[test]
fn test_tiny_items_are_inline() {
    let store = Arc::new(MemoryChunkStore::new());
    let map = encrypt_bytes(store.clone(), small_config(), b"four").unwrap();
    assert!(map.is_inline());
    assert_eq!(map.content.as_deref(), Some(&b"four"[..]));
    assert!(store.is_empty());

    let map = encrypt_bytes(store.clone(), small_config(), b"").unwrap();
    assert!(map.is_empty());
    assert_eq!(decrypt_bytes(store, &map).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_large_item_uses_max_chunks() {
    let avg = small_config().chunk_size as usize;
    let data = random_bytes(9, 50 * avg);
    let store = Arc::new(MemoryChunkStore::new());
    let map = encrypt_bytes(store.clone(), small_config(), &data).unwrap();
    assert_eq!(map.chunks.len(), MAX_CHUNKS);
    assert_eq!(decrypt_bytes(store, &map).unwrap(), data);
}

#[test]
fn test_same_content_same_chunks() {
    let data = random_bytes(3, 12_345);
    let store = Arc::new(MemoryChunkStore::new());
    let first = encrypt_bytes(store.clone(), small_config(), &data).unwrap();
    let stored = store.len();
    let second = encrypt_bytes(store.clone(), small_config(), &data).unwrap();

    assert_eq!(first, second);
    // Nothing new was written the second time
    assert_eq!(store.len(), stored);
    assert_eq!(store.stats().chunks_stored, stored as u64);
}

#[test]
fn test_one_byte_change_changes_neighbours() {
    let data = random_bytes(4, 6000);
    let mut changed = data.clone();
    changed[0] ^= 1;

    let store = Arc::new(MemoryChunkStore::new());
    let a = encrypt_bytes(store.clone(), small_config(), &data).unwrap();
    let b = encrypt_bytes(store, small_config(), &changed).unwrap();
    // Chunk 0's pre-hash keys the last two chunks; the seed moves every boundary
    assert_ne!(a.chunks[0].hash, b.chunks[0].hash);
    assert_ne!(a.chunks[a.chunks.len() - 1].hash, b.chunks[b.chunks.len() - 1].hash);
}

#[test]
fn test_compressed_round_trip() {
    let text = b"all work and no play makes a dull chunk. ".repeat(400);
    let config = EncryptorConfig {
        compression: CompressionMode::Always,
        ..small_config()
    };
    let store = Arc::new(MemoryChunkStore::new());
    let map = encrypt_bytes(store.clone(), config, &text).unwrap();

    assert_eq!(map.encoding_flags.compression, CompressionKind::Zstd);
    assert!(store.total_bytes() < text.len() as u64 / 2);
    assert_eq!(decrypt_bytes(store, &map).unwrap(), text);
}

#[test]
fn test_blake3_round_trip() {
    let config = EncryptorConfig {
        hash_kind: shroud_core::HashKind::Blake3,
        ..small_config()
    };
    let data = random_bytes(5, 7000);
    let store = Arc::new(MemoryChunkStore::new());
    let map = encrypt_bytes(store.clone(), config, &data).unwrap();
    assert_eq!(map.encoding_flags.hash, shroud_core::HashKind::Blake3);
    assert_eq!(decrypt_bytes(store, &map).unwrap(), data);
}

#[test]
fn test_default_config_sizes() {
    let store = Arc::new(MemoryChunkStore::new());
    let data = random_bytes(6, 1025);
    let map = encrypt_bytes(store.clone(), EncryptorConfig::default(), &data).unwrap();
    assert_eq!(map.chunks.len(), 3);
    assert_eq!(decrypt_bytes(store.clone(), &map).unwrap(), data);

    let map = encrypt_bytes(store, EncryptorConfig::default(), &data[..1024]).unwrap();
    assert!(map.is_inline());
}

#[test]
fn test_streamed_writes_match_one_shot() {
    let data = random_bytes(7, 30_000);
    let store = Arc::new(MemoryChunkStore::new());
    let one_shot = encrypt_bytes(store.clone(), small_config(), &data).unwrap();

    let encryptor = SelfEncryptor::new(store, small_config()).unwrap();
    for (i, piece) in data.chunks(777).enumerate() {
        encryptor.write((i * 777) as u64, piece).unwrap();
    }
    assert_eq!(encryptor.into_data_map().unwrap(), one_shot);
}
