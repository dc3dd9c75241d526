//! Writes and reads at arbitrary offsets.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shroud_encrypt::{encrypt_bytes, SelfEncryptor};
use shroud_store::MemoryChunkStore;
use shroud_tests::{random_bytes, small_config};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("shroud_encrypt=debug")
        .with_test_writer()
        .try_init();
}

#[test]
fn test_shuffled_writes_equal_sequential() {
    init_tracing();
    let data = random_bytes(11, 25_000);
    let store = Arc::new(MemoryChunkStore::new());
    let expected = encrypt_bytes(store.clone(), small_config(), &data).unwrap();

    for seed in 0..4u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pieces: Vec<(usize, usize)> = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let len = rng.gen_range(1..=3000).min(data.len() - offset);
            pieces.push((offset, len));
            offset += len;
        }
        pieces.shuffle(&mut rng);

        let encryptor = SelfEncryptor::new(store.clone(), small_config()).unwrap();
        for (i, (offset, len)) in pieces.iter().enumerate() {
            encryptor.write(*offset as u64, &data[*offset..offset + len]).unwrap();
            if i % 3 == 0 {
                // Written bytes are readable before any flush
                let back = encryptor.read(*offset as u64, *len).unwrap();
                assert_eq!(back, &data[*offset..offset + len]);
            }
        }
        assert_eq!(encryptor.size(), data.len() as u64);
        assert_eq!(encryptor.read(0, data.len()).unwrap(), data);
        assert_eq!(encryptor.into_data_map().unwrap(), expected, "seed {seed}");
    }
}

#[test]
fn test_overlapping_writes_match_model() {
    let store = Arc::new(MemoryChunkStore::new());
    let encryptor = SelfEncryptor::new(store, small_config()).unwrap();
    let mut model: Vec<u8> = Vec::new();
    let mut rng = StdRng::seed_from_u64(42);

    for step in 0..200 {
        let position = rng.gen_range(0..30_000usize);
        let len = rng.gen_range(1..2_000usize);
        let bytes = random_bytes(step, len);
        encryptor.write(position as u64, &bytes).unwrap();

        if model.len() < position + len {
            model.resize(position + len, 0);
        }
        model[position..position + len].copy_from_slice(&bytes);

        if step % 25 == 0 {
            encryptor.flush().unwrap();
        }
        if step % 10 == 0 {
            let at = rng.gen_range(0..model.len());
            let n = rng.gen_range(0..=(model.len() - at).min(4096));
            assert_eq!(encryptor.read(at as u64, n).unwrap(), &model[at..at + n]);
        }
    }

    assert_eq!(encryptor.read(0, model.len()).unwrap(), model);
    encryptor.flush().unwrap();
    assert_eq!(encryptor.read(0, model.len()).unwrap(), model);
}

#[test]
fn test_reopen_and_overwrite_middle() {
    let store = Arc::new(MemoryChunkStore::new());
    let mut data = random_bytes(21, 20_000);
    let map = encrypt_bytes(store.clone(), small_config(), &data).unwrap();

    let encryptor = SelfEncryptor::open(store.clone(), map, small_config()).unwrap();
    let patch = random_bytes(22, 1500);
    encryptor.write(9_000, &patch).unwrap();
    data[9_000..10_500].copy_from_slice(&patch);
    let map = encryptor.into_data_map().unwrap();

    let reader = SelfEncryptor::open(store, map, small_config()).unwrap();
    assert_eq!(reader.read(0, data.len()).unwrap(), data);
}

#[test]
fn test_append_after_reopen() {
    let store = Arc::new(MemoryChunkStore::new());
    let mut data = random_bytes(31, 5_000);
    let map = encrypt_bytes(store.clone(), small_config(), &data).unwrap();

    let encryptor = SelfEncryptor::open(store.clone(), map, small_config()).unwrap();
    let more = random_bytes(32, 4_000);
    encryptor.write(data.len() as u64, &more).unwrap();
    data.extend_from_slice(&more);
    assert_eq!(encryptor.size(), 9_000);
    assert_eq!(encryptor.read(4_000, 2_000).unwrap(), &data[4_000..6_000]);

    let map = encryptor.into_data_map().unwrap();
    assert_eq!(map.total_size, 9_000);
    let reader = SelfEncryptor::open(store, map, small_config()).unwrap();
    assert_eq!(reader.read(0, 9_000).unwrap(), data);
}

#[test]
fn test_concurrent_readers() {
    let store = Arc::new(MemoryChunkStore::new());
    let data = Arc::new(random_bytes(41, 16_000));
    let map = encrypt_bytes(store.clone(), small_config(), &data).unwrap();
    let encryptor = Arc::new(SelfEncryptor::open(store, map, small_config()).unwrap());

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let encryptor = Arc::clone(&encryptor);
            let data = Arc::clone(&data);
            std::thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t);
                for _ in 0..50 {
                    let at = rng.gen_range(0..data.len());
                    let n = rng.gen_range(0..=(data.len() - at).min(3000));
                    assert_eq!(encryptor.read(at as u64, n).unwrap(), &data[at..at + n]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(encryptor.cache_stats().hits > 0);
}
