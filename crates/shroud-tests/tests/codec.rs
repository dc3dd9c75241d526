//! Data map serialization and encryption across crates.

use std::sync::Arc;

use shroud_encrypt::{
    decrypt_bytes, encrypt_bytes, DataMap, DataMapCodec, EncryptError, EncodingFlags,
};
use shroud_store::MemoryChunkStore;
use shroud_tests::{random_bytes, small_config};

#[test]
fn test_sealed_map_opens_item() {
    let store = Arc::new(MemoryChunkStore::new());
    let data = random_bytes(1, 12_000);
    let map = encrypt_bytes(store.clone(), small_config(), &data).unwrap();

    let sealed = DataMapCodec::encrypt(b"directory-id", b"file-id", &map).unwrap();
    let opened = DataMapCodec::decrypt(b"directory-id", b"file-id", &sealed).unwrap();
    assert_eq!(opened, map);
    assert_eq!(decrypt_bytes(store, &opened).unwrap(), data);
}

#[test]
fn test_swapped_ids_do_not_open() {
    let map = DataMap::inline(b"tiny".to_vec(), EncodingFlags::default());
    let sealed = DataMapCodec::encrypt(b"A", b"B", &map).unwrap();
    assert!(matches!(
        DataMapCodec::decrypt(b"B", b"A", &sealed),
        Err(EncryptError::BadDataMap(_))
    ));
    assert!(matches!(
        DataMapCodec::decrypt(b"A", b"C", &sealed),
        Err(EncryptError::BadDataMap(_))
    ));
}

#[test]
fn test_sealed_map_hides_chunk_names() {
    let store = Arc::new(MemoryChunkStore::new());
    let map = encrypt_bytes(store, small_config(), &random_bytes(2, 8_000)).unwrap();
    let sealed = DataMapCodec::encrypt(b"p", b"c", &map).unwrap();
    let name = map.chunks[0].hash;
    assert!(!sealed
        .windows(name.as_bytes().len())
        .any(|w| w == name.as_bytes()));
}

#[test]
fn test_serialized_map_rejects_garbage() {
    let map = DataMap::inline(b"abc".to_vec(), EncodingFlags::default());
    let mut bytes = map.serialize();
    bytes.push(0);
    assert!(matches!(
        DataMap::deserialize(&bytes),
        Err(EncryptError::BadDataMap(_))
    ));

    let mut bytes = map.serialize();
    bytes[0] = 2;
    assert!(matches!(
        DataMap::deserialize(&bytes),
        Err(EncryptError::VersionMismatch(_))
    ));
}

#[test]
fn test_serialized_map_fixture() {
    let map = DataMap::inline(vec![0x01, 0x02], EncodingFlags::default());
    assert_eq!(
        hex::encode(map.serialize()),
        "01000000\
         00000000\
         01110000\
         0200000000000000\
         01\
         02000000\
         0102"
    );
}
