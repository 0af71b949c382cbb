//! End-to-end behaviour of the engine through its public API.

use blockfs_core::{
    BlockfsError, ConfigError, Engine, EngineConfig, EngineStats, ErrorCode, Fd, BLOCK_SIZE,
    MAX_FILE_SIZE,
};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Bytes written through one descriptor come back unchanged through another
#[test]
fn test_round_trip() {
    let mut engine = Engine::new();
    let data = pattern(1500);

    let w = engine.open("data", true).unwrap();
    assert_eq!(engine.write(w, &data).unwrap(), data.len());

    let r = engine.open("data", false).unwrap();
    assert_eq!(engine.read(r, data.len()).unwrap(), data);
}

/// Two descriptors on one name see the same bytes with independent cursors
#[test]
fn test_shared_file_independent_cursors() {
    let mut engine = Engine::new();
    let a = engine.open("f", true).unwrap();
    let b = engine.open("f", false).unwrap();

    engine.write(a, b"abcdef").unwrap();
    assert_eq!(engine.tell(a).unwrap(), 6);
    assert_eq!(engine.tell(b).unwrap(), 0);

    assert_eq!(engine.read(b, 3).unwrap(), b"abc");
    assert_eq!(engine.tell(b).unwrap(), 3);

    // b overwrites in place from its own cursor
    engine.write(b, b"XY").unwrap();
    let c = engine.open("f", false).unwrap();
    assert_eq!(engine.read(c, 10).unwrap(), b"abcXYf");

    // a keeps appending where it left off
    engine.write(a, b"gh").unwrap();
    assert_eq!(engine.read(c, 10).unwrap(), b"gh");
}

/// Delete with open descriptors defers destruction until the last close
#[test]
fn test_deferred_deletion() {
    let mut engine = Engine::new();
    let a = engine.open("f", true).unwrap();
    let b = engine.open("f", false).unwrap();
    engine.write(a, b"payload").unwrap();

    engine.delete("f").unwrap();

    assert_eq!(
        engine.open("f", false).unwrap_err(),
        BlockfsError::NoSuchFile("f".to_string())
    );
    assert!(!engine.exists("f"));

    assert_eq!(engine.read(b, 7).unwrap(), b"payload");
    assert_eq!(engine.write(a, b"!").unwrap(), 1);
    assert_eq!(engine.file_size(b).unwrap(), 8);

    engine.close(a).unwrap();
    assert_eq!(engine.stats().tombstoned_files, 1);
    assert_eq!(engine.read(b, 10).unwrap(), b"!");

    engine.close(b).unwrap();
    let stats = engine.stats();
    assert_eq!(stats.tombstoned_files, 0);
    assert_eq!(stats.blocks, 0);
    assert_eq!(stats.bytes_stored, 0);
}

/// A deleted name can be recreated without disturbing the old file's readers
#[test]
fn test_recreate_after_delete() {
    let mut engine = Engine::new();
    let old = engine.open("f", true).unwrap();
    engine.write(old, b"old").unwrap();
    engine.delete("f").unwrap();

    let new = engine.open("f", true).unwrap();
    engine.write(new, b"brand new").unwrap();

    let old_reader = old;
    let fresh_reader = engine.open("f", false).unwrap();
    assert_eq!(engine.file_size(old_reader).unwrap(), 3);
    assert_eq!(engine.read(fresh_reader, 64).unwrap(), b"brand new");
}

/// Delete of a name that does not resolve is an error, twice included
#[test]
fn test_delete_missing() {
    let mut engine = Engine::new();
    assert!(matches!(engine.delete("x"), Err(BlockfsError::NoSuchFile(_))));

    engine.open("x", true).unwrap();
    engine.delete("x").unwrap();
    assert!(matches!(engine.delete("x"), Err(BlockfsError::NoSuchFile(_))));
    assert_eq!(engine.last_error(), ErrorCode::NoSuchFile);
}

/// Closing handle k hands k back out on the next open
#[test]
fn test_descriptor_reuse() {
    let mut engine = Engine::new();
    let fds: Vec<Fd> = (0..5)
        .map(|i| engine.open(&format!("f{i}"), true).unwrap())
        .collect();
    assert_eq!(fds, vec![Fd(0), Fd(1), Fd(2), Fd(3), Fd(4)]);

    engine.close(Fd(3)).unwrap();
    engine.close(Fd(1)).unwrap();

    assert_eq!(engine.open("other", true).unwrap(), Fd(1));
    assert_eq!(engine.open("other", false).unwrap(), Fd(3));
    assert_eq!(engine.open("other", false).unwrap(), Fd(5));
}

/// 600 bytes in 512-byte blocks lands as 512 + 88
#[test]
fn test_block_boundary() {
    let mut engine = Engine::new();
    let data = pattern(600);
    let fd = engine.open("f", true).unwrap();

    engine.write(fd, &data).unwrap();

    assert_eq!(engine.block_layout("f"), Some(vec![BLOCK_SIZE, 88]));
    let reader = engine.open("f", false).unwrap();
    assert_eq!(engine.read(reader, 600).unwrap(), data);
}

/// Appending in small pieces fills blocks in order without gaps
#[test]
fn test_incremental_appends() {
    let mut engine = Engine::new();
    let fd = engine.open("f", true).unwrap();
    let data = pattern(2000);

    for chunk in data.chunks(37) {
        assert_eq!(engine.write(fd, chunk).unwrap(), chunk.len());
    }

    assert_eq!(engine.block_layout("f"), Some(vec![512, 512, 512, 464]));
    let reader = engine.open("f", false).unwrap();
    let mut back = Vec::new();
    loop {
        let piece = engine.read(reader, 100).unwrap();
        if piece.is_empty() {
            break;
        }
        back.extend_from_slice(&piece);
    }
    assert_eq!(back, data);
}

/// At the real 100 MiB limit the overflowing write is cut short, then refused
#[test]
fn test_size_limit() {
    let mut engine = Engine::new();
    let fd = engine.open("big", true).unwrap();

    let head = vec![0xA5u8; MAX_FILE_SIZE - 10];
    assert_eq!(engine.write(fd, &head).unwrap(), head.len());

    assert_eq!(engine.write(fd, &[1u8; 11]).unwrap(), 10);
    assert_eq!(engine.file_size(fd).unwrap(), MAX_FILE_SIZE);

    assert_eq!(
        engine.write(fd, b"more").unwrap_err(),
        BlockfsError::SizeLimitExceeded {
            limit: MAX_FILE_SIZE
        }
    );
    assert_eq!(engine.last_error(), ErrorCode::SizeLimitExceeded);

    engine.destroy_all();
}

/// Reads at or past end of file return nothing rather than failing
#[test]
fn test_read_at_eof() {
    let mut engine = Engine::new();
    let fd = engine.open("f", true).unwrap();
    assert!(engine.read(fd, 10).unwrap().is_empty());

    engine.write(fd, b"abc").unwrap();
    assert!(engine.read(fd, 10).unwrap().is_empty());
    assert_eq!(engine.last_error(), ErrorCode::NoError);
}

/// destroy_all invalidates everything and may be repeated
#[test]
fn test_destroy_all_twice() {
    let mut engine = Engine::new();
    let a = engine.open("a", true).unwrap();
    engine.write(a, &pattern(3000)).unwrap();
    engine.open("b", true).unwrap();
    engine.delete("a").unwrap();

    engine.destroy_all();
    engine.destroy_all();

    assert_eq!(engine.stats(), EngineStats::default());
    assert_eq!(engine.read(a, 1).unwrap_err(), BlockfsError::InvalidDescriptor(a));
    assert!(matches!(engine.open("b", false), Err(BlockfsError::NoSuchFile(_))));

    // still usable afterwards
    let fd = engine.open("c", true).unwrap();
    assert_eq!(fd, Fd(0));
    assert_eq!(engine.write(fd, b"ok").unwrap(), 2);
}

/// Engines are independent of each other
#[test]
fn test_instances_are_isolated() {
    let mut one = Engine::new();
    let mut two = Engine::new();

    one.open("shared-name", true).unwrap();

    assert!(two.open("shared-name", false).is_err());
    assert_eq!(two.open("shared-name", true).unwrap(), Fd(0));
    assert_eq!(one.file_names(), vec!["shared-name"]);
}

/// Custom geometry flows from the config into the block chains
#[test]
fn test_custom_block_size() {
    let mut engine = Engine::with_config(EngineConfig {
        block_size: 16,
        max_file_size: 64,
        ..EngineConfig::default()
    })
    .unwrap();
    let fd = engine.open("f", true).unwrap();

    assert_eq!(engine.write(fd, &pattern(100)).unwrap(), 64);
    assert_eq!(engine.block_layout("f"), Some(vec![16, 16, 16, 16]));
}

/// Geometry that could never hold a byte is refused up front
#[test]
fn test_invalid_geometry_is_rejected() {
    let zero_block = EngineConfig {
        block_size: 0,
        max_file_size: 1024,
        max_blocks: Some(100_000),
        ..EngineConfig::default()
    };
    assert!(matches!(
        Engine::with_config(zero_block),
        Err(ConfigError::Invalid(_))
    ));

    let under_one_block = EngineConfig {
        block_size: 1024,
        max_file_size: 1000,
        ..EngineConfig::default()
    };
    assert!(matches!(
        Engine::with_config(under_one_block),
        Err(ConfigError::Invalid(_))
    ));
}

/// Stats serialize for tooling
#[test]
fn test_stats_serialize() {
    let mut engine = Engine::new();
    let fd = engine.open("f", true).unwrap();
    engine.write(fd, b"abc").unwrap();

    let json = serde_json::to_value(engine.stats()).unwrap();
    assert_eq!(json["live_files"], 1);
    assert_eq!(json["blocks"], 1);
    assert_eq!(json["bytes_stored"], 3);
}
