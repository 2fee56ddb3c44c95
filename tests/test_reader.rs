// tests/test_reader.rs
//
// Buffered reader behaviour against the in-memory store.

mod common;

use std::io::{Read, SeekFrom};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{payload, store, BUCKET};
use s3stream::{ErrorKind, Op, Reader, ReaderConfig};

fn small_buffer(buffer_size: usize) -> ReaderConfig {
    ReaderConfig { buffer_size, ..Default::default() }
}

#[test]
fn random_reads_match_the_object() -> Result<()> {
    let data = payload(7, 10_000);
    let store = store();
    store.put(BUCKET, "blob", data.clone());

    let mut rng = StdRng::seed_from_u64(42);
    for buffer_size in [1, 13, 512, 4096, 20_000] {
        let mut r = Reader::new(store.clone(), BUCKET, "blob", small_buffer(buffer_size))?;
        let mut offset = 0usize;
        while offset < data.len() {
            let n = rng.random_range(1..700);
            let got = r.read(Some(n))?;
            let end = (offset + n).min(data.len());
            assert_eq!(&got[..], &data[offset..end], "buffer_size={buffer_size} offset={offset}");
            offset = end;
            assert_eq!(r.tell(), offset as u64);
        }
        assert!(r.read(Some(10))?.is_empty());
    }
    Ok(())
}

#[test]
fn random_seeks_match_the_object() -> Result<()> {
    let data = payload(11, 3_000);
    let store = store();
    store.put(BUCKET, "blob", data.clone());

    let mut rng = StdRng::seed_from_u64(3);
    let mut r = Reader::new(store, BUCKET, "blob", small_buffer(256))?;
    for _ in 0..50 {
        let start = rng.random_range(0..data.len());
        let n = rng.random_range(1..400);
        assert_eq!(r.seek(SeekFrom::Start(start as u64))?, start as u64);
        let end = (start + n).min(data.len());
        assert_eq!(&r.read(Some(n))?[..], &data[start..end]);
    }
    Ok(())
}

#[test]
fn seek_from_end_reads_the_tail() -> Result<()> {
    let data = payload(1, 100);
    let store = store();
    store.put(BUCKET, "k", data.clone());

    let mut r = Reader::new(store, BUCKET, "k", ReaderConfig::default())?;
    assert_eq!(r.seek(SeekFrom::End(-10))?, 90);
    assert_eq!(&r.read(None)?[..], &data[90..]);
    assert_eq!(r.tell(), 100);
    Ok(())
}

#[test]
fn seek_current_is_relative_to_the_logical_position() -> Result<()> {
    let store = store();
    store.put(BUCKET, "k", &b"abcdefghijklmnopqrstuvwxyz"[..]);

    let mut r = Reader::new(store, BUCKET, "k", small_buffer(16))?;
    assert_eq!(&r.read(Some(3))?[..], b"abc");
    // The buffer already holds more than was handed out.
    assert_eq!(r.seek(SeekFrom::Current(2))?, 5);
    assert_eq!(&r.read(Some(3))?[..], b"fgh");
    assert_eq!(r.seek(SeekFrom::Current(-100))?, 0);
    assert_eq!(&r.read(Some(1))?[..], b"a");
    Ok(())
}

#[test]
fn eof_is_idempotent_and_free() -> Result<()> {
    let store = store();
    store.put(BUCKET, "k", &b"short"[..]);

    let mut r = Reader::new(store.clone(), BUCKET, "k", ReaderConfig::default())?;
    assert_eq!(&r.read(None)?[..], b"short");
    store.reset_calls();
    for _ in 0..3 {
        assert!(r.read(None)?.is_empty());
        assert!(r.read(Some(4))?.is_empty());
    }
    assert_eq!(store.total_calls(), 0);
    Ok(())
}

#[test]
fn deferred_open_makes_no_requests() -> Result<()> {
    let store = store();
    store.put(BUCKET, "k", &b"lazy"[..]);

    let mut r = Reader::new(
        store.clone(),
        BUCKET,
        "k",
        ReaderConfig { defer_seek: true, ..Default::default() },
    )?;
    assert_eq!(store.total_calls(), 0);
    assert_eq!(r.content_length(), None);
    assert_eq!(&r.read(None)?[..], b"lazy");
    assert_eq!(store.calls(Op::Get), 1);
    Ok(())
}

#[test]
fn deferred_open_of_a_missing_key_fails_on_first_read() -> Result<()> {
    let store = store();
    let mut r = Reader::new(
        store,
        BUCKET,
        "missing",
        ReaderConfig { defer_seek: true, ..Default::default() },
    )?;
    let err = r.read(Some(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    Ok(())
}

#[test]
fn eager_open_of_a_missing_key_fails() {
    let store = store();
    let err = Reader::new(store, BUCKET, "missing", ReaderConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.backend_error().and_then(|e| e.code()), Some("NoSuchKey"));
}

#[test]
fn one_dropped_body_is_retried() -> Result<()> {
    let data = payload(5, 1_000);
    let store = store();
    store.put(BUCKET, "k", data.clone());
    store.truncate_next_bodies(1);

    let mut r = Reader::new(store.clone(), BUCKET, "k", ReaderConfig { defer_seek: true, ..Default::default() })?;
    assert_eq!(&r.read(None)?[..], &data[..]);
    assert_eq!(store.calls(Op::Get), 2);
    Ok(())
}

#[test]
fn two_dropped_bodies_fail() -> Result<()> {
    let store = store();
    store.put(BUCKET, "k", payload(6, 1_000));
    store.truncate_next_bodies(2);

    let mut r = Reader::new(store.clone(), BUCKET, "k", ReaderConfig { defer_seek: true, ..Default::default() })?;
    let err = r.read(None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(store.calls(Op::Get), 2);
    Ok(())
}

#[test]
fn lines_spanning_several_fills() -> Result<()> {
    let store = store();
    let text = b"first line is long enough\nsecond\n\nlast without newline";
    store.put(BUCKET, "lines", &text[..]);

    let mut r = Reader::new(store, BUCKET, "lines", small_buffer(4))?;
    assert_eq!(&r.readline(None)?[..], b"first line is long enough\n");
    assert_eq!(&r.readline(None)?[..], b"second\n");
    assert_eq!(&r.readline(None)?[..], b"\n");
    assert_eq!(&r.readline(None)?[..], b"last without newline");
    assert!(r.readline(None)?.is_empty());
    assert_eq!(r.tell(), text.len() as u64);
    Ok(())
}

#[test]
fn multi_byte_terminator_is_not_split() -> Result<()> {
    let store = store();
    store.put(BUCKET, "crlf", &b"abc\r\ndef\r\nghi"[..]);

    let cfg = ReaderConfig {
        buffer_size: 4,
        line_terminator: b"\r\n".to_vec(),
        ..Default::default()
    };
    let mut r = Reader::new(store, BUCKET, "crlf", cfg)?;
    assert_eq!(&r.readline(None)?[..], b"abc\r\n");
    assert_eq!(&r.readline(None)?[..], b"def\r\n");
    assert_eq!(&r.readline(None)?[..], b"ghi");
    Ok(())
}

#[test]
fn long_line_with_terminator_straddling_fills() -> Result<()> {
    let store = store();
    let mut text = vec![b'x'; 100_000];
    text.extend_from_slice(b"\r\nshort\r\n");
    store.put(BUCKET, "long", text);

    for buffer_size in [3, 4, 7] {
        let cfg = ReaderConfig {
            buffer_size,
            line_terminator: b"\r\n".to_vec(),
            ..Default::default()
        };
        let mut r = Reader::new(store.clone(), BUCKET, "long", cfg)?;
        let line = r.readline(None)?;
        assert_eq!(line.len(), 100_002, "buffer_size={buffer_size}");
        assert!(line.ends_with(b"\r\n"));
        assert_eq!(&r.readline(None)?[..], b"short\r\n");
        assert!(r.readline(None)?.is_empty());
    }
    Ok(())
}

#[test]
fn readline_with_a_limit_is_unsupported() -> Result<()> {
    let store = store();
    store.put(BUCKET, "k", &b"a\nb\n"[..]);
    let mut r = Reader::new(store, BUCKET, "k", ReaderConfig::default())?;
    assert_eq!(r.readline(Some(1)).unwrap_err().kind(), ErrorKind::Unsupported);
    assert_eq!(r.truncate(None).unwrap_err().kind(), ErrorKind::Unsupported);
    assert_eq!(r.detach().unwrap_err().kind(), ErrorKind::Unsupported);
    Ok(())
}

#[test]
fn reads_a_specific_version() -> Result<()> {
    let store = store();
    let v1 = store.put(BUCKET, "k", &b"old contents"[..]);
    store.put(BUCKET, "k", &b"new"[..]);

    let mut r = Reader::new(
        store.clone(),
        BUCKET,
        "k",
        ReaderConfig { version_id: Some(v1.clone()), ..Default::default() },
    )?;
    assert_eq!(r.version_id(), Some(v1.as_str()));
    assert_eq!(&r.read(None)?[..], b"old contents");

    let mut latest = Reader::new(store.clone(), BUCKET, "k", ReaderConfig::default())?;
    assert_eq!(&latest.read(None)?[..], b"new");

    let err = Reader::new(
        store,
        BUCKET,
        "k",
        ReaderConfig { version_id: Some("v999".into()), ..Default::default() },
    )
    .unwrap_err();
    assert_eq!(err.backend_error().and_then(|e| e.code()), Some("NoSuchVersion"));
    Ok(())
}

#[test]
fn std_read_trait_drains_the_object() -> Result<()> {
    let data = payload(9, 70_000);
    let store = store();
    store.put(BUCKET, "k", data.clone());

    let mut r = Reader::new(store, BUCKET, "k", small_buffer(1024))?;
    let mut out = Vec::new();
    r.read_to_end(&mut out)?;
    assert_eq!(out, data);
    Ok(())
}

#[test]
fn empty_object_reads_as_empty() -> Result<()> {
    let store = store();
    store.put(BUCKET, "empty", Vec::<u8>::new());
    let mut r = Reader::new(store, BUCKET, "empty", ReaderConfig::default())?;
    assert_eq!(r.content_length(), Some(0));
    assert!(r.read(None)?.is_empty());
    assert!(r.readline(None)?.is_empty());
    Ok(())
}
