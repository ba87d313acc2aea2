use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use pcscspy_core::{LineSource, SourceError, TokenSource, VERSION_LINE};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

#[test]
fn line_source_reads_fixture_to_end() {
    let path = repo_root()
        .join("tests")
        .join("golden")
        .join("release_context")
        .join("input.trace");
    let mut source = LineSource::open(&path).unwrap();

    assert_eq!(source.next_token().unwrap(), VERSION_LINE);
    let mut lines = 1;
    loop {
        match source.next_token() {
            Ok(_) => lines += 1,
            Err(err) => {
                assert!(err.is_end_of_stream());
                break;
            }
        }
    }

    assert_eq!(lines, 4);
    assert_eq!(source.position(), 4);
}

#[test]
fn line_source_rejects_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = match LineSource::open(&dir.path().join("absent.trace")) {
        Ok(_) => panic!("expected missing file to be rejected"),
        Err(err) => err,
    };

    assert!(matches!(err, SourceError::Io(_)));
}

#[test]
fn line_source_keeps_partial_last_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.trace");
    fs::write(&path, "PCSC SPY VERSION: 1\r\n>|1|2|SCardCancel").unwrap();

    let mut source = LineSource::open(&path).unwrap();
    assert_eq!(source.next_token().unwrap(), VERSION_LINE);
    assert_eq!(source.next_token().unwrap(), ">|1|2|SCardCancel");
    assert!(source.next_token().unwrap_err().is_end_of_stream());
}

#[test]
fn line_source_replaces_invalid_utf8() {
    let mut source = LineSource::new(Cursor::new(b"ab\xffcd\n".to_vec()));
    assert_eq!(source.next_token().unwrap(), "ab\u{fffd}cd");
}
