//! Tests for whole-file transfer and its fallback path.

use super::*;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::os::fd::{FromRawFd, OwnedFd};
use tempfile::{NamedTempFile, tempdir};

/// Helper to create a temp file with specified content, positioned at its end
fn create_temp_file(content: &[u8]) -> io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content)?;
    file.flush()?;
    Ok(file)
}

fn patterned(size: usize) -> Vec<u8> {
    (0..size).map(|i| ((i * 7 + 13) % 256) as u8).collect()
}

fn reopen(file: &NamedTempFile) -> File {
    File::open(file.path()).unwrap()
}

#[test]
fn small_file_copies_whole_contents() {
    let content = b"manage.json payload for a small bundle";
    let source = create_temp_file(content).unwrap();
    let dir = tempdir().unwrap();
    let dest_path = dir.path().join("out");
    let dest = File::create(&dest_path).unwrap();

    let sent = send_whole_file(dest, reopen(&source)).unwrap();

    assert_eq!(sent, content.len() as u64);
    assert_eq!(std::fs::read(&dest_path).unwrap(), content);
}

#[test]
fn large_file_copies_whole_contents() {
    let content = patterned(512 * 1024 + 17);
    let source = create_temp_file(&content).unwrap();
    let dir = tempdir().unwrap();
    let dest_path = dir.path().join("out");
    let dest = File::create(&dest_path).unwrap();

    let sent = send_whole_file(dest, reopen(&source)).unwrap();

    assert_eq!(sent, content.len() as u64);
    assert_eq!(std::fs::read(&dest_path).unwrap(), content);
}

#[test]
fn source_position_is_ignored() {
    let content = patterned(4096);
    let mut source = create_temp_file(&content).unwrap();
    source.seek(SeekFrom::Start(1000)).unwrap();
    let dir = tempdir().unwrap();
    let dest_path = dir.path().join("out");

    let source_file = source.as_file().try_clone().unwrap();
    send_whole_file(File::create(&dest_path).unwrap(), source_file).unwrap();

    assert_eq!(std::fs::read(&dest_path).unwrap(), content);
}

#[test]
fn destination_is_truncated_to_source_length() {
    let dir = tempdir().unwrap();
    let dest_path = dir.path().join("out");
    std::fs::write(&dest_path, vec![b'x'; 200 * 1024]).unwrap();
    let content = b"shorter";
    let source = create_temp_file(content).unwrap();

    let dest = OpenOptions::new().read(true).write(true).open(&dest_path).unwrap();
    send_whole_file(dest, reopen(&source)).unwrap();

    assert_eq!(std::fs::read(&dest_path).unwrap(), content);
}

#[test]
fn empty_source_empties_destination() {
    let dir = tempdir().unwrap();
    let dest_path = dir.path().join("out");
    std::fs::write(&dest_path, b"stale").unwrap();
    let source = create_temp_file(b"").unwrap();

    let dest = OpenOptions::new().write(true).open(&dest_path).unwrap();
    let sent = send_whole_file(dest, reopen(&source)).unwrap();

    assert_eq!(sent, 0);
    assert!(std::fs::read(&dest_path).unwrap().is_empty());
}

#[test]
fn read_only_destination_fails() {
    let source = create_temp_file(b"payload").unwrap();
    let other = create_temp_file(b"").unwrap();

    let err = send_whole_file(reopen(&other), reopen(&source)).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EBADF));
}

#[test]
fn pipe_destination_receives_data() {
    let content = patterned(32 * 1024);
    let source = create_temp_file(&content).unwrap();

    let mut pipe_fds = [0i32; 2];
    // SAFETY: pipe_fds is a valid two-element array for pipe(2) to fill.
    let result = unsafe { libc::pipe(pipe_fds.as_mut_ptr()) };
    assert_eq!(result, 0, "Failed to create pipe");
    // SAFETY: pipe(2) succeeded, so both descriptors are open and unowned.
    let (read_end, write_end) = unsafe {
        (
            File::from(OwnedFd::from_raw_fd(pipe_fds[0])),
            File::from(OwnedFd::from_raw_fd(pipe_fds[1])),
        )
    };

    let reader = std::thread::spawn(move || {
        let mut received = Vec::new();
        let mut read_end = read_end;
        read_end.read_to_end(&mut received).unwrap();
        received
    });

    let sent = send_whole_file(write_end, reopen(&source)).unwrap();
    let received = reader.join().unwrap();

    assert_eq!(sent, content.len() as u64);
    assert_eq!(received, content);
}

#[test]
fn pipe_source_is_copied_to_end_of_stream() {
    let mut pipe_fds = [0i32; 2];
    // SAFETY: pipe_fds is a valid two-element array for pipe(2) to fill.
    let result = unsafe { libc::pipe(pipe_fds.as_mut_ptr()) };
    assert_eq!(result, 0, "Failed to create pipe");
    // SAFETY: pipe(2) succeeded, so both descriptors are open and unowned.
    let (read_end, mut write_end) = unsafe {
        (
            File::from(OwnedFd::from_raw_fd(pipe_fds[0])),
            File::from(OwnedFd::from_raw_fd(pipe_fds[1])),
        )
    };
    write_end.write_all(b"payload-bytes").unwrap();
    drop(write_end);

    let dir = tempdir().unwrap();
    let dest_path = dir.path().join("out");
    std::fs::write(&dest_path, b"stale contents that are longer").unwrap();
    let dest = OpenOptions::new().write(true).open(&dest_path).unwrap();

    let sent = send_whole_file(dest, read_end).unwrap();

    assert_eq!(sent, 13);
    assert_eq!(std::fs::read(&dest_path).unwrap(), b"payload-bytes");
}
