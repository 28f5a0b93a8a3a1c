//! Positioned reads on shared file handles.
//!
//! Segment data is fetched with one read of a known byte range. Reads never
//! move a shared cursor, so a single open [`File`] serves every concurrent
//! loader of the same file.

use std::fs::File;
use std::io;

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Fill `buf` from `file` starting at `offset`.
///
/// Fails with [`io::ErrorKind::UnexpectedEof`] when the file ends first.
pub fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match read_at(file, buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended {} bytes short at offset {offset}", buf.len()),
                ))
            }
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read `len` bytes at `offset` into a new buffer.
pub fn read_range(file: &File, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_exact_at(file, &mut buf, offset)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(contents: &[u8]) -> File {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(contents).unwrap();
        f
    }

    #[test]
    fn reads_range_without_cursor() {
        let f = temp_file(b"0123456789");
        assert_eq!(read_range(&f, 3, 4).unwrap(), b"3456");
        assert_eq!(read_range(&f, 0, 2).unwrap(), b"01");
    }

    #[test]
    fn short_file_is_unexpected_eof() {
        let f = temp_file(b"abc");
        let err = read_range(&f, 1, 5).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn empty_read() {
        let f = temp_file(b"");
        assert!(read_range(&f, 0, 0).unwrap().is_empty());
    }
}
