//! Reading a whole descriptor into memory.

use std::fs::File;
use std::io::{self, Read};

use rustix::fs::SeekFrom;
use rustix::io::Errno;

/// Rewinds `file` to offset zero; unseekable descriptors are left as they are.
pub(crate) fn rewind(file: &File) -> io::Result<()> {
    match rustix::fs::seek(file, SeekFrom::Start(0)) {
        Ok(_) | Err(Errno::SPIPE) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Reads the complete contents of `file`, starting from offset zero.
///
/// The descriptor is borrowed; its position is left at end of file.
pub fn read_all(file: &File) -> io::Result<Vec<u8>> {
    rewind(file)?;
    let hint = rustix::fs::fstat(file)
        .ok()
        .and_then(|stat| usize::try_from(stat.st_size).ok())
        .unwrap_or(0);
    let mut contents = Vec::with_capacity(hint);
    let mut reader = file;
    reader.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Reads the complete contents of `file` as UTF-8.
///
/// # Errors
///
/// Returns [`io::ErrorKind::InvalidData`] when the contents are not UTF-8.
pub fn read_to_string(file: &File) -> io::Result<String> {
    String::from_utf8(read_all(file)?).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}
