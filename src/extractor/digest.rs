use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

const MIN_BUFFER_SIZE: usize = 4 * 1024;

/// Lowercase hex SHA-256 of the file's contents, streamed in `buffer_size` chunks.
pub fn file_digest(path: &Path, buffer_size: usize) -> io::Result<String> {
    let buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(buffer_size, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Copy file content only. The destination is truncated or created with default
/// permissions; no metadata is carried over from the source.
pub fn copy_content(source: &Path, dest: &Path, buffer_size: usize) -> io::Result<u64> {
    let buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
    let mut reader = BufReader::with_capacity(buffer_size, File::open(source)?);
    let mut writer = BufWriter::with_capacity(buffer_size, File::create(dest)?);

    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;

    Ok(bytes)
}
