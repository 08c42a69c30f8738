//! Segment file plumbing: creation, recovery, entry framing.
//!
//! Segment layout:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header (64 bytes)                                          │
//! │    Magic "STRATAWL" (8) │ Version (4) │ Created (8)         │
//! │    First Sequence (8)   │ Last Sequence (8)                 │
//! │    Entry Count (8)      │ Checksum (4) │ Reserved (16)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Entry: [len u32][sequence u64][crc32 u32][record payload]  │
//! │  Entry ...                                                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::info;

use strata_core::error::{Error, Result};
use strata_core::unix_now;

use crate::record::Record;

use super::types::{WalConfig, WAL_HEADER_SIZE, WAL_MAGIC, WAL_VERSION};

/// In-memory state of the open segment.
pub(crate) struct WalFile {
    pub path: PathBuf,
    pub file: BufWriter<File>,
    pub size: u64,
    pub entry_count: u64,
    pub first_sequence: u64,
    pub last_sequence: u64,
}

pub(crate) fn create_file(wal_dir: &Path, sequence: u64, config: &WalConfig) -> Result<WalFile> {
    let filename = format!("{:020}.wal", sequence);
    let path = wal_dir.join(&filename);

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .read(true)
        .open(&path)?;

    let mut writer = BufWriter::with_capacity(config.buffer_size, file);

    writer.write_all(WAL_MAGIC)?;
    writer.write_u32::<LittleEndian>(WAL_VERSION)?;
    writer.write_u64::<LittleEndian>(unix_now())?;
    writer.write_u64::<LittleEndian>(sequence)?; // First sequence
    writer.write_u64::<LittleEndian>(sequence)?; // Last sequence (updated on finalize)
    writer.write_u64::<LittleEndian>(0)?; // Entry count
    writer.write_u32::<LittleEndian>(0)?; // Checksum placeholder
    writer.write_all(&[0u8; 16])?; // Reserved
    writer.flush()?;

    Ok(WalFile {
        path,
        file: writer,
        size: WAL_HEADER_SIZE as u64,
        entry_count: 0,
        first_sequence: sequence,
        last_sequence: sequence,
    })
}

/// Reopen an existing segment for appending: validate the header, scan
/// to the end of the valid prefix, and resume there. A torn tail is
/// tolerated; appends continue after the last intact entry.
pub(crate) fn recover_file(path: &Path, config: &WalConfig) -> Result<WalFile> {
    info!(path = ?path, "recovering WAL segment");

    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut reader = std::io::BufReader::new(file);

    let (first_sequence, mut last_sequence) = read_header(&mut reader)?;

    let mut entry_count = 0u64;
    let mut valid_end = WAL_HEADER_SIZE as u64;
    loop {
        match read_entry(&mut reader) {
            Ok(record) => {
                last_sequence = record.sequence;
                entry_count += 1;
                valid_end = reader.stream_position()?;
            }
            Err(_) => break,
        }
    }

    let mut file = reader.into_inner();
    // Drop any torn tail so new appends start on a clean boundary.
    file.set_len(valid_end)?;
    file.seek(SeekFrom::Start(valid_end))?;
    let writer = BufWriter::with_capacity(config.buffer_size, file);

    Ok(WalFile {
        path: path.to_path_buf(),
        file: writer,
        size: valid_end,
        entry_count,
        first_sequence,
        last_sequence,
    })
}

/// Update the header with the final sequence/count before rotation.
pub(crate) fn finalize_header(wal_file: &mut WalFile) -> Result<()> {
    wal_file.file.flush()?;
    let file = wal_file.file.get_mut();

    file.seek(SeekFrom::Start(28))?; // Offset of last_sequence
    file.write_u64::<LittleEndian>(wal_file.last_sequence)?;
    file.write_u64::<LittleEndian>(wal_file.entry_count)?;
    file.sync_all()?;
    file.seek(SeekFrom::End(0))?;

    Ok(())
}

pub(crate) fn read_header(reader: &mut impl Read) -> Result<(u64, u64)> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != WAL_MAGIC {
        return Err(Error::Corruption {
            message: "invalid WAL segment magic".to_string(),
        });
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version != WAL_VERSION {
        return Err(Error::WriteAheadLog {
            message: format!("unsupported WAL version: {}", version),
            source: None,
        });
    }

    let _created = reader.read_u64::<LittleEndian>()?;
    let first_sequence = reader.read_u64::<LittleEndian>()?;
    let last_sequence = reader.read_u64::<LittleEndian>()?;
    let _entry_count = reader.read_u64::<LittleEndian>()?;
    let _checksum = reader.read_u32::<LittleEndian>()?;
    let mut reserved = [0u8; 16];
    reader.read_exact(&mut reserved)?;

    Ok((first_sequence, last_sequence))
}

pub(crate) fn write_entry(writer: &mut impl Write, record: &Record) -> Result<()> {
    let payload = record.encode_to_vec();

    writer.write_u32::<LittleEndian>(payload.len() as u32)?;
    writer.write_u64::<LittleEndian>(record.sequence)?;
    writer.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    writer.write_all(&payload)?;

    Ok(())
}

pub(crate) fn read_entry(reader: &mut impl Read) -> Result<Record> {
    let length = match reader.read_u32::<LittleEndian>() {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::WriteAheadLog {
                message: "EOF".to_string(),
                source: Some(Box::new(e)),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let sequence = reader.read_u64::<LittleEndian>()?;
    let crc = reader.read_u32::<LittleEndian>()?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;

    if crc32fast::hash(&payload) != crc {
        return Err(Error::Corruption {
            message: format!("WAL entry CRC mismatch at sequence {}", sequence),
        });
    }

    let record = Record::decode(&mut payload.as_slice())?;
    if record.sequence != sequence {
        return Err(Error::Corruption {
            message: format!(
                "WAL frame sequence {} disagrees with payload {}",
                sequence, record.sequence
            ),
        });
    }

    Ok(record)
}

pub(crate) fn entry_size(record: &Record) -> usize {
    super::types::ENTRY_HEADER_SIZE + record.encoded_len()
}
