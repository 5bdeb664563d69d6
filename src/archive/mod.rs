/*! A minimal zip archive reader: enough to list entries and profile the
DEFLATE payload of each one.

Records used, all little-endian (PKWARE APPNOTE 4.3):

  End of central directory          Central directory file header
  -------------------------         -----------------------------
   4  signature 0x06054b50            4  signature 0x02014b50
   2  number of this disk             2  version made by
   2  disk where directory starts     2  version needed to extract
   2  entries on this disk            2  general purpose flags
   2  total entries                   2  compression method
   4  directory size                  4  last modified time and date
   4  directory offset                4  CRC-32
   2  comment length                  4  compressed size
                                      4  uncompressed size
  Local file header                   2  file name length
  -----------------                   2  extra field length
   4  signature 0x04034b50            2  file comment length
  22  (same fields as above,          2  disk number start
       from version needed            2  internal attributes
       to uncompressed size)          4  external attributes
   2  file name length                4  local header offset
   2  extra field length             ..  name, extra, comment
  ..  name, extra, then the data

The payload is located through the local header rather than the central
directory, since the two may carry extra fields of different lengths.
*/

use crate::config::ProfilerConfig;
use crate::deflate::decoder::DecodeError;
use crate::profile::ProfileModel;
use crate::Profiler;

use bitflags::bitflags;
use bitstream_io::{ByteRead, ByteReader, LittleEndian};
use log::{debug, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::convert::TryFrom;
use std::io::{self, Cursor};
use thiserror::Error;

pub const LOCAL_HEADER_SIGNATURE: u32 = 0x04034b50;
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x02014b50;
pub const END_OF_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

const END_OF_DIRECTORY_LEN: usize = 22;
const LOCAL_HEADER_LEN: usize = 30;
const MAX_COMMENT_LEN: usize = u16::MAX as usize;

#[derive(Error, Debug)]
pub enum ArchiveError {
  #[error("No end of central directory record found")]
  MissingEndOfDirectory,
  #[error("Bad signature at offset {offset}: expected {expected:08x}, got {found:08x}")]
  BadSignature {
    offset: usize,
    expected: u32,
    found: u32,
  },
  #[error("Archive data ends before the entry it describes")]
  Truncated,
  #[error("Unsupported compression method {0}")]
  UnsupportedMethod(u16),
  #[error("Entry {0} is encrypted")]
  Encrypted(String),
  #[error("CRC-32 mismatch in {path}: directory says {expected:08x}, contents give {actual:08x}")]
  ChecksumMismatch {
    path: String,
    expected: u32,
    actual: u32,
  },
  #[error("Failed to decode entry: {0}")]
  Decode(#[from] DecodeError),
  #[error("Archive read error: {0}")]
  Io(#[from] io::Error),
}

bitflags! {
    /** General purpose bit flags of a zip entry */
    #[derive(Default)]
    pub struct EntryFlags: u16 {
        const ENCRYPTED         = 0b1 << 0;
        const STRONG_ENCRYPTION = 0b1 << 6;
        const UTF8              = 0b1 << 11;
    }
}

impl EntryFlags {
  pub fn is_encrypted(&self) -> bool {
    self.intersects(EntryFlags::ENCRYPTED | EntryFlags::STRONG_ENCRYPTION)
  }
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[repr(u16)]
pub enum CompressionMethod {
  Stored = 0,
  Deflated = 8,
}

/// One file in the central directory.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
  pub path: String,
  pub flags: EntryFlags,
  pub method: u16,
  pub crc32: u32,
  pub compressed_size: u32,
  pub uncompressed_size: u32,
  pub local_header_offset: u32,
}

fn check_signature<R: io::Read>(
  reader: &mut ByteReader<R, LittleEndian>,
  offset: usize,
  expected: u32,
) -> Result<(), ArchiveError> {
  let found = reader.read::<u32>()?;
  if found != expected {
    return Err(ArchiveError::BadSignature {
      offset,
      expected,
      found,
    });
  }
  Ok(())
}

fn read_vec<R: io::Read>(
  reader: &mut ByteReader<R, LittleEndian>,
  len: usize,
) -> io::Result<Vec<u8>> {
  let mut buf = vec![0u8; len];
  reader.read_bytes(&mut buf)?;
  Ok(buf)
}

/// Offset of the end of central directory record, searching backwards past
/// any archive comment.
fn find_end_of_directory(data: &[u8]) -> Option<usize> {
  let last = data.len().checked_sub(END_OF_DIRECTORY_LEN)?;
  let first = last.saturating_sub(MAX_COMMENT_LEN);
  let signature = END_OF_DIRECTORY_SIGNATURE.to_le_bytes();
  (first..=last)
    .rev()
    .find(|i| data[*i..*i + 4] == signature)
}

/// Entry names are UTF-8 when the UTF8 flag is set. Older archivers write
/// unflagged names in a legacy 8-bit code page, which is read here as Latin-1.
fn decode_entry_name(name: Vec<u8>, flags: EntryFlags) -> String {
  match String::from_utf8(name) {
    Ok(path) => path,
    Err(e) if flags.contains(EntryFlags::UTF8) => {
      String::from_utf8_lossy(e.as_bytes()).into_owned()
    }
    Err(e) => e.as_bytes().iter().map(|&b| char::from(b)).collect(),
  }
}

fn read_directory(data: &[u8]) -> Result<Vec<ArchiveEntry>, ArchiveError> {
  let eocd = find_end_of_directory(data).ok_or(ArchiveError::MissingEndOfDirectory)?;
  let mut reader: ByteReader<_, LittleEndian> = ByteReader::new(Cursor::new(&data[eocd..]));
  check_signature(&mut reader, eocd, END_OF_DIRECTORY_SIGNATURE)?;
  let _disk = reader.read::<u16>()?;
  let _directory_disk = reader.read::<u16>()?;
  let _disk_entries = reader.read::<u16>()?;
  let total_entries = reader.read::<u16>()?;
  let _directory_size = reader.read::<u32>()?;
  let directory_offset = reader.read::<u32>()? as usize;

  let directory = data.get(directory_offset..).ok_or(ArchiveError::Truncated)?;
  let mut reader: ByteReader<_, LittleEndian> = ByteReader::new(Cursor::new(directory));
  let mut entries = Vec::with_capacity(total_entries as usize);
  let mut offset = directory_offset;
  for _ in 0..total_entries {
    check_signature(&mut reader, offset, CENTRAL_HEADER_SIGNATURE)?;
    let _version_made_by = reader.read::<u16>()?;
    let _version_needed = reader.read::<u16>()?;
    let flags = EntryFlags::from_bits_truncate(reader.read::<u16>()?);
    let method = reader.read::<u16>()?;
    let _mod_time = reader.read::<u32>()?;
    let crc32 = reader.read::<u32>()?;
    let compressed_size = reader.read::<u32>()?;
    let uncompressed_size = reader.read::<u32>()?;
    let name_len = reader.read::<u16>()? as usize;
    let extra_len = reader.read::<u16>()? as usize;
    let comment_len = reader.read::<u16>()? as usize;
    let _disk_start = reader.read::<u16>()?;
    let _internal_attrs = reader.read::<u16>()?;
    let _external_attrs = reader.read::<u32>()?;
    let local_header_offset = reader.read::<u32>()?;
    let name = read_vec(&mut reader, name_len)?;
    read_vec(&mut reader, extra_len + comment_len)?;

    let path = decode_entry_name(name, flags);
    debug!(
      "Directory entry {}: method {}, {} -> {} bytes",
      path, method, compressed_size, uncompressed_size
    );
    entries.push(ArchiveEntry {
      path,
      flags,
      method,
      crc32,
      compressed_size,
      uncompressed_size,
      local_header_offset,
    });
    offset += 46 + name_len + extra_len + comment_len;
  }
  Ok(entries)
}

/// A zip archive held in memory.
#[derive(Debug, Clone)]
pub struct Archive<'a> {
  data: &'a [u8],
  entries: Vec<ArchiveEntry>,
  config: ProfilerConfig,
}

impl<'a> Archive<'a> {
  pub fn new(data: &'a [u8]) -> Result<Self, ArchiveError> {
    Ok(Self {
      data,
      entries: read_directory(data)?,
      config: ProfilerConfig::default(),
    })
  }

  pub fn with_config(mut self, config: ProfilerConfig) -> Self {
    self.config = config;
    self
  }

  /// Paths of all entries, in directory order.
  pub fn entries(&self) -> Vec<&str> {
    self.entries.iter().map(|e| e.path.as_str()).collect()
  }

  pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
    self.entries.iter().find(|e| e.path == path)
  }

  fn payload(&self, entry: &ArchiveEntry) -> Result<&'a [u8], ArchiveError> {
    let offset = entry.local_header_offset as usize;
    let header = self.data.get(offset..).ok_or(ArchiveError::Truncated)?;
    let mut reader: ByteReader<_, LittleEndian> = ByteReader::new(Cursor::new(header));
    check_signature(&mut reader, offset, LOCAL_HEADER_SIGNATURE)?;
    // version, flags, method, time, date, crc, sizes
    read_vec(&mut reader, 22)?;
    let name_len = reader.read::<u16>()? as usize;
    let extra_len = reader.read::<u16>()? as usize;

    let start = offset + LOCAL_HEADER_LEN + name_len + extra_len;
    let end = start + entry.compressed_size as usize;
    self.data.get(start..end).ok_or(ArchiveError::Truncated)
  }

  /// The raw compressed bytes of the entry at `path`. A path that isn't in
  /// the archive gives an empty stream.
  pub fn stream(&self, path: &str) -> Result<&'a [u8], ArchiveError> {
    match self.entry(path) {
      Some(entry) => self.payload(entry),
      None => {
        warn!("No entry named {} in archive", path);
        Ok(&[])
      }
    }
  }

  /// Profile the entry at `path`. A path that isn't in the archive gives an
  /// empty profile.
  pub fn profile(&self, path: &str) -> Result<ProfileModel, ArchiveError> {
    let entry = match self.entry(path) {
      Some(entry) => entry,
      None => {
        warn!("No entry named {} in archive", path);
        return Ok(ProfileModel::empty());
      }
    };
    if entry.flags.is_encrypted() {
      return Err(ArchiveError::Encrypted(entry.path.clone()));
    }
    match CompressionMethod::try_from(entry.method) {
      Ok(CompressionMethod::Deflated) => {}
      _ => return Err(ArchiveError::UnsupportedMethod(entry.method)),
    }

    let payload = self.payload(entry)?;
    let model = Profiler::new(self.config).decode_deflate(payload)?;

    let actual = crc32fast::hash(model.contents());
    if actual != entry.crc32 {
      return Err(ArchiveError::ChecksumMismatch {
        path: entry.path.clone(),
        expected: entry.crc32,
        actual,
      });
    }
    Ok(model)
  }
}

/// Does `data` start like a zip archive?
pub fn is_zip(data: &[u8]) -> bool {
  data.starts_with(&LOCAL_HEADER_SIGNATURE.to_le_bytes())
}
