//! Redo log: append-only mutation records, replayed on open
//!
//! Record format (little-endian): one 32-bit header whose top two bits are
//! the opcode and whose low 30 bits are the row id.
//!
//! | opcode | meaning       | payload                        |
//! |--------|---------------|--------------------------------|
//! | `00`   | insert/update | varint key length + key bytes  |
//! | `01`   | replace       | 32-bit old row id              |
//! | `10`   | remove        | none                           |
//! | `11`   | invalid       | —                              |
//!
//! Replay applies records through the cover/remove paths without
//! re-logging. Corrupt structure aborts the open; a torn record at the very
//! tail is the signature of a crash between the in-memory update and a
//! complete append, so it is dropped (the caller truncates to the returned
//! offset) rather than treated as corruption.

use crate::compare::KeyCompare;
use crate::config::DurabilityLevel;
use crate::store::KeyStorage;
use crate::tree::MAX_ROW_ID;
use crate::varint;
use crate::{IndexError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

const OP_MASK: u32 = 0xC000_0000;
const REPLACE_BIT: u32 = 0x4000_0000;
const REMOVE_BIT: u32 = 0x8000_0000;
const ID_MASK: u32 = 0x3FFF_FFFF;

/// Buffered record writer over the open log file.
pub(crate) struct RedoLog {
    writer: BufWriter<File>,
    durability: DurabilityLevel,
}

impl RedoLog {
    pub fn new(file: File, durability: DurabilityLevel) -> Self {
        RedoLog {
            writer: BufWriter::new(file),
            durability,
        }
    }

    pub fn append_insert(&mut self, id: u32, key: &[u8]) -> Result<()> {
        debug_assert_eq!(id & !ID_MASK, 0);
        let mut len_buf = [0u8; varint::MAX_VARINT_LEN];
        let prefix = varint::encode_u32(key.len() as u32, &mut len_buf);
        self.writer.write_all(&id.to_le_bytes())?;
        self.writer.write_all(&len_buf[..prefix])?;
        self.writer.write_all(key)?;
        self.finish()
    }

    pub fn append_remove(&mut self, id: u32) -> Result<()> {
        debug_assert_eq!(id & !ID_MASK, 0);
        self.writer.write_all(&(id | REMOVE_BIT).to_le_bytes())?;
        self.finish()
    }

    pub fn append_replace(&mut self, new_id: u32, old_id: u32) -> Result<()> {
        debug_assert_eq!(new_id & !ID_MASK, 0);
        debug_assert_eq!(old_id & !ID_MASK, 0);
        self.writer.write_all(&(new_id | REPLACE_BIT).to_le_bytes())?;
        self.writer.write_all(&old_id.to_le_bytes())?;
        self.finish()
    }

    /// Drop every record: flush buffered state, then cut the file to zero.
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self.durability {
            DurabilityLevel::NoSync => Ok(()),
            DurabilityLevel::OsBuffered => Ok(self.writer.flush()?),
            DurabilityLevel::Synchronous => {
                self.writer.flush()?;
                Ok(self.writer.get_ref().sync_data()?)
            }
        }
    }
}

/// Read until `buf` is full or the stream ends; the byte count tells which.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn bad(msg: impl Into<String>) -> IndexError {
    IndexError::Corruption(msg.into())
}

fn check_replayed_id(id: u32) -> Result<u32> {
    if id > MAX_ROW_ID {
        return Err(bad(format!("bad storage file: row id {} out of range", id)));
    }
    Ok(id)
}

fn slot_used(storage: &KeyStorage, id: u32) -> bool {
    id < storage.max_index() && storage.node(id).is_used()
}

/// Replay every complete record into `storage`. Returns the byte offset
/// just past the last complete record; anything beyond it is a torn tail
/// the caller should truncate before appending.
pub(crate) fn replay(
    file: &mut File,
    storage: &mut KeyStorage,
    cmp: &KeyCompare,
    fixed_len: Option<usize>,
) -> Result<u64> {
    let file_len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *file);
    let mut good = 0u64;

    loop {
        let mut header = [0u8; 4];
        let got = read_full(&mut reader, &mut header)?;
        if got < 4 {
            break;
        }
        let word = u32::from_le_bytes(header);

        match word & OP_MASK {
            0 => {
                let id = check_replayed_id(word & ID_MASK)?;
                let mut cursor = good + 4;
                let (key_len, prefix) = match read_varint_tail(&mut reader, file_len, cursor)? {
                    Some(v) => v,
                    None => break,
                };
                cursor += prefix as u64;
                if u64::from(key_len) > file_len - cursor {
                    break;
                }
                if let Some(expect) = fixed_len {
                    if key_len as usize != expect {
                        return Err(bad(format!(
                            "bad storage file: key length {} where schema fixes {}",
                            key_len, expect
                        )));
                    }
                }
                let mut key = vec![0u8; key_len as usize];
                if read_full(&mut reader, &mut key)? < key.len() {
                    break;
                }
                storage.store_cover(id, &key, cmp);
                good = cursor + u64::from(key_len);
            }
            REPLACE_BIT => {
                let new_id = check_replayed_id(word & ID_MASK)?;
                let mut old_buf = [0u8; 4];
                if read_full(&mut reader, &mut old_buf)? < 4 {
                    break;
                }
                let old_word = u32::from_le_bytes(old_buf);
                if old_word & OP_MASK != 0 {
                    return Err(bad("bad storage file: replace source carries opcode bits"));
                }
                let old_id = old_word & ID_MASK;
                if !slot_used(storage, old_id) {
                    return Err(bad(format!(
                        "bad storage file: replace of unused row {}",
                        old_id
                    )));
                }
                let key = storage.key(old_id).to_vec();
                storage.store_cover(new_id, &key, cmp);
                storage.remove(old_id, cmp);
                good += 8;
            }
            REMOVE_BIT => {
                let id = word & ID_MASK;
                if !slot_used(storage, id) {
                    return Err(bad(format!("bad storage file: remove of unused row {}", id)));
                }
                storage.remove(id, cmp);
                good += 4;
            }
            _ => {
                return Err(bad("bad storage file: invalid record opcode"));
            }
        }
    }

    Ok(good)
}

/// Varint read that reports a torn tail as `None` instead of an error.
fn read_varint_tail<R: Read>(
    reader: &mut R,
    file_len: u64,
    at: u64,
) -> Result<Option<(u32, usize)>> {
    let mut value = 0u32;
    let mut shift = 0;
    let mut read = 0usize;
    loop {
        if at + read as u64 >= file_len {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        if read_full(reader, &mut byte)? == 0 {
            return Ok(None);
        }
        read += 1;
        value |= ((byte[0] & 0x7F) as u32) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(Some((value, read)));
        }
        shift += 7;
        if shift >= 35 {
            return Err(bad("bad storage file: oversized key length varint"));
        }
    }
}
