//! Typed key/value dictionary carried by every record header.
//!
//! # Wire layout
//! The entry area of a dictionary blob is
//! `[count: u16][entry; count]` with each entry encoded as
//! `[type: u8][section: u8][key: u16][len: u16][value: len B]`,
//! all integers little-endian.
//!
//! Decoding walks the area with a bounds-checked cursor: every field is
//! validated against the bytes that remain, so a corrupt length can never
//! read past the buffer.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::checksum::fletcher32;
use crate::format::ValueType;

/// Fixed bytes preceding each entry's value.
pub const ENTRY_HEADER_LEN: usize = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DicoError {
    #[error("dictionary truncated reading {field}: need {needed} bytes, {remaining} left")]
    Truncated { field: &'static str, needed: usize, remaining: usize },
    #[error("key {key} not found in section {section}")]
    MissingKey { section: u8, key: u16 },
    #[error("key {key} in section {section} holds {found:?} ({len} bytes), expected {expected:?}")]
    TypeMismatch {
        section:  u8,
        key:      u16,
        expected: ValueType,
        found:    ValueType,
        len:      usize,
    },
    #[error("value of key {key} in section {section} is {len} bytes, limit is {max}")]
    ValueTooLong { section: u8, key: u16, len: usize, max: usize },
    #[error("dictionary does not fit the wire format ({len} bytes)")]
    EncodingOverflow { len: usize },
}

impl DicoError {
    /// True when the dictionary decoded fine but a lookup failed.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            DicoError::MissingKey { .. }
                | DicoError::TypeMismatch { .. }
                | DicoError::ValueTooLong { .. }
        )
    }
}

/// One stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicoEntry {
    pub section: u8,
    pub key:     u16,
    pub vtype:   ValueType,
    pub data:    Vec<u8>,
}

/// Insertion-ordered map keyed by `(section, key)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: Vec<DicoEntry>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DicoEntry> {
        self.entries.iter()
    }

    pub fn get(&self, section: u8, key: u16) -> Option<&DicoEntry> {
        self.entries
            .iter()
            .find(|e| e.section == section && e.key == key)
    }

    /// Store a value.  An existing `(section, key)` is replaced in place so
    /// that insertion order survives re-encoding.
    pub fn insert(&mut self, section: u8, key: u16, vtype: ValueType, data: &[u8]) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.section == section && e.key == key)
        {
            Some(e) => {
                e.vtype = vtype;
                e.data = data.to_vec();
            }
            None => self.entries.push(DicoEntry {
                section,
                key,
                vtype,
                data: data.to_vec(),
            }),
        }
    }

    // ── Typed insert ─────────────────────────────────────────────────────────

    pub fn insert_u8(&mut self, section: u8, key: u16, v: u8) {
        self.insert(section, key, ValueType::U8, &[v]);
    }

    pub fn insert_u16(&mut self, section: u8, key: u16, v: u16) {
        self.insert(section, key, ValueType::U16, &v.to_le_bytes());
    }

    pub fn insert_u32(&mut self, section: u8, key: u16, v: u32) {
        self.insert(section, key, ValueType::U32, &v.to_le_bytes());
    }

    pub fn insert_u64(&mut self, section: u8, key: u16, v: u64) {
        self.insert(section, key, ValueType::U64, &v.to_le_bytes());
    }

    pub fn insert_data(&mut self, section: u8, key: u16, v: &[u8]) {
        self.insert(section, key, ValueType::Data, v);
    }

    /// Strings are stored NUL-terminated.
    pub fn insert_string(&mut self, section: u8, key: u16, v: &str) {
        let mut buf = Vec::with_capacity(v.len() + 1);
        buf.extend_from_slice(v.as_bytes());
        buf.push(0);
        self.insert(section, key, ValueType::String, &buf);
    }

    // ── Typed get ────────────────────────────────────────────────────────────

    fn get_fixed(&self, section: u8, key: u16, expected: ValueType) -> Result<&[u8], DicoError> {
        let e = self
            .get(section, key)
            .ok_or(DicoError::MissingKey { section, key })?;
        if e.vtype != expected || Some(e.data.len()) != expected.width() {
            return Err(DicoError::TypeMismatch {
                section,
                key,
                expected,
                found: e.vtype,
                len: e.data.len(),
            });
        }
        Ok(&e.data)
    }

    pub fn get_u8(&self, section: u8, key: u16) -> Result<u8, DicoError> {
        Ok(self.get_fixed(section, key, ValueType::U8)?[0])
    }

    pub fn get_u16(&self, section: u8, key: u16) -> Result<u16, DicoError> {
        Ok(LittleEndian::read_u16(self.get_fixed(section, key, ValueType::U16)?))
    }

    pub fn get_u32(&self, section: u8, key: u16) -> Result<u32, DicoError> {
        Ok(LittleEndian::read_u32(self.get_fixed(section, key, ValueType::U32)?))
    }

    pub fn get_u64(&self, section: u8, key: u16) -> Result<u64, DicoError> {
        Ok(LittleEndian::read_u64(self.get_fixed(section, key, ValueType::U64)?))
    }

    /// Raw value bytes of any type, refused when longer than `max_len`.
    pub fn get_bytes(&self, section: u8, key: u16, max_len: usize) -> Result<&[u8], DicoError> {
        let e = self
            .get(section, key)
            .ok_or(DicoError::MissingKey { section, key })?;
        if e.data.len() > max_len {
            return Err(DicoError::ValueTooLong {
                section,
                key,
                len: e.data.len(),
                max: max_len,
            });
        }
        Ok(&e.data)
    }

    /// String value with trailing NULs removed.
    pub fn get_string(&self, section: u8, key: u16, max_len: usize) -> Result<String, DicoError> {
        let raw = self.get_bytes(section, key, max_len)?;
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    // ── Wire encoding ────────────────────────────────────────────────────────

    /// Parse an entry area (`[count][entries]`) into a fresh dictionary.
    pub fn decode_entries(buf: &[u8]) -> Result<Self, DicoError> {
        let mut cur = EntryCursor::new(buf);
        let count = cur.read_u16("entry count")?;

        let mut dico = Dictionary::new();
        for _ in 0..count {
            let vtype   = ValueType::from(cur.read_u8("entry type")?);
            let section = cur.read_u8("entry section")?;
            let key     = cur.read_u16("entry key")?;
            let len     = cur.read_u16("entry length")? as usize;
            let data    = cur.take(len, "entry value")?;
            dico.insert(section, key, vtype, data);
        }
        Ok(dico)
    }

    /// Encode the entry area, the inverse of [`Dictionary::decode_entries`].
    pub fn encode(&self) -> Result<Vec<u8>, DicoError> {
        let count = u16::try_from(self.entries.len())
            .map_err(|_| DicoError::EncodingOverflow { len: self.entries.len() })?;
        let size = 2 + self
            .entries
            .iter()
            .map(|e| ENTRY_HEADER_LEN + e.data.len())
            .sum::<usize>();
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&count.to_le_bytes());
        for e in &self.entries {
            let len = u16::try_from(e.data.len()).map_err(|_| DicoError::ValueTooLong {
                section: e.section,
                key:     e.key,
                len:     e.data.len(),
                max:     u16::MAX as usize,
            })?;
            out.push(e.vtype.tag());
            out.push(e.section);
            out.extend_from_slice(&e.key.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&e.data);
        }
        if out.len() > u16::MAX as usize {
            return Err(DicoError::EncodingOverflow { len: out.len() });
        }
        Ok(out)
    }

    /// Encode a full blob: `[len: u16][entry area][checksum: u32]`.
    pub fn encode_blob(&self) -> Result<Vec<u8>, DicoError> {
        let body = self.encode()?;
        let mut out = Vec::with_capacity(body.len() + 6);
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&fletcher32(&body).to_le_bytes());
        Ok(out)
    }
}

// ── Cursor ───────────────────────────────────────────────────────────────────

struct EntryCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> EntryCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], DicoError> {
        let remaining = self.buf.len() - self.pos;
        if n > remaining {
            return Err(DicoError::Truncated { field, needed: n, remaining });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, DicoError> {
        Ok(self.take(1, field)?[0])
    }

    fn read_u16(&mut self, field: &'static str) -> Result<u16, DicoError> {
        Ok(LittleEndian::read_u16(self.take(2, field)?))
    }
}
