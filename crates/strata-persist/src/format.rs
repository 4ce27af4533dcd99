//! Binary column format (SVXC).
//!
//! A column file holds one snapshot per section slot. Sections are framed by
//! a byte length so that a corrupt section body can be skipped without losing
//! its siblings; the bit width of the packed words is never stored and is
//! recomputed by the reader from the palette size (or the registry size for
//! global-mode sections).
//!
//! ## Binary layout
//!
//! | Field | Size |
//! |-------|------|
//! | Magic bytes `[0x53, 0x56, 0x58, 0x43]` ("SVXC") | 4 |
//! | Format version (`u8`, currently 1) | 1 |
//! | Section count (`u16`, little-endian) | 2 |
//! | Per section: present flag (`u8`) | 1 |
//! | If present: body length in bytes (`u32`) | 4 |
//! | Body: palette length (`u16`, 0 = global mode) | 2 |
//! | Per palette entry: name (`u16` length + UTF-8), property count (`u8`), properties (key and value, each `u16` length + UTF-8) | var |
//! | Word count (`u32`) | 4 |
//! | Packed words (`u64` each, little-endian) | 8 × N |

use strata_voxel::{BlockState, SectionSnapshot};

use crate::error::PersistError;

/// Magic bytes identifying the SVXC format.
pub const MAGIC: [u8; 4] = [0x53, 0x56, 0x58, 0x43];

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Outcome of decoding one section slot.
#[derive(Debug)]
pub enum DecodedSection {
    /// The slot was saved as absent (implicitly all-default).
    Absent,
    /// A snapshot decoded cleanly. It has not yet been validated against the
    /// registry; that happens when the section is rebuilt.
    Section(SectionSnapshot),
    /// The section body was unreadable. The surrounding column remains
    /// loadable; the caller substitutes an all-default section.
    Corrupt(PersistError),
}

/// Encodes one column's section snapshots to SVXC bytes.
pub fn encode_column(slots: &[Option<SectionSnapshot>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC);
    buf.push(FORMAT_VERSION);
    buf.extend_from_slice(&(slots.len() as u16).to_le_bytes());

    for slot in slots {
        match slot {
            None => buf.push(0),
            Some(snapshot) => {
                buf.push(1);
                let body = encode_body(snapshot);
                buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
                buf.extend_from_slice(&body);
            }
        }
    }
    buf
}

/// Decodes SVXC bytes back into per-slot outcomes.
///
/// Header-level problems (magic, version, broken framing) fail the whole
/// column; anything confined to one section body is reported per slot.
pub fn decode_column(data: &[u8]) -> Result<Vec<DecodedSection>, PersistError> {
    let mut reader = Reader::new(data);
    if reader.take(4)? != MAGIC {
        return Err(PersistError::BadMagic);
    }
    let version = reader.u8()?;
    if version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }
    let section_count = reader.u16()? as usize;

    let mut slots = Vec::with_capacity(section_count);
    for _ in 0..section_count {
        if reader.u8()? == 0 {
            slots.push(DecodedSection::Absent);
            continue;
        }
        let body_len = reader.u32()? as usize;
        let body = reader.take(body_len)?;
        slots.push(match decode_body(body) {
            Ok(snapshot) => DecodedSection::Section(snapshot),
            Err(err) => DecodedSection::Corrupt(err),
        });
    }
    Ok(slots)
}

fn encode_body(snapshot: &SectionSnapshot) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(snapshot.palette.len() as u16).to_le_bytes());
    for state in &snapshot.palette {
        put_str(&mut buf, state.name());
        buf.push(state.properties().len() as u8);
        for (key, value) in state.properties() {
            put_str(&mut buf, key);
            put_str(&mut buf, value);
        }
    }
    buf.extend_from_slice(&(snapshot.words.len() as u32).to_le_bytes());
    for word in &snapshot.words {
        buf.extend_from_slice(&word.to_le_bytes());
    }
    buf
}

fn decode_body(body: &[u8]) -> Result<SectionSnapshot, PersistError> {
    let mut reader = Reader::new(body);
    let palette_len = reader.u16()? as usize;
    let mut palette = Vec::with_capacity(palette_len);
    for _ in 0..palette_len {
        let mut state = BlockState::new(reader.str()?);
        let prop_count = reader.u8()?;
        for _ in 0..prop_count {
            let key = reader.str()?;
            let value = reader.str()?;
            state = state.with_property(key, value);
        }
        palette.push(state);
    }
    let word_count = reader.u32()? as usize;
    let mut words = Vec::with_capacity(word_count);
    for _ in 0..word_count {
        words.push(reader.u64()?);
    }
    Ok(SectionSnapshot { palette, words })
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Bounds-checked cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PersistError> {
        let end = self.pos.checked_add(len).ok_or(PersistError::Truncated {
            expected: usize::MAX,
            actual: self.data.len(),
        })?;
        if end > self.data.len() {
            return Err(PersistError::Truncated {
                expected: end,
                actual: self.data.len(),
            });
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, PersistError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, PersistError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, PersistError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64, PersistError> {
        let bytes = self.take(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(word))
    }

    fn str(&mut self) -> Result<&'a str, PersistError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|_| PersistError::InvalidString)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
