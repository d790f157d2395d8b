use crate::common::Reader;
use super::{Error, Result};

/// Semitone value meaning "note off" rather than a pitch.
pub const NOTE_OFF: u8 = 180;

/// One tracker effect slot: an effect code paired with its byte argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Effect {
    pub code: Option<u8>,
    pub value: Option<u8>,
}

/// A single pattern row. Absent fields carry no information for that row.
#[derive(Debug, Clone, Default)]
pub struct Row {
    /// Semitone 0..179, or [`NOTE_OFF`], or absent.
    pub note: Option<u8>,
    pub instrument: Option<u8>,
    pub volume: Option<u8>,
    pub effects: Vec<Effect>,
}

impl Row {
    /// A row with all fields absent, used as filler and as the fixed-point in comparisons.
    pub fn empty(fx_columns: usize) -> Self {
        Self { note: None, instrument: None, volume: None, effects: vec![Effect::default(); fx_columns] }
    }

    /// Whether every field of the row is absent.
    pub fn is_empty(&self) -> bool {
        self.note.is_none()
            && self.instrument.is_none()
            && self.volume.is_none()
            && self.effects.iter().all(|e| e.code.is_none() && e.value.is_none())
    }
}

/// A decoded `PATN` chunk: one channel's rows for one pattern index.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub channel: u8,
    pub index: u16,
    pub rows: Vec<Row>,
}

/// Reads a single `PATN` chunk located at the reader's current position.
///
/// `pattern_len` and `fx_columns` come from the module's `INFO` block; the chunk itself carries
/// no row count, so the caller supplies how many rows to right-pad to.
pub(crate) fn read_pattern(r: &mut Reader<'_>, pattern_len: u16, fx_columns: u8) -> Result<Pattern> {
    let start = r.pos();
    let magic = r.read(4)?;
    if magic != b"PATN" {
        return Err(Error::BadChunkMagic {
            offset: start,
            expected: "PATN",
            found: magic.try_into().unwrap_or([0; 4]),
        });
    }
    let len = r.u4()?;
    let end = r.pos() + len as usize;
    let _subsong = r.u1()?;
    let channel = r.u1()?;
    let index = r.u2()?;
    let _name = r.ustr()?;

    let mut rows = Vec::with_capacity(pattern_len as usize);
    while rows.len() < pattern_len as usize && r.pos() < end {
        let desc = r.u1()?;
        if desc == 0xff {
            break;
        }
        if desc & 0x80 != 0 {
            let count = 2 + (desc & 0x7f) as usize;
            for _ in 0..count {
                if rows.len() >= pattern_len as usize {
                    break;
                }
                rows.push(Row::empty(fx_columns as usize));
            }
            continue;
        }

        let has_note = desc & 0b001 != 0;
        let has_ins = desc & 0b010 != 0;
        let has_vol = desc & 0b100 != 0;
        let mut fx_mask: u16 = ((desc >> 3) & 0b11) as u16;
        if desc & 0x20 != 0 {
            let b = r.u1()?;
            fx_mask |= b as u16;
        }
        if desc & 0x40 != 0 {
            let b = r.u1()?;
            fx_mask |= (b as u16) << 8;
        }

        let note = if has_note { Some(r.u1()?) } else { None };
        let instrument = if has_ins { Some(r.u1()?) } else { None };
        let volume = if has_vol { Some(r.u1()?) } else { None };

        let mut slots = [None; 16];
        for (i, slot) in slots.iter_mut().enumerate() {
            if fx_mask & (1 << i) != 0 {
                *slot = Some(r.u1()?);
            }
        }
        let mut effects: Vec<Effect> = slots
            .chunks(2)
            .map(|pair| Effect { code: pair[0], value: pair[1] })
            .collect();
        effects.truncate(fx_columns as usize);
        while effects.len() < fx_columns as usize {
            effects.push(Effect::default());
        }

        rows.push(Row { note, instrument, volume, effects });
    }

    while rows.len() < pattern_len as usize {
        rows.push(Row::empty(fx_columns as usize));
    }
    if rows.len() != pattern_len as usize {
        return Err(Error::InconsistentPatternLength {
            channel,
            got: rows.len(),
            expected: pattern_len as usize,
        });
    }

    Ok(Pattern { channel, index, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_pads_to_pattern_len() {
        let mut data = b"PATN".to_vec();
        let body_start = data.len() + 4;
        data.extend_from_slice(&0u32.to_le_bytes()); // length patched below
        data.push(0); // subsong
        data.push(2); // channel
        data.extend_from_slice(&7u16.to_le_bytes()); // index
        data.push(0); // empty name
        data.push(0xff); // terminator
        let len = (data.len() - body_start) as u32;
        data[4..8].copy_from_slice(&len.to_le_bytes());

        let mut r = Reader::new(&data);
        let pat = read_pattern(&mut r, 4, 1).unwrap();
        assert_eq!(pat.channel, 2);
        assert_eq!(pat.index, 7);
        assert_eq!(pat.rows.len(), 4);
        assert!(pat.rows.iter().all(Row::is_empty));
    }

    #[test]
    fn test_skip_run_of_empty_rows() {
        let mut data = b"PATN".to_vec();
        let body_start = data.len() + 4;
        data.extend_from_slice(&0u32.to_le_bytes());
        data.push(0);
        data.push(0);
        data.extend_from_slice(&0u16.to_le_bytes());
        data.push(0);
        data.push(0x80 | 2); // 2 + 2 = 4 empty rows
        data.push(0xff);
        let len = (data.len() - body_start) as u32;
        data[4..8].copy_from_slice(&len.to_le_bytes());

        let mut r = Reader::new(&data);
        let pat = read_pattern(&mut r, 6, 1).unwrap();
        assert_eq!(pat.rows.len(), 6);
        assert!(pat.rows.iter().all(Row::is_empty));
    }

    #[test]
    fn test_note_and_single_effect() {
        let mut data = b"PATN".to_vec();
        let body_start = data.len() + 4;
        data.extend_from_slice(&0u32.to_le_bytes());
        data.push(0);
        data.push(0);
        data.extend_from_slice(&0u16.to_le_bytes());
        data.push(0);
        // desc: note+ins+vol present, fx mask low bits = 0b01 -> slot0 present
        data.push(0b000_01_111);
        data.push(48); // note
        data.push(0); // instrument
        data.push(0x7f); // volume
        data.push(0x0a); // fx code (vol slide)
        data.push(0xff); // terminator
        let len = (data.len() - body_start) as u32;
        data[4..8].copy_from_slice(&len.to_le_bytes());

        let mut r = Reader::new(&data);
        let pat = read_pattern(&mut r, 1, 1).unwrap();
        let row = &pat.rows[0];
        assert_eq!(row.note, Some(48));
        assert_eq!(row.instrument, Some(0));
        assert_eq!(row.volume, Some(0x7f));
        assert_eq!(row.effects[0].code, Some(0x0a));
        assert_eq!(row.effects[0].value, None);
    }
}
