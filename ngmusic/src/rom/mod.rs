//! Packs encoded samples into fixed-size sample ROM banks and derives the byte-range symbols the
//! sound driver uses to address them.

use crate::module::Sample;
use thiserror::Error;
use tracing::instrument;

/// The result type for sample-ROM allocation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for sample-ROM allocation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("sample rom overflow: {nb_vroms} bank(s) of {vrom_size} bytes could not fit all samples")]
    RomOverflow { vrom_size: usize, nb_vroms: usize },
}

/// A sample's placement within its bank, plus the address bytes the driver reads.
#[derive(Debug, Clone)]
pub struct RomEntry {
    pub name: String,
    pub bank: usize,
    pub start: usize,
    pub length: usize,
    pub start_lsb: u8,
    pub start_msb: u8,
    pub stop_lsb: u8,
    pub stop_msb: u8,
}

/// Returns the raw bytes a sample contributes to the ROM, or `None` for samples that never live
/// in sample ROM (plain PCM is transcoded to ADPCM before reaching this stage; see
/// `module::instrument::transcode_if_needed_a`/`_b`).
fn encoded_bytes(sample: &Sample) -> Option<&[u8]> {
    match sample {
        Sample::Pcm(_) => None,
        Sample::AdpcmA(s) => Some(&s.data),
        Sample::AdpcmB(s) => Some(&s.data),
    }
}

fn derive_entry(name: String, bank: usize, start: usize, length: usize) -> RomEntry {
    let stop = start + length - 1;
    RomEntry {
        name,
        bank,
        start,
        length,
        start_lsb: ((start >> 8) & 0xff) as u8,
        start_msb: ((start >> 16) & 0xff) as u8,
        stop_lsb: ((stop >> 8) & 0xff) as u8,
        stop_msb: ((stop >> 16) & 0xff) as u8,
    }
}

/// Packs `samples` into `nb_vroms` banks of `vrom_size` bytes each, strict first-fit: each sample
/// is appended to the current bank unless doing so would overflow it, in which case allocation
/// advances to the next bank at offset zero. Samples with no ROM-resident encoding (plain PCM)
/// are skipped. Fails with [`Error::RomOverflow`] if a sample can't fit in any remaining bank.
#[instrument(level = "debug", skip_all, fields(vrom_size, nb_vroms))]
pub fn allocate(samples: &[Sample], vrom_size: usize, nb_vroms: usize) -> Result<Vec<RomEntry>> {
    let mut entries = Vec::new();
    let mut bank = 0usize;
    let mut offset = 0usize;

    for sample in samples {
        let Some(data) = encoded_bytes(sample) else { continue };
        let length = data.len();
        if length > vrom_size {
            return Err(Error::RomOverflow { vrom_size, nb_vroms });
        }
        if offset + length > vrom_size {
            bank += 1;
            offset = 0;
        }
        if bank >= nb_vroms {
            return Err(Error::RomOverflow { vrom_size, nb_vroms });
        }
        entries.push(derive_entry(sample.name().to_string(), bank, offset, length));
        offset += length;
    }

    Ok(entries)
}

/// Renders `nb_vroms` fixed-size, zero-padded binary ROM images from `samples` and their
/// allocated `entries` (as produced by [`allocate`]).
pub fn write_roms(samples: &[Sample], entries: &[RomEntry], vrom_size: usize, nb_vroms: usize) -> Vec<Vec<u8>> {
    let mut banks = vec![vec![0u8; vrom_size]; nb_vroms];
    let by_name: std::collections::HashMap<&str, &Sample> =
        samples.iter().map(|s| (s.name(), s)).collect();

    for entry in entries {
        if let Some(sample) = by_name.get(entry.name.as_str()) {
            if let Some(data) = encoded_bytes(sample) {
                banks[entry.bank][entry.start..entry.start + entry.length].copy_from_slice(data);
            }
        }
    }
    banks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::AdpcmASample;

    fn sample(name: &str, len: usize) -> Sample {
        Sample::AdpcmA(AdpcmASample { name: name.to_string(), data: vec![0u8; len], rate: 18500 })
    }

    #[test]
    fn test_allocate_packs_first_fit_within_one_bank() {
        let samples = vec![sample("a", 100), sample("b", 100)];
        let entries = allocate(&samples, 256, 1).unwrap();
        assert_eq!(entries[0].start, 0);
        assert_eq!(entries[1].start, 100);
        assert_eq!(entries[0].bank, 0);
        assert_eq!(entries[1].bank, 0);
    }

    #[test]
    fn test_allocate_advances_bank_on_overflow() {
        let samples = vec![sample("a", 200), sample("b", 200)];
        let entries = allocate(&samples, 256, 2).unwrap();
        assert_eq!(entries[0].bank, 0);
        assert_eq!(entries[1].bank, 1);
        assert_eq!(entries[1].start, 0);
    }

    #[test]
    fn test_allocate_overflow_is_fatal() {
        let vrom_size = 256;
        let samples = vec![sample("a", vrom_size / 2 + 1), sample("b", vrom_size / 2 + 1)];
        let result = allocate(&samples, vrom_size, 1);
        assert!(matches!(result, Err(Error::RomOverflow { .. })));
    }

    #[test]
    fn test_write_roms_places_bytes_at_allocated_offsets() {
        let samples = vec![sample("a", 4)];
        let entries = allocate(&samples, 16, 1).unwrap();
        let roms = write_roms(&samples, &entries, 16, 1);
        assert_eq!(roms.len(), 1);
        assert_eq!(roms[0].len(), 16);
    }
}
