//! Bucket-averaged feature vector
//!
//! Collapses a byte spectrum into a handful of slots. Each slot is the
//! truncated mean of a contiguous run of buckets; the runs partition the
//! spectrum and the last run absorbs the division remainder.

use std::ops::Range;

use crate::error::PipelineError;

/// Slot count used by the overlay and the default parameter table
pub const DEFAULT_BIN_COUNT: usize = 20;

/// Per-frame summary of the spectrum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureVector {
    slots: Vec<u8>,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[u8] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, slot: usize) -> Option<u8> {
        self.slots.get(slot).copied()
    }
}

impl From<Vec<u8>> for FeatureVector {
    fn from(slots: Vec<u8>) -> Self {
        Self { slots }
    }
}

/// Source range of every slot for a spectrum of `len` buckets.
///
/// Fails with `InsufficientSpectrum` when some slot would be empty.
pub fn bucket_ranges(len: usize, bin_count: usize) -> Result<Vec<Range<usize>>, PipelineError> {
    if bin_count == 0 {
        return Err(PipelineError::InvalidConfig(
            "Bin count must be at least 1".to_string(),
        ));
    }
    if len < bin_count {
        return Err(PipelineError::InsufficientSpectrum {
            len,
            bins: bin_count,
        });
    }

    let bucket_size = len / bin_count;
    Ok((0..bin_count)
        .map(|i| {
            let start = bucket_size * i;
            let end = if i + 1 == bin_count {
                len
            } else {
                bucket_size * (i + 1)
            };
            start..end
        })
        .collect())
}

/// Reduce a spectrum to `bin_count` averaged slots
pub fn reduce(spectrum: &[u8], bin_count: usize) -> Result<FeatureVector, PipelineError> {
    let slots = bucket_ranges(spectrum.len(), bin_count)?
        .into_iter()
        .map(|range| {
            let count = range.len() as u32;
            let sum: u32 = spectrum[range].iter().map(|&v| v as u32).sum();
            (sum / count) as u8
        })
        .collect();

    Ok(FeatureVector { slots })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_partition() {
        let ranges = bucket_ranges(100, 20).unwrap();
        assert_eq!(ranges.len(), 20);
        assert!(ranges.iter().all(|r| r.len() == 5));
        assert_eq!(ranges[19], 95..100);
    }

    #[test]
    fn test_last_bin_absorbs_remainder() {
        let ranges = bucket_ranges(103, 20).unwrap();
        assert!(ranges[..19].iter().all(|r| r.len() == 5));
        assert_eq!(ranges[19], 95..103);
        assert_eq!(ranges[19].len(), 8);
    }

    #[test]
    fn test_ranges_partition_spectrum() {
        for len in [20, 21, 39, 64, 100, 103, 512, 1024, 1031] {
            for bins in [1, 3, 7, 20] {
                let ranges = bucket_ranges(len, bins).unwrap();
                assert_eq!(ranges.len(), bins);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges[bins - 1].end, len);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
                assert!(ranges.iter().all(|r| !r.is_empty()));
            }
        }
    }

    #[test]
    fn test_truncating_average() {
        // Slot 0 covers [10, 11], slot 1 covers [10, 20, 30]
        let v = reduce(&[10, 11, 10, 20, 30], 2).unwrap();
        assert_eq!(v.as_slice(), &[10, 20]);

        let v = reduce(&[10, 20, 30], 1).unwrap();
        assert_eq!(v.as_slice(), &[20]);

        let v = reduce(&[10, 11], 1).unwrap();
        assert_eq!(v.as_slice(), &[10]);
    }

    #[test]
    fn test_reduce_full_scale() {
        let v = reduce(&[255; 1024], DEFAULT_BIN_COUNT).unwrap();
        assert_eq!(v.len(), DEFAULT_BIN_COUNT);
        assert!(v.as_slice().iter().all(|&s| s == 255));
    }

    #[test]
    fn test_reduce_remainder_contributes() {
        let mut spectrum = vec![0u8; 103];
        spectrum[100..].fill(240);
        let v = reduce(&spectrum, 20).unwrap();

        // [95, 103): five zeros and three 240s
        assert_eq!(v.get(19), Some(90));
        assert!(v.as_slice()[..19].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let spectrum: Vec<u8> = (0..1024).map(|i| (i * 7 % 256) as u8).collect();
        assert_eq!(reduce(&spectrum, 20).unwrap(), reduce(&spectrum, 20).unwrap());
    }

    #[test]
    fn test_short_spectrum_is_rejected() {
        assert_eq!(
            reduce(&[1, 2, 3], 20).unwrap_err(),
            PipelineError::InsufficientSpectrum { len: 3, bins: 20 }
        );
        assert!(reduce(&[1, 2, 3], 0).is_err());
    }
}
