//! Segment detection over sorted keys.
//!
//! After sorting, a segment is a contiguous run of equal keys, i.e. one
//! cell. Segment `s` starts at `segment_starts[s]` and every sorted position
//! carries the id of its segment.

/// Result of segment detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentResult {
    /// Segment id of each sorted position.
    pub segment_ids: Vec<u32>,
    /// Start of each segment, followed by one sentinel equal to the length.
    pub segment_starts: Vec<u32>,
    /// Key of each segment.
    pub segment_codes: Vec<u64>,
}

impl SegmentResult {
    pub fn num_segments(&self) -> usize {
        self.segment_codes.len()
    }

    /// Length of each segment (points per cell).
    pub fn segment_lengths(&self) -> Vec<u32> {
        self.segment_starts.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// Detect segments in sorted keys.
pub fn detect_segments(sorted_codes: &[u64]) -> SegmentResult {
    let n = sorted_codes.len();
    if n == 0 {
        return SegmentResult {
            segment_ids: Vec::new(),
            segment_starts: vec![0],
            segment_codes: Vec::new(),
        };
    }

    let mut segment_ids = vec![0u32; n];
    let mut current_segment = 0u32;
    let mut segment_starts = vec![0u32];
    let mut segment_codes = vec![sorted_codes[0]];

    for i in 1..n {
        if sorted_codes[i] != sorted_codes[i - 1] {
            current_segment += 1;
            segment_starts.push(i as u32);
            segment_codes.push(sorted_codes[i]);
        }
        segment_ids[i] = current_segment;
    }
    segment_starts.push(n as u32);

    SegmentResult {
        segment_ids,
        segment_starts,
        segment_codes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_detection() {
        // Points 0,1,2 (code=1) -> segment 0
        // Points 3,4 (code=5) -> segment 1
        // Points 5,6,7,8 (code=9) -> segment 2
        let sorted_codes = vec![1u64, 1, 1, 5, 5, 9, 9, 9, 9];
        let result = detect_segments(&sorted_codes);

        assert_eq!(result.segment_ids, vec![0, 0, 0, 1, 1, 2, 2, 2, 2]);
        assert_eq!(result.segment_starts, vec![0, 3, 5, 9]);
        assert_eq!(result.segment_codes, vec![1, 5, 9]);
        assert_eq!(result.num_segments(), 3);
        assert_eq!(result.segment_lengths(), vec![3, 2, 4]);
    }

    #[test]
    fn test_all_same_code() {
        let result = detect_segments(&[42u64; 100]);
        assert_eq!(result.num_segments(), 1);
        assert_eq!(result.segment_lengths(), vec![100]);
    }

    #[test]
    fn test_all_different_codes() {
        let sorted_codes: Vec<u64> = (0..50).collect();
        let result = detect_segments(&sorted_codes);
        assert_eq!(result.num_segments(), 50);
        assert_eq!(result.segment_ids, (0..50).collect::<Vec<u32>>());
    }

    #[test]
    fn test_empty() {
        let result = detect_segments(&[]);
        assert_eq!(result.num_segments(), 0);
        assert!(result.segment_ids.is_empty());
        assert!(result.segment_lengths().is_empty());
    }
}
