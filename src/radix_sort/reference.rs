//! Host model of the GPU radix sort, stage for stage, used to pin down the
//! histogram layout and the stability argument without a device.

use crate::config::SortConfig;

pub(crate) fn count_digits(config: &SortConfig, keys: &[u32], shift: u32) -> Vec<u32> {
    let radix = config.radix_size() as usize;
    let mask = config.radix_size() - 1;
    let block = config.block_size() as usize;
    let blocks = keys.len().div_ceil(block);
    let mut histogram = vec![0u32; radix * blocks];
    for (b, chunk) in keys.chunks(block).enumerate() {
        for key in chunk {
            let digit = ((key >> shift) & mask) as usize;
            histogram[digit * blocks + b] += 1;
        }
    }
    histogram
}

/// Exclusive scan computed the way the single scan workgroup does: per-thread
/// runs, a scan of the run totals, then a rewrite of each run.
pub(crate) fn scan_histogram(config: &SortConfig, histogram: &mut [u32]) {
    let threads = config.workgroup_size as usize;
    let run = histogram.len().div_ceil(threads).max(1);
    let mut prefix = 0u32;
    for chunk in histogram.chunks_mut(run) {
        let total: u32 = chunk.iter().sum();
        let mut running = prefix;
        for cell in chunk.iter_mut() {
            let count = *cell;
            *cell = running;
            running += count;
        }
        prefix += total;
    }
}

pub(crate) fn scatter(
    config: &SortConfig,
    offsets: &[u32],
    keys: &[u32],
    indices: &[u32],
    shift: u32,
) -> (Vec<u32>, Vec<u32>) {
    let mask = config.radix_size() - 1;
    let block = config.block_size() as usize;
    let blocks = keys.len().div_ceil(block);
    let mut keys_out = vec![0u32; keys.len()];
    let mut indices_out = vec![0u32; keys.len()];
    for b in 0..blocks {
        let mut cursor: Vec<u32> = (0..config.radix_size() as usize)
            .map(|digit| offsets[digit * blocks + b])
            .collect();
        let end = ((b + 1) * block).min(keys.len());
        for i in b * block..end {
            let digit = ((keys[i] >> shift) & mask) as usize;
            let dst = cursor[digit] as usize;
            keys_out[dst] = keys[i];
            indices_out[dst] = indices[i];
            cursor[digit] += 1;
        }
    }
    (keys_out, indices_out)
}

/// Run every pass and return the final (keys, indices).
pub(crate) fn sort_pairs(config: &SortConfig, keys: &[u32], indices: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let mut keys = keys.to_vec();
    let mut indices = indices.to_vec();
    for pass in 0..config.passes() {
        let shift = pass * config.digit_bits;
        let mut histogram = count_digits(config, &keys, shift);
        scan_histogram(config, &mut histogram);
        let (k, i) = scatter(config, &histogram, &keys, &indices, shift);
        keys = k;
        indices = i;
    }
    (keys, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth_key::encode_depth;

    fn small_blocks() -> SortConfig {
        // 16 buckets, 32 lanes, 2 rows: many blocks even for short inputs.
        SortConfig::new(4096)
            .with_digit_bits(4)
            .with_workgroup_size(32)
            .with_block_rows(2)
    }

    fn sort_depths(config: &SortConfig, depths: &[f32]) -> Vec<u32> {
        let keys: Vec<u32> = depths.iter().map(|&d| encode_depth(d)).collect();
        let indices: Vec<u32> = (0..keys.len() as u32).collect();
        sort_pairs(config, &keys, &indices).1
    }

    #[test]
    fn orders_by_depth() {
        let order = sort_depths(&SortConfig::new(8), &[5.0, 1.0, 4.0, 1.0, 3.0]);
        assert_eq!(order, vec![1, 3, 4, 2, 0]);
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let order = sort_depths(&SortConfig::new(8), &[7.0, 7.0, 7.0]);
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let (keys, indices) = sort_pairs(&SortConfig::new(0), &[], &[]);
        assert!(keys.is_empty());
        assert!(indices.is_empty());
    }

    #[test]
    fn scan_matches_serial_prefix_sum() {
        let config = small_blocks();
        let mut table: Vec<u32> = (0..1000u32).map(|i| (i * 7919) % 13).collect();
        let mut expected = Vec::with_capacity(table.len());
        let mut acc = 0;
        for &v in &table {
            expected.push(acc);
            acc += v;
        }
        scan_histogram(&config, &mut table);
        assert_eq!(table, expected);
    }

    #[test]
    fn multi_block_sort_is_stable_permutation() {
        let config = small_blocks();
        // Few distinct keys so stability is actually exercised across blocks.
        let keys: Vec<u32> = (0..1500u32).map(|i| (i.wrapping_mul(2654435761) >> 7) % 37).collect();
        let indices: Vec<u32> = (0..keys.len() as u32).collect();
        let (sorted_keys, sorted_indices) = sort_pairs(&config, &keys, &indices);

        let mut expected: Vec<(u32, u32)> = keys.iter().copied().zip(indices.iter().copied()).collect();
        expected.sort_by_key(|&(k, _)| k);
        let (expected_keys, expected_indices): (Vec<u32>, Vec<u32>) = expected.into_iter().unzip();
        assert_eq!(sorted_keys, expected_keys);
        assert_eq!(sorted_indices, expected_indices);
    }

    #[test]
    fn full_width_keys_sort_across_all_passes() {
        let config = SortConfig::new(4096).with_block_rows(1);
        let keys: Vec<u32> = (0..3000u32).map(|i| i.wrapping_mul(0x9E37_79B9)).collect();
        let indices: Vec<u32> = (0..keys.len() as u32).collect();
        let (sorted_keys, sorted_indices) = sort_pairs(&config, &keys, &indices);
        assert!(sorted_keys.windows(2).all(|w| w[0] <= w[1]));
        for (k, i) in sorted_keys.iter().zip(&sorted_indices) {
            assert_eq!(keys[*i as usize], *k);
        }
    }
}
