//! 稀疏后缀数组采样器。
//!
//! 采样规则：文本位置 p 满足 `p % rate == 0`、p 是片段起点、或 p 是哨兵时，
//! 对应的 BWT 行被采样。片段起点必采样保证 locate 的 LF 回走永远不会
//! 跨过哨兵（文本含多个相同哨兵时只有那一步的 LF 不保位置），
//! 同时回走步数不超过 rate。

use serde::{Deserialize, Serialize};

use crate::index::bitvec::BitVec;
use crate::index::bwt::Segment;

/// 采样条目：片段内坐标。反向片段的 pos 指反向互补拷贝内的偏移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqPos {
    pub seq: u32,
    pub pos: u32,
    pub reverse: bool,
}

/// 把全局文本坐标映射为片段坐标的辅助表
#[derive(Debug, Clone)]
pub struct SegmentMap {
    /// 各片段在文本中的起点（递增）
    starts: Vec<usize>,
    n_fwd: usize,
}

impl SegmentMap {
    pub fn new(segments: &[Segment], delimited: bool) -> Self {
        let mut starts = Vec::with_capacity(segments.len());
        let mut acc = 0usize;
        for seg in segments {
            starts.push(acc);
            acc += seg.len as usize + if delimited { 1 } else { 0 };
        }
        let n_fwd = segments.iter().filter(|s| !s.reverse).count();
        Self { starts, n_fwd }
    }

    /// 全局位置 -> (片段序号, 片段内偏移)。哨兵映射为 offset == len。
    #[inline]
    pub fn resolve(&self, p: usize) -> (usize, usize) {
        let g = match self.starts.binary_search(&p) {
            Ok(g) => g,
            Err(ins) => ins - 1,
        };
        (g, p - self.starts[g])
    }

    #[inline]
    pub fn seq_id(&self, segment: usize) -> u32 {
        if segment < self.n_fwd {
            segment as u32
        } else {
            (segment - self.n_fwd) as u32
        }
    }

    #[inline]
    pub fn n_fwd(&self) -> usize {
        self.n_fwd
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaSampler {
    pub(crate) rate: u64,
    pub(crate) rows: BitVec,
    pub(crate) entries: Vec<SeqPos>,
}

impl SaSampler {
    /// 对整个后缀数组扫一遍，抽出需要采样的行。
    pub fn build(
        sa: &[u32],
        text: &[u8],
        segments: &[Segment],
        delimited: bool,
        rate: usize,
    ) -> Self {
        assert!(rate >= 1, "sampling rate must be at least 1");
        let map = SegmentMap::new(segments, delimited);
        let n = sa.len();
        let mut rows = BitVec::new(n);
        let mut entries = Vec::with_capacity(n / rate + segments.len() * 2 + 1);
        for (row, &p32) in sa.iter().enumerate() {
            let p = p32 as usize;
            let (g, off) = map.resolve(p);
            let sampled = p % rate == 0 || off == 0 || text[p] == 0;
            if sampled {
                rows.set(row);
                entries.push(SeqPos {
                    seq: map.seq_id(g),
                    pos: off as u32,
                    reverse: segments[g].reverse,
                });
            }
        }
        rows.finalize();
        Self {
            rate: rate as u64,
            rows,
            entries,
        }
    }

    #[inline]
    pub fn rate(&self) -> usize {
        self.rate as usize
    }

    #[inline]
    pub fn is_sampled(&self, row: usize) -> bool {
        self.rows.get(row)
    }

    /// 仅当 is_sampled(row) 为真时可调用
    #[inline]
    pub fn entry(&self, row: usize) -> SeqPos {
        debug_assert!(self.rows.get(row));
        self.entries[self.rows.rank1(row)]
    }

    pub fn n_entries(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::bwt::assemble_text;
    use crate::index::sa::build_sa;

    fn setup(refs: &[&[u8]], delimited: bool, mirrored: bool, rate: usize) -> (Vec<u8>, Vec<u32>, Vec<Segment>, SaSampler) {
        let refs: Vec<Vec<u8>> = refs.iter().map(|r| r.to_vec()).collect();
        let (text, segs) = assemble_text(&refs, delimited, mirrored);
        let sa = build_sa(&text);
        let sampler = SaSampler::build(&sa, &text, &segs, delimited, rate);
        (text, sa, segs, sampler)
    }

    #[test]
    fn dense_rate_samples_every_row() {
        let (_, sa, _, sampler) = setup(&[&[1, 2, 3, 4, 1, 2]], true, false, 1);
        for row in 0..sa.len() {
            assert!(sampler.is_sampled(row));
        }
        assert_eq!(sampler.n_entries(), sa.len());
    }

    #[test]
    fn entries_match_sa_positions() {
        let (_, sa, _, sampler) = setup(&[&[1, 2, 3, 4, 1, 2, 3, 4]], true, false, 4);
        for (row, &p) in sa.iter().enumerate() {
            if sampler.is_sampled(row) {
                let e = sampler.entry(row);
                assert_eq!(e.seq, 0);
                // 哨兵映射为 pos == len
                assert_eq!(e.pos as usize, (p as usize).min(8));
                assert!(!e.reverse);
            }
        }
    }

    #[test]
    fn sequence_starts_always_sampled() {
        let (_, sa, _, sampler) = setup(&[&[1, 1, 1, 2, 2], &[3, 3, 3, 3, 4]], true, false, 64);
        for (row, &p) in sa.iter().enumerate() {
            // 片段起点：全局 0 和 6
            if p == 0 || p == 6 {
                assert!(sampler.is_sampled(row), "segment start at {} not sampled", p);
                assert_eq!(sampler.entry(row).pos, 0);
            }
        }
    }

    #[test]
    fn mirrored_entries_carry_reverse_flag() {
        let (_, sa, segs, sampler) = setup(&[&[1, 2, 3, 4]], true, true, 2);
        assert_eq!(segs.len(), 2);
        let mut saw_reverse = false;
        for row in 0..sa.len() {
            if sampler.is_sampled(row) {
                let e = sampler.entry(row);
                assert_eq!(e.seq, 0);
                saw_reverse |= e.reverse;
            }
        }
        assert!(saw_reverse);
    }

    #[test]
    fn segment_map_non_delimited() {
        let segs = vec![
            Segment { len: 4, reverse: false },
            Segment { len: 4, reverse: false },
        ];
        let map = SegmentMap::new(&segs, false);
        assert_eq!(map.resolve(0), (0, 0));
        assert_eq!(map.resolve(3), (0, 3));
        assert_eq!(map.resolve(4), (1, 0));
        assert_eq!(map.resolve(7), (1, 3));
        // 末尾哨兵
        assert_eq!(map.resolve(8), (1, 4));
    }
}
