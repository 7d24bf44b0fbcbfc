//! 排名字典后端（occurrence 表）。
//!
//! 统一契约：`rank(c, i)` = BWT 前 i 个符号中 c 的个数；
//! `prefix_rank(c, i)` = 排名不大于 c 的符号个数；`symbol_at(i)` = BWT[i]。
//! 三个实现按空间/延迟取舍：
//!
//! - [`InterleavedRank`]：每符号位平面，512 位块 + 64Ki 超块两级计数，默认；
//! - [`ScanRank`]：保留 BWT 原文 + 按块采样计数，块内顺扫补偿（空间大、实现最简）；
//! - [`Dna4Rank`]：2 bit 紧凑编码，σ=5 且文本只含一个哨兵时可用，
//!   哨兵行单独记录（同 BWA 的 primary 处理）。
//!
//! 存储边界用带标签的枚举 [`RankDict`] 分发；打开索引时匹配一次，
//! 热路径内不做动态分发。

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

const WORD_BITS: usize = 64;
const BLOCK_BITS: usize = 512;
const SUPER_BITS: usize = 1 << 16;
const WORDS_PER_BLOCK: usize = BLOCK_BITS / WORD_BITS;

/// 后端种类标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankKind {
    Interleaved,
    Scan,
    Dna4,
}

impl RankKind {
    pub fn name(self) -> &'static str {
        match self {
            RankKind::Interleaved => "interleaved",
            RankKind::Scan => "scan",
            RankKind::Dna4 => "dna4",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "interleaved" => Ok(RankKind::Interleaved),
            "scan" => Ok(RankKind::Scan),
            "dna4" => Ok(RankKind::Dna4),
            other => bail!("unknown index type \"{}\"", other),
        }
    }
}

/// 每符号位平面 + 两级计数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterleavedRank {
    pub(crate) sigma: u64,
    pub(crate) len: u64,
    /// 超块绝对计数，[n_super][sigma]
    pub(crate) superblocks: Vec<u64>,
    /// 块内相对计数（相对所在超块），[n_block][sigma]
    pub(crate) blocks: Vec<u32>,
    /// 位平面，按块交错：[n_block][sigma][8] 个 u64
    pub(crate) words: Vec<u64>,
}

impl InterleavedRank {
    pub fn build(bwt: &[u8], sigma: usize) -> Self {
        let n = bwt.len();
        let n_blocks = n.div_ceil(BLOCK_BITS).max(1);
        let n_super = n.div_ceil(SUPER_BITS).max(1);
        let mut words = vec![0u64; n_blocks * sigma * WORDS_PER_BLOCK];
        for (i, &c) in bwt.iter().enumerate() {
            debug_assert!((c as usize) < sigma);
            let bl = i / BLOCK_BITS;
            let w = (i % BLOCK_BITS) / WORD_BITS;
            words[(bl * sigma + c as usize) * WORDS_PER_BLOCK + w] |= 1u64 << (i % WORD_BITS);
        }

        let mut superblocks = vec![0u64; n_super * sigma];
        let mut blocks = vec![0u32; n_blocks * sigma];
        let mut totals = vec![0u64; sigma];
        for bl in 0..n_blocks {
            if bl * BLOCK_BITS % SUPER_BITS == 0 {
                let sb = bl * BLOCK_BITS / SUPER_BITS;
                superblocks[sb * sigma..(sb + 1) * sigma].copy_from_slice(&totals);
            }
            let sb = bl * BLOCK_BITS / SUPER_BITS;
            for c in 0..sigma {
                blocks[bl * sigma + c] = (totals[c] - superblocks[sb * sigma + c]) as u32;
                let base = (bl * sigma + c) * WORDS_PER_BLOCK;
                for w in 0..WORDS_PER_BLOCK {
                    totals[c] += words[base + w].count_ones() as u64;
                }
            }
        }

        Self {
            sigma: sigma as u64,
            len: n as u64,
            superblocks,
            blocks,
            words,
        }
    }

    #[inline]
    pub fn rank(&self, c: u8, i: usize) -> usize {
        debug_assert!(i <= self.len as usize);
        let sigma = self.sigma as usize;
        let c = c as usize;
        let bl = i / BLOCK_BITS;
        let sb = i / SUPER_BITS;
        let mut cnt = self.superblocks[sb * sigma + c] + self.blocks[bl * sigma + c] as u64;
        let base = (bl * sigma + c) * WORDS_PER_BLOCK;
        let w = (i % BLOCK_BITS) / WORD_BITS;
        for j in 0..w {
            cnt += self.words[base + j].count_ones() as u64;
        }
        let rem = i % WORD_BITS;
        if rem > 0 {
            let mask = (1u64 << rem) - 1;
            cnt += (self.words[base + w] & mask).count_ones() as u64;
        }
        cnt as usize
    }

    #[inline]
    pub fn prefix_rank(&self, c: u8, i: usize) -> usize {
        let mut cnt = 0;
        for s in 0..=c {
            cnt += self.rank(s, i);
        }
        cnt
    }

    #[inline]
    pub fn symbol_at(&self, i: usize) -> u8 {
        debug_assert!(i < self.len as usize);
        let sigma = self.sigma as usize;
        let bl = i / BLOCK_BITS;
        let w = (i % BLOCK_BITS) / WORD_BITS;
        let bit = 1u64 << (i % WORD_BITS);
        for c in 0..sigma {
            if self.words[(bl * sigma + c) * WORDS_PER_BLOCK + w] & bit != 0 {
                return c as u8;
            }
        }
        unreachable!("position {} carries no symbol in any bitplane", i)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }
}

/// 保留 BWT 字节 + 按块采样（教科书式基线）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRank {
    pub(crate) sigma: u64,
    pub(crate) block: u64,
    pub(crate) bwt: Vec<u8>,
    /// 块起点的绝对计数：samples[block_id * sigma + c]
    pub(crate) samples: Vec<u64>,
}

impl ScanRank {
    pub fn build(bwt: &[u8], sigma: usize) -> Self {
        Self::with_block(bwt, sigma, BLOCK_BITS)
    }

    pub fn with_block(bwt: &[u8], sigma: usize, block: usize) -> Self {
        let n = bwt.len();
        let n_blocks = n.div_ceil(block).max(1);
        let mut samples = vec![0u64; n_blocks * sigma];
        let mut running = vec![0u64; sigma];
        for bi in 0..n_blocks {
            samples[bi * sigma..(bi + 1) * sigma].copy_from_slice(&running);
            let start = bi * block;
            let end = ((bi + 1) * block).min(n);
            for &ch in &bwt[start..end] {
                running[ch as usize] += 1;
            }
        }
        Self {
            sigma: sigma as u64,
            block: block as u64,
            bwt: bwt.to_vec(),
            samples,
        }
    }

    #[inline]
    pub fn rank(&self, c: u8, i: usize) -> usize {
        debug_assert!(i <= self.bwt.len());
        if i == 0 {
            return 0;
        }
        let sigma = self.sigma as usize;
        let block = self.block as usize;
        let bi = (i - 1) / block;
        let mut cnt = self.samples[bi * sigma + c as usize];
        for &ch in &self.bwt[bi * block..i] {
            if ch == c {
                cnt += 1;
            }
        }
        cnt as usize
    }

    #[inline]
    pub fn prefix_rank(&self, c: u8, i: usize) -> usize {
        if i == 0 {
            return 0;
        }
        let sigma = self.sigma as usize;
        let block = self.block as usize;
        let bi = (i - 1) / block;
        let mut cnt = 0u64;
        for s in 0..=c as usize {
            cnt += self.samples[bi * sigma + s];
        }
        for &ch in &self.bwt[bi * block..i] {
            if ch <= c {
                cnt += 1;
            }
        }
        cnt as usize
    }

    #[inline]
    pub fn symbol_at(&self, i: usize) -> u8 {
        self.bwt[i]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bwt.len()
    }
}

/// 2 bit 紧凑编码的 ACGT 后端。要求文本只含一个哨兵。
/// 哨兵行在 packed 里占位为 A，rank 时按 sentinel_row 修正。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dna4Rank {
    pub(crate) len: u64,
    pub(crate) sentinel_row: u64,
    /// 每 u64 存 32 个符号，2 bit 编码（A=0 C=1 G=2 T=3）
    pub(crate) packed: Vec<u64>,
    /// 块起点相对超块的计数，[n_block][4]
    pub(crate) blocks: Vec<u32>,
    /// 超块绝对计数，[n_super][4]
    pub(crate) superblocks: Vec<u64>,
}

const DNA4_PAIRS_PER_WORD: usize = 32;
const DNA4_BLOCK: usize = 512; // 符号数，16 个 u64
const DNA4_WORDS_PER_BLOCK: usize = DNA4_BLOCK / DNA4_PAIRS_PER_WORD;
const DNA4_SUPER: usize = 1 << 16;

/// 一个 u64 中与 2 bit 码 v 相等的符号个数
#[inline]
fn count_pairs_eq(word: u64, v: u64) -> u64 {
    let x = word ^ (v.wrapping_mul(0x5555_5555_5555_5555));
    let y = !x & (!x >> 1) & 0x5555_5555_5555_5555;
    y.count_ones() as u64
}

impl Dna4Rank {
    /// bwt 的符号必须落在 {0,1,2,3,4} 且 0 恰好出现一次
    pub fn build(bwt: &[u8], sigma: usize) -> Result<Self> {
        if sigma > 5 {
            bail!(
                "index type dna4 supports alphabet {{$,A,C,G,T}}, got sigma={}; \
                 re-encode N characters first",
                sigma
            );
        }
        let sentinels = bwt.iter().filter(|&&c| c == 0).count();
        if sentinels != 1 {
            bail!(
                "index type dna4 requires exactly one sentinel in the text (found {}); \
                 build with --no-delim or a single sequence",
                sentinels
            );
        }
        let n = bwt.len();
        let sentinel_row = bwt.iter().position(|&c| c == 0).unwrap() as u64;
        let n_blocks = n.div_ceil(DNA4_BLOCK).max(1);
        let mut packed = vec![0u64; n_blocks * DNA4_WORDS_PER_BLOCK];
        for (i, &c) in bwt.iter().enumerate() {
            let code = c.saturating_sub(1) as u64; // 哨兵占位为 A
            packed[i / DNA4_PAIRS_PER_WORD] |= code << (2 * (i % DNA4_PAIRS_PER_WORD));
        }

        // 真实计数（哨兵不计入 A）
        let n_super = n.div_ceil(DNA4_SUPER).max(1);
        let mut superblocks = vec![0u64; n_super * 4];
        let mut blocks = vec![0u32; n_blocks * 4];
        let mut totals = [0u64; 4];
        for bl in 0..n_blocks {
            if bl * DNA4_BLOCK % DNA4_SUPER == 0 {
                let sb = bl * DNA4_BLOCK / DNA4_SUPER;
                superblocks[sb * 4..(sb + 1) * 4].copy_from_slice(&totals);
            }
            let sb = bl * DNA4_BLOCK / DNA4_SUPER;
            for c in 0..4 {
                blocks[bl * 4 + c] = (totals[c] - superblocks[sb * 4 + c]) as u32;
            }
            let start = bl * DNA4_BLOCK;
            let end = ((bl + 1) * DNA4_BLOCK).min(n);
            for &ch in &bwt[start..end] {
                if ch > 0 {
                    totals[ch as usize - 1] += 1;
                }
            }
        }

        Ok(Self {
            len: n as u64,
            sentinel_row,
            packed,
            blocks,
            superblocks,
        })
    }

    #[inline]
    pub fn rank(&self, c: u8, i: usize) -> usize {
        debug_assert!(i <= self.len as usize);
        if c == 0 {
            return if (i as u64) > self.sentinel_row { 1 } else { 0 };
        }
        if c > 4 || i == 0 {
            return 0;
        }
        let code = (c - 1) as u64;
        let bl = i / DNA4_BLOCK;
        let sb = i / DNA4_SUPER;
        let mut cnt = self.superblocks[sb * 4 + code as usize] + self.blocks[bl * 4 + code as usize] as u64;
        let base = bl * DNA4_WORDS_PER_BLOCK;
        let w = (i % DNA4_BLOCK) / DNA4_PAIRS_PER_WORD;
        for j in 0..w {
            cnt += count_pairs_eq(self.packed[base + j], code);
        }
        let rem = i % DNA4_PAIRS_PER_WORD;
        if rem > 0 {
            let x = self.packed[base + w] ^ code.wrapping_mul(0x5555_5555_5555_5555);
            let valid = 0x5555_5555_5555_5555u64 & ((1u64 << (2 * rem)) - 1);
            cnt += (!x & (!x >> 1) & valid).count_ones() as u64;
        }
        // 块内扫描把哨兵占位算成了 A，修正
        if code == 0 {
            let s = self.sentinel_row as usize;
            if s >= bl * DNA4_BLOCK && s < i {
                cnt -= 1;
            }
        }
        cnt as usize
    }

    #[inline]
    pub fn prefix_rank(&self, c: u8, i: usize) -> usize {
        let mut cnt = 0;
        for s in 0..=c {
            cnt += self.rank(s, i);
        }
        cnt
    }

    #[inline]
    pub fn symbol_at(&self, i: usize) -> u8 {
        debug_assert!(i < self.len as usize);
        if i as u64 == self.sentinel_row {
            return 0;
        }
        let code = (self.packed[i / DNA4_PAIRS_PER_WORD] >> (2 * (i % DNA4_PAIRS_PER_WORD))) & 3;
        code as u8 + 1
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }
}

/// 带标签的后端分发
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankDict {
    Interleaved(InterleavedRank),
    Scan(ScanRank),
    Dna4(Dna4Rank),
}

impl RankDict {
    pub fn build(kind: RankKind, bwt: &[u8], sigma: usize) -> Result<Self> {
        Ok(match kind {
            RankKind::Interleaved => RankDict::Interleaved(InterleavedRank::build(bwt, sigma)),
            RankKind::Scan => RankDict::Scan(ScanRank::build(bwt, sigma)),
            RankKind::Dna4 => RankDict::Dna4(Dna4Rank::build(bwt, sigma)?),
        })
    }

    pub fn kind(&self) -> RankKind {
        match self {
            RankDict::Interleaved(_) => RankKind::Interleaved,
            RankDict::Scan(_) => RankKind::Scan,
            RankDict::Dna4(_) => RankKind::Dna4,
        }
    }

    #[inline]
    pub fn rank(&self, c: u8, i: usize) -> usize {
        match self {
            RankDict::Interleaved(t) => t.rank(c, i),
            RankDict::Scan(t) => t.rank(c, i),
            RankDict::Dna4(t) => t.rank(c, i),
        }
    }

    #[inline]
    pub fn prefix_rank(&self, c: u8, i: usize) -> usize {
        match self {
            RankDict::Interleaved(t) => t.prefix_rank(c, i),
            RankDict::Scan(t) => t.prefix_rank(c, i),
            RankDict::Dna4(t) => t.prefix_rank(c, i),
        }
    }

    #[inline]
    pub fn symbol_at(&self, i: usize) -> u8 {
        match self {
            RankDict::Interleaved(t) => t.symbol_at(i),
            RankDict::Scan(t) => t.symbol_at(i),
            RankDict::Dna4(t) => t.symbol_at(i),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            RankDict::Interleaved(t) => t.len(),
            RankDict::Scan(t) => t.len(),
            RankDict::Dna4(t) => t.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Lcg;

    fn naive_rank(bwt: &[u8], c: u8, i: usize) -> usize {
        bwt[..i].iter().filter(|&&x| x == c).count()
    }

    fn random_bwt(n: usize, sigma: u8, seed: u32) -> Vec<u8> {
        let mut rng = Lcg::new(seed);
        (0..n).map(|_| (rng.next() % sigma as u32) as u8).collect()
    }

    fn check_backend(dict: &RankDict, bwt: &[u8], sigma: usize) {
        let n = bwt.len();
        assert_eq!(dict.len(), n);
        // 全位置对拍太慢，跳步 + 边界
        let mut probes: Vec<usize> = (0..n.min(600)).collect();
        probes.extend([n / 2, n.saturating_sub(1), n]);
        for &i in &probes {
            let mut prefix = 0;
            for c in 0..sigma as u8 {
                let expect = naive_rank(bwt, c, i);
                assert_eq!(dict.rank(c, i), expect, "rank({}, {})", c, i);
                prefix += expect;
                assert_eq!(dict.prefix_rank(c, i), prefix, "prefix_rank({}, {})", c, i);
            }
        }
        for i in (0..n).step_by(97) {
            assert_eq!(dict.symbol_at(i), bwt[i], "symbol_at({})", i);
        }
    }

    #[test]
    fn interleaved_matches_naive() {
        let bwt = random_bwt(3 * SUPER_BITS / 2 + 311, 6, 11);
        let dict = RankDict::build(RankKind::Interleaved, &bwt, 6).unwrap();
        check_backend(&dict, &bwt, 6);
    }

    #[test]
    fn scan_matches_naive() {
        let bwt = random_bwt(2000, 6, 13);
        let dict = RankDict::build(RankKind::Scan, &bwt, 6).unwrap();
        check_backend(&dict, &bwt, 6);
    }

    #[test]
    fn dna4_matches_naive() {
        // 单哨兵：符号 1..=4，把中间某个位置设为 0
        let mut bwt = random_bwt(2 * DNA4_SUPER + 700, 4, 17);
        for b in bwt.iter_mut() {
            *b += 1;
        }
        let mid = bwt.len() / 3;
        bwt[mid] = 0;
        let dict = RankDict::build(RankKind::Dna4, &bwt, 5).unwrap();
        check_backend(&dict, &bwt, 5);
    }

    #[test]
    fn dna4_rejects_multiple_sentinels() {
        let bwt = vec![1u8, 0, 2, 0, 3];
        assert!(Dna4Rank::build(&bwt, 5).is_err());
        let no_sentinel = vec![1u8, 2, 3];
        assert!(Dna4Rank::build(&no_sentinel, 5).is_err());
    }

    #[test]
    fn interleaved_rank_at_len_equals_totals() {
        let bwt = random_bwt(1000, 6, 19);
        let dict = InterleavedRank::build(&bwt, 6);
        for c in 0..6u8 {
            assert_eq!(dict.rank(c, 1000), naive_rank(&bwt, c, 1000));
        }
        assert_eq!(dict.prefix_rank(5, 1000), 1000);
    }

    #[test]
    fn kind_names_roundtrip() {
        for kind in [RankKind::Interleaved, RankKind::Scan, RankKind::Dna4] {
            assert_eq!(RankKind::from_name(kind.name()).unwrap(), kind);
        }
        assert!(RankKind::from_name("wavelet").is_err());
    }
}
