//! 字母表模块：把 DNA 字符映射为排名（rank）编码。
//!
//! 排名约定：`0:$（分隔符/哨兵）, 1:A, 2:C, 3:G, 4:T, 5:N`。
//! 索引与查询全部在排名空间中运算；字符层只在 IO 边界出现。

use anyhow::{bail, Result};

/// 字母表大小（含哨兵与 N）
pub const SIGMA: usize = 6;
/// 哨兵排名
pub const SENTINEL: u8 = 0;
/// N / 填充符排名（σ-1）
pub const RANK_N: u8 = 5;

/// 遇到未知字符时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownPolicy {
    /// 直接报错（默认）
    Fail,
    /// 映射为 N（对应 `--ignore_unknown`）
    MapToN,
    /// 伪随机替换为 {A,C,G,T} 之一（对应 `--dna4`）
    RandomDna4,
}

#[inline]
pub fn to_rank(b: u8) -> Option<u8> {
    match b.to_ascii_uppercase() {
        b'$' => Some(0),
        b'A' => Some(1),
        b'C' => Some(2),
        b'G' => Some(3),
        b'T' | b'U' => Some(4),
        b'N' => Some(5),
        _ => None,
    }
}

#[inline]
pub fn from_rank(r: u8) -> u8 {
    match r {
        0 => b'$',
        1 => b'A',
        2 => b'C',
        3 => b'G',
        4 => b'T',
        _ => b'N',
    }
}

/// 将字符序列转换为排名序列。未知字符按策略处理。
/// `rng` 仅在 `RandomDna4` 策略下使用，跨调用传同一个状态可保证可重现。
pub fn seq_to_ranks(seq: &[u8], policy: UnknownPolicy, rng: &mut Lcg) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(seq.len());
    for (i, &b) in seq.iter().enumerate() {
        match to_rank(b) {
            Some(0) => bail!("sequence contains a literal '$' at position {}", i),
            Some(r) => out.push(r),
            None => match policy {
                UnknownPolicy::Fail => {
                    bail!(
                        "invalid character '{}' (0x{:02x}) at position {}",
                        b as char, b, i
                    )
                }
                UnknownPolicy::MapToN => out.push(RANK_N),
                UnknownPolicy::RandomDna4 => out.push(1 + (rng.next() % 4) as u8),
            },
        }
    }
    Ok(out)
}

/// 排名空间的互补：A<->T, C<->G；$ 与 N 保持不变。
#[inline]
pub fn complement_rank(r: u8) -> u8 {
    match r {
        1 => 4,
        2 => 3,
        3 => 2,
        4 => 1,
        other => other,
    }
}

/// 排名序列的反向互补
pub fn revcomp_ranks(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&r| complement_rank(r)).collect()
}

/// 线性同余伪随机数发生器，确定性、无外部依赖。
/// 与 bench 里构造随机参考序列用的是同一套常数。
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    #[inline]
    pub fn next(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.state >> 16
    }

    /// [0, bound) 的伪随机数，bound 为 0 时返回 0
    #[inline]
    pub fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        self.next() as usize % bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_roundtrip() {
        for (ch, r) in [(b'A', 1u8), (b'C', 2), (b'G', 3), (b'T', 4), (b'N', 5)] {
            assert_eq!(to_rank(ch), Some(r));
            assert_eq!(to_rank(ch.to_ascii_lowercase()), Some(r));
            assert_eq!(from_rank(r), ch);
        }
        assert_eq!(to_rank(b'U'), Some(4));
        assert_eq!(to_rank(b'$'), Some(0));
        assert_eq!(to_rank(b'X'), None);
    }

    #[test]
    fn seq_to_ranks_fail_policy() {
        let mut rng = Lcg::new(1);
        let ok = seq_to_ranks(b"ACGTN", UnknownPolicy::Fail, &mut rng).unwrap();
        assert_eq!(ok, vec![1, 2, 3, 4, 5]);
        assert!(seq_to_ranks(b"ACXT", UnknownPolicy::Fail, &mut rng).is_err());
        assert!(seq_to_ranks(b"AC$T", UnknownPolicy::Fail, &mut rng).is_err());
    }

    #[test]
    fn seq_to_ranks_map_to_n() {
        let mut rng = Lcg::new(1);
        let out = seq_to_ranks(b"AXRT", UnknownPolicy::MapToN, &mut rng).unwrap();
        assert_eq!(out, vec![1, RANK_N, RANK_N, 4]);
    }

    #[test]
    fn seq_to_ranks_random_dna4_stays_acgt() {
        let mut rng = Lcg::new(42);
        let out = seq_to_ranks(b"XXXXXXXX", UnknownPolicy::RandomDna4, &mut rng).unwrap();
        assert!(out.iter().all(|&r| (1..=4).contains(&r)));
        // 同种子可重现
        let mut rng2 = Lcg::new(42);
        let out2 = seq_to_ranks(b"XXXXXXXX", UnknownPolicy::RandomDna4, &mut rng2).unwrap();
        assert_eq!(out, out2);
    }

    #[test]
    fn revcomp_ranks_basic() {
        // ACGTN -> NACGT
        let seq = vec![1u8, 2, 3, 4, 5];
        let rc = revcomp_ranks(&seq);
        assert_eq!(rc, vec![5, 1, 2, 3, 4]);
        assert_eq!(revcomp_ranks(&rc), seq);
    }
}
