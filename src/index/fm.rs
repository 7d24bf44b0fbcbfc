use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::index::bwt::{assemble_text, build_bwt, Segment};
use crate::index::rank::{RankDict, RankKind};
use crate::index::sa::build_sa;
use crate::index::sampler::{SaSampler, SegmentMap, SeqPos};

pub const FM_MAGIC: u64 = 0x464D_5352_5F42_4931; // "FMSR_BI1"
pub const FM_VERSION: u32 = 1;

/// 构建辅助信息（不参与查询）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 双向游标：正向 BWT 上的区间 [lb, lb+len) 与反向 BWT 上对应区间的起点。
/// 两侧区间长度恒等，这是双向扩展的核心不变量。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub lb: usize,
    pub len: usize,
    pub lb_rev: usize,
}

impl Cursor {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BuildOpts {
    pub sampling_rate: usize,
    pub kind: RankKind,
    pub delimited: bool,
    pub include_reverse: bool,
}

impl Default for BuildOpts {
    fn default() -> Self {
        Self {
            sampling_rate: 16,
            kind: RankKind::Interleaved,
            delimited: true,
            include_reverse: false,
        }
    }
}

/// 双向 FM 索引。
///
/// 序列化布局（bincode，字段序即字节序）：魔数、版本、σ、采样率、类型标签、
/// 正向排名字典、C 表、反向排名字典、SA 采样器、片段边界表、模式标志、元信息。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiFmIndex {
    pub magic: u64,
    pub version: u32,
    pub sigma: u64,
    pub sampling_rate: u64,
    /// 形如 "interleaved"、"dna4-nd"、"interleaved-rev"、"scan-nd-rev"
    pub tag: String,
    pub fwd: RankDict,
    /// C[c] = 文本中排名 < c 的符号个数，共 σ+1 项
    pub c: Vec<u64>,
    pub rev: RankDict,
    pub sampler: SaSampler,
    pub segments: Vec<Segment>,
    pub delimited: bool,
    pub mirrored: bool,
    pub meta: IndexMeta,
}

fn make_tag(kind: RankKind, delimited: bool, mirrored: bool) -> String {
    let mut tag = kind.name().to_string();
    if !delimited {
        tag.push_str("-nd");
    }
    if mirrored {
        tag.push_str("-rev");
    }
    tag
}

impl BiFmIndex {
    /// 从排名编码的参考序列集合构建索引。
    ///
    /// 流程：拼接文本 → 后缀数组 → BWT → 正向排名字典 + C 表 →
    /// SA 采样器 → 反向文本重复一遍得到反向排名字典。
    pub fn build(refs: &[Vec<u8>], opts: BuildOpts) -> Result<Self> {
        if refs.is_empty() {
            bail!("reference collection is empty");
        }
        for (i, r) in refs.iter().enumerate() {
            if r.is_empty() {
                bail!("reference sequence {} is empty", i);
            }
        }
        let sigma: usize = if opts.kind == RankKind::Dna4 { 5 } else { crate::alphabet::SIGMA };
        for (i, r) in refs.iter().enumerate() {
            if let Some(pos) = r.iter().position(|&c| c == 0 || c as usize >= sigma) {
                bail!(
                    "reference sequence {} has rank {} at position {} (alphabet size {})",
                    i, r[pos], pos, sigma
                );
            }
        }
        if opts.sampling_rate == 0 {
            bail!("sampling rate must be positive");
        }

        let (text, segments) = assemble_text(refs, opts.delimited, opts.include_reverse);

        let sa = build_sa(&text);
        let bwt = build_bwt(&text, &sa);
        let fwd = RankDict::build(opts.kind, &bwt, sigma)?;

        let mut counts = vec![0u64; sigma];
        for &ch in &text {
            counts[ch as usize] += 1;
        }
        let mut c = vec![0u64; sigma + 1];
        for s in 0..sigma {
            c[s + 1] = c[s] + counts[s];
        }

        let sampler = SaSampler::build(&sa, &text, &segments, opts.delimited, opts.sampling_rate);

        // 反向文本上重复 SA/BWT，得到 extendRight 所需的排名字典。
        // 整体反转会把终止哨兵带到开头，这里转回末尾：反向文本必须同样
        // 以哨兵收尾，否则回绕进 BWT 的是普通碱基，排名扩展在多序列
        // 文本上会错位。
        let mut text_rev: Vec<u8> = text.iter().rev().copied().collect();
        text_rev.rotate_left(1);
        let sa_rev = build_sa(&text_rev);
        let bwt_rev = build_bwt(&text_rev, &sa_rev);
        let rev = RankDict::build(opts.kind, &bwt_rev, sigma)?;

        Ok(Self {
            magic: FM_MAGIC,
            version: FM_VERSION,
            sigma: sigma as u64,
            sampling_rate: opts.sampling_rate as u64,
            tag: make_tag(opts.kind, opts.delimited, opts.include_reverse),
            fwd,
            c,
            rev,
            sampler,
            segments,
            delimited: opts.delimited,
            mirrored: opts.include_reverse,
            meta: IndexMeta::default(),
        })
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = meta;
    }

    /// 文本总长 N'（含哨兵）
    #[inline]
    pub fn size(&self) -> usize {
        self.fwd.len()
    }

    #[inline]
    pub fn sigma(&self) -> usize {
        self.sigma as usize
    }

    /// 全区间游标
    #[inline]
    pub fn initial_cursor(&self) -> Cursor {
        Cursor {
            lb: 0,
            len: self.size(),
            lb_rev: 0,
        }
    }

    /// 在已积累的模式左侧添上符号 c。区间为空或 c 不在字母表内时返回 None。
    #[inline]
    pub fn extend_left(&self, cur: Cursor, ch: u8) -> Option<Cursor> {
        if ch as usize >= self.sigma as usize || cur.len == 0 {
            return None;
        }
        let l = cur.lb;
        let r = cur.lb + cur.len;
        let rl = self.fwd.rank(ch, l);
        let rr = self.fwd.rank(ch, r);
        if rl == rr {
            return None;
        }
        let smaller = if ch == 0 {
            0
        } else {
            self.fwd.prefix_rank(ch - 1, r) - self.fwd.prefix_rank(ch - 1, l)
        };
        Some(Cursor {
            lb: self.c[ch as usize] as usize + rl,
            len: rr - rl,
            lb_rev: cur.lb_rev + smaller,
        })
    }

    /// 在右侧添上符号 c，镜像版 extend_left（走反向排名字典）。
    #[inline]
    pub fn extend_right(&self, cur: Cursor, ch: u8) -> Option<Cursor> {
        if ch as usize >= self.sigma as usize || cur.len == 0 {
            return None;
        }
        let l = cur.lb_rev;
        let r = cur.lb_rev + cur.len;
        let rl = self.rev.rank(ch, l);
        let rr = self.rev.rank(ch, r);
        if rl == rr {
            return None;
        }
        let smaller = if ch == 0 {
            0
        } else {
            self.rev.prefix_rank(ch - 1, r) - self.rev.prefix_rank(ch - 1, l)
        };
        Some(Cursor {
            lb: cur.lb + smaller,
            len: rr - rl,
            lb_rev: self.c[ch as usize] as usize + rl,
        })
    }

    /// 模式整体反向搜索（k=0 快路径用），等价于对每个符号 extend_left。
    pub fn backward_search(&self, pattern: &[u8]) -> Option<Cursor> {
        let mut cur = self.initial_cursor();
        for &ch in pattern.iter().rev() {
            cur = self.extend_left(cur, ch)?;
        }
        Some(cur)
    }

    /// LF 映射一步
    #[inline]
    pub fn lf(&self, row: usize) -> usize {
        let ch = self.fwd.symbol_at(row);
        self.c[ch as usize] as usize + self.fwd.rank(ch, row)
    }

    /// 把 BWT 行还原为片段坐标。返回 (采样条目, 回走步数)，
    /// 最终片段内偏移 = entry.pos + offset。
    /// 采样规则保证至多 rate 步；超出即索引损坏。
    pub fn locate(&self, row: usize) -> (SeqPos, usize) {
        let mut row = row;
        let mut offset = 0usize;
        while !self.sampler.is_sampled(row) {
            row = self.lf(row);
            offset += 1;
            assert!(
                offset <= self.sampler.rate(),
                "locate walked {} LF steps (rate {}): index corrupt",
                offset,
                self.sampler.rate()
            );
        }
        (self.sampler.entry(row), offset)
    }

    /// 片段坐标辅助表
    pub fn segment_map(&self) -> SegmentMap {
        SegmentMap::new(&self.segments, self.delimited)
    }

    /// (seq, reverse) 对应片段的长度
    #[inline]
    pub fn seg_len(&self, seq: u32, reverse: bool) -> usize {
        let n_fwd = self.segments.iter().filter(|s| !s.reverse).count();
        let idx = if reverse { n_fwd + seq as usize } else { seq as usize };
        self.segments[idx].len as usize
    }

    /// 非 delimited 模式下，起点可能落在靠前的片段而溢出其长度；
    /// 沿平铺布局向后归一化。返回 (seq, pos, reverse)。
    pub fn normalize_hit(&self, seq: u32, pos: usize, reverse: bool) -> (u32, usize, bool) {
        if self.delimited {
            return (seq, pos, reverse);
        }
        let n_fwd = self.segments.iter().filter(|s| !s.reverse).count();
        let mut idx = if reverse { n_fwd + seq as usize } else { seq as usize };
        let mut pos = pos;
        while idx + 1 < self.segments.len() && pos >= self.segments[idx].len as usize {
            pos -= self.segments[idx].len as usize;
            idx += 1;
        }
        let seg = self.segments[idx];
        let seq = if idx < n_fwd { idx as u32 } else { (idx - n_fwd) as u32 };
        (seq, pos, seg.reverse)
    }

    pub fn kind(&self) -> RankKind {
        self.fwd.kind()
    }
}
