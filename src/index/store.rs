//! 索引持久化。
//!
//! 两种封装：
//! - 串行格式（`.idx`）：bincode 整体序列化，带魔数/版本校验；
//! - 快速加载格式（`.mmser`）：每个子结构 8 字节对齐并自带长度前缀，
//!   加载端 mmap 后按节批量拷出，mmap 句柄保留在返回的句柄里
//!   （内核的页缓存在后续查询期间继续生效）。

use anyhow::{anyhow, bail, Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Deref;
use std::path::Path;

use crate::index::bitvec::BitVec;
use crate::index::bwt::Segment;
use crate::index::fm::{BiFmIndex, IndexMeta, FM_MAGIC, FM_VERSION};
use crate::index::rank::{Dna4Rank, InterleavedRank, RankDict, ScanRank};
use crate::index::sampler::{SaSampler, SeqPos};

const MM_MAGIC: u64 = 0x464D_5352_4D4D_3031; // "FMSRMM01"

/// 加载后的串行/快速格式一致性校验。不匹配视为致命错误。
fn verify(index: &BiFmIndex) -> Result<()> {
    if index.magic != FM_MAGIC {
        bail!(
            "invalid index file: bad magic (expected 0x{:016X}, got 0x{:016X})",
            FM_MAGIC,
            index.magic
        );
    }
    if index.version != FM_VERSION {
        bail!(
            "unsupported index version: expected {}, got {}",
            FM_VERSION,
            index.version
        );
    }
    let kind = index.fwd.kind();
    if !index.tag.starts_with(kind.name()) {
        bail!(
            "index type tag \"{}\" does not match stored dictionary variant \"{}\"",
            index.tag,
            kind.name()
        );
    }
    if index.c.len() != index.sigma as usize + 1 {
        bail!(
            "C array has {} entries, expected sigma+1={}",
            index.c.len(),
            index.sigma + 1
        );
    }
    if index.fwd.len() != index.rev.len() {
        bail!(
            "forward/reverse dictionaries disagree on text length: {} vs {}",
            index.fwd.len(),
            index.rev.len()
        );
    }
    Ok(())
}

pub fn save_serial(index: &BiFmIndex, path: &Path) -> Result<()> {
    let f = File::create(path)
        .with_context(|| format!("cannot create index file '{}'", path.display()))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, index)
        .with_context(|| format!("cannot write index to '{}'", path.display()))?;
    w.flush()?;
    Ok(())
}

pub fn load_serial(path: &Path) -> Result<BiFmIndex> {
    let f = File::open(path)
        .with_context(|| format!("cannot open index file '{}'", path.display()))?;
    let index: BiFmIndex = bincode::deserialize_from(std::io::BufReader::new(f))
        .with_context(|| format!("index file '{}' is corrupt", path.display()))?;
    verify(&index)?;
    Ok(index)
}

/// 保留 mmap 的快速加载句柄
pub struct MmapIndex {
    pub index: BiFmIndex,
    #[allow(dead_code)]
    mmap: Mmap,
}

impl Deref for MmapIndex {
    type Target = BiFmIndex;

    fn deref(&self) -> &BiFmIndex {
        &self.index
    }
}

impl MmapIndex {
    pub fn into_inner(self) -> BiFmIndex {
        self.index
    }
}

struct SectionWriter<W: Write> {
    w: W,
    written: u64,
}

impl<W: Write> SectionWriter<W> {
    fn new(w: W) -> Self {
        Self { w, written: 0 }
    }

    fn put_u64(&mut self, v: u64) -> Result<()> {
        self.w.write_all(&v.to_le_bytes())?;
        self.written += 8;
        Ok(())
    }

    fn pad(&mut self) -> Result<()> {
        while self.written % 8 != 0 {
            self.w.write_all(&[0u8])?;
            self.written += 1;
        }
        Ok(())
    }

    /// 长度前缀（元素个数）+ 原始小端负载，补齐到 8 字节
    fn put_u8s(&mut self, data: &[u8]) -> Result<()> {
        self.put_u64(data.len() as u64)?;
        self.w.write_all(data)?;
        self.written += data.len() as u64;
        self.pad()
    }

    fn put_u32s(&mut self, data: &[u32]) -> Result<()> {
        self.put_u64(data.len() as u64)?;
        for &v in data {
            self.w.write_all(&v.to_le_bytes())?;
        }
        self.written += 4 * data.len() as u64;
        self.pad()
    }

    fn put_u64s(&mut self, data: &[u64]) -> Result<()> {
        self.put_u64(data.len() as u64)?;
        for &v in data {
            self.w.write_all(&v.to_le_bytes())?;
        }
        self.written += 8 * data.len() as u64;
        Ok(())
    }
}

struct SectionReader<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> SectionReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, off: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.off + n > self.buf.len() {
            bail!("truncated index file (need {} bytes at offset {})", n, self.off);
        }
        let s = &self.buf[self.off..self.off + n];
        self.off += n;
        Ok(s)
    }

    fn get_u64(&mut self) -> Result<u64> {
        let s = self.take(8)?;
        Ok(u64::from_le_bytes(s.try_into().unwrap()))
    }

    fn align(&mut self) {
        self.off = (self.off + 7) & !7;
    }

    fn get_u8s(&mut self) -> Result<Vec<u8>> {
        let n = self.get_u64()? as usize;
        let s = self.take(n)?;
        let v = s.to_vec();
        self.align();
        Ok(v)
    }

    fn get_u32s(&mut self) -> Result<Vec<u32>> {
        let n = self.get_u64()? as usize;
        let s = self.take(n * 4)?;
        let mut v: Vec<u32> = Vec::with_capacity(n);
        // 节起点 8 字节对齐，负载是连续小端序，整块拷出（同 mmap 加载惯例）
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), v.as_mut_ptr() as *mut u8, n * 4);
            v.set_len(n);
        }
        self.align();
        Ok(v)
    }

    fn get_u64s(&mut self) -> Result<Vec<u64>> {
        let n = self.get_u64()? as usize;
        let s = self.take(n * 8)?;
        let mut v: Vec<u64> = Vec::with_capacity(n);
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), v.as_mut_ptr() as *mut u8, n * 8);
            v.set_len(n);
        }
        Ok(v)
    }
}

fn put_bitvec<W: Write>(w: &mut SectionWriter<W>, bv: &BitVec) -> Result<()> {
    w.put_u64(bv.len)?;
    w.put_u64s(&bv.words)?;
    w.put_u32s(&bv.blocks)?;
    w.put_u64s(&bv.superblocks)
}

fn get_bitvec(r: &mut SectionReader) -> Result<BitVec> {
    Ok(BitVec {
        len: r.get_u64()?,
        words: r.get_u64s()?,
        blocks: r.get_u32s()?,
        superblocks: r.get_u64s()?,
    })
}

fn put_dict<W: Write>(w: &mut SectionWriter<W>, dict: &RankDict) -> Result<()> {
    match dict {
        RankDict::Interleaved(t) => {
            w.put_u64(0)?;
            w.put_u64(t.sigma)?;
            w.put_u64(t.len)?;
            w.put_u64s(&t.superblocks)?;
            w.put_u32s(&t.blocks)?;
            w.put_u64s(&t.words)
        }
        RankDict::Scan(t) => {
            w.put_u64(1)?;
            w.put_u64(t.sigma)?;
            w.put_u64(t.block)?;
            w.put_u8s(&t.bwt)?;
            w.put_u64s(&t.samples)
        }
        RankDict::Dna4(t) => {
            w.put_u64(2)?;
            w.put_u64(t.len)?;
            w.put_u64(t.sentinel_row)?;
            w.put_u64s(&t.packed)?;
            w.put_u32s(&t.blocks)?;
            w.put_u64s(&t.superblocks)
        }
    }
}

fn get_dict(r: &mut SectionReader) -> Result<RankDict> {
    let kind = r.get_u64()?;
    Ok(match kind {
        0 => RankDict::Interleaved(InterleavedRank {
            sigma: r.get_u64()?,
            len: r.get_u64()?,
            superblocks: r.get_u64s()?,
            blocks: r.get_u32s()?,
            words: r.get_u64s()?,
        }),
        1 => RankDict::Scan(ScanRank {
            sigma: r.get_u64()?,
            block: r.get_u64()?,
            bwt: r.get_u8s()?,
            samples: r.get_u64s()?,
        }),
        2 => RankDict::Dna4(Dna4Rank {
            len: r.get_u64()?,
            sentinel_row: r.get_u64()?,
            packed: r.get_u64s()?,
            blocks: r.get_u32s()?,
            superblocks: r.get_u64s()?,
        }),
        other => bail!("unknown rank dictionary variant tag {}", other),
    })
}

pub fn save_mmser(index: &BiFmIndex, path: &Path) -> Result<()> {
    let f = File::create(path)
        .with_context(|| format!("cannot create index file '{}'", path.display()))?;
    let mut w = SectionWriter::new(BufWriter::new(f));

    w.put_u64(MM_MAGIC)?;
    w.put_u64(FM_VERSION as u64)?;
    w.put_u64(index.sigma)?;
    w.put_u64(index.sampling_rate)?;
    let flags = (index.delimited as u64) | ((index.mirrored as u64) << 1);
    w.put_u64(flags)?;
    w.put_u8s(index.tag.as_bytes())?;

    put_dict(&mut w, &index.fwd)?;
    w.put_u64s(&index.c)?;
    put_dict(&mut w, &index.rev)?;

    // 采样器：位向量 + 三列条目
    w.put_u64(index.sampler.rate)?;
    put_bitvec(&mut w, &index.sampler.rows)?;
    let seqs: Vec<u32> = index.sampler.entries.iter().map(|e| e.seq).collect();
    let poss: Vec<u32> = index.sampler.entries.iter().map(|e| e.pos).collect();
    let revs: Vec<u8> = index.sampler.entries.iter().map(|e| e.reverse as u8).collect();
    w.put_u32s(&seqs)?;
    w.put_u32s(&poss)?;
    w.put_u8s(&revs)?;

    // 边界表：n 对 (seqLen, reverseFlag)
    let lens: Vec<u32> = index.segments.iter().map(|s| s.len).collect();
    let flags_seg: Vec<u8> = index.segments.iter().map(|s| s.reverse as u8).collect();
    w.put_u32s(&lens)?;
    w.put_u8s(&flags_seg)?;

    let meta = bincode::serialize(&index.meta)?;
    w.put_u8s(&meta)?;

    w.w.flush()?;
    Ok(())
}

pub fn load_mmser(path: &Path) -> Result<MmapIndex> {
    let f = File::open(path)
        .with_context(|| format!("cannot open index file '{}'", path.display()))?;
    let mmap = unsafe { Mmap::map(&f) }
        .with_context(|| format!("cannot mmap index file '{}'", path.display()))?;

    let mut r = SectionReader::new(&mmap);
    let magic = r.get_u64()?;
    if magic != MM_MAGIC {
        bail!(
            "invalid mmser index '{}': bad magic (expected 0x{:016X}, got 0x{:016X})",
            path.display(), MM_MAGIC, magic
        );
    }
    let version = r.get_u64()? as u32;
    let sigma = r.get_u64()?;
    let sampling_rate = r.get_u64()?;
    let flags = r.get_u64()?;
    let tag = String::from_utf8(r.get_u8s()?)
        .map_err(|_| anyhow!("index type tag is not valid UTF-8"))?;

    let fwd = get_dict(&mut r)?;
    let c = r.get_u64s()?;
    let rev = get_dict(&mut r)?;

    let rate = r.get_u64()?;
    let rows = get_bitvec(&mut r)?;
    let seqs = r.get_u32s()?;
    let poss = r.get_u32s()?;
    let revs = r.get_u8s()?;
    if seqs.len() != poss.len() || seqs.len() != revs.len() {
        bail!("sampler entry columns have inconsistent lengths");
    }
    let entries: Vec<SeqPos> = seqs
        .into_iter()
        .zip(poss)
        .zip(revs)
        .map(|((seq, pos), rv)| SeqPos { seq, pos, reverse: rv != 0 })
        .collect();
    let sampler = SaSampler { rate, rows, entries };

    let lens = r.get_u32s()?;
    let seg_flags = r.get_u8s()?;
    if lens.len() != seg_flags.len() {
        bail!("segment table columns have inconsistent lengths");
    }
    let segments: Vec<Segment> = lens
        .into_iter()
        .zip(seg_flags)
        .map(|(len, rv)| Segment { len, reverse: rv != 0 })
        .collect();

    let meta: IndexMeta = bincode::deserialize(&r.get_u8s()?)?;

    let index = BiFmIndex {
        magic: FM_MAGIC,
        version,
        sigma,
        sampling_rate,
        tag,
        fwd,
        c,
        rev,
        sampler,
        segments,
        delimited: flags & 1 != 0,
        mirrored: flags & 2 != 0,
        meta,
    };
    verify(&index)?;
    Ok(MmapIndex { index, mmap })
}

/// 按扩展名选择格式：`.mmser` 走 mmap 快路径，否则按串行格式读。
pub fn load_auto(path: &Path) -> Result<BiFmIndex> {
    if path.extension().and_then(|e| e.to_str()) == Some("mmser") {
        Ok(load_mmser(path)?.into_inner())
    } else {
        load_serial(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fm::BuildOpts;

    fn toy_index() -> BiFmIndex {
        let refs = vec![vec![1u8, 2, 3, 4, 1, 2, 3, 4], vec![2u8, 2, 4, 1]];
        let mut idx = BiFmIndex::build(
            &refs,
            BuildOpts { sampling_rate: 4, ..BuildOpts::default() },
        )
        .unwrap();
        idx.set_meta(IndexMeta {
            reference_file: Some("toy.fa".to_string()),
            build_args: Some("index toy.fa".to_string()),
            build_timestamp: Some("2024-01-01T00:00:00Z".to_string()),
        });
        idx
    }

    fn assert_same_answers(a: &BiFmIndex, b: &BiFmIndex) {
        assert_eq!(a.sigma, b.sigma);
        assert_eq!(a.size(), b.size());
        assert_eq!(a.c, b.c);
        assert_eq!(a.segments, b.segments);
        for pat in [&[1u8, 2][..], &[2, 3, 4], &[4, 1], &[1, 2, 3, 4]] {
            let ca = a.backward_search(pat).map(|c| (c.lb, c.len, c.lb_rev));
            let cb = b.backward_search(pat).map(|c| (c.lb, c.len, c.lb_rev));
            assert_eq!(ca, cb, "pattern {:?}", pat);
        }
        for row in 0..a.size() {
            assert_eq!(a.locate(row), b.locate(row), "row {}", row);
        }
    }

    #[test]
    fn serial_roundtrip_and_idempotence() {
        let idx = toy_index();
        let p1 = std::env::temp_dir().join("fmsearch_rust_test_serial.idx");
        let p2 = std::env::temp_dir().join("fmsearch_rust_test_serial2.idx");
        save_serial(&idx, &p1).unwrap();
        let loaded = load_serial(&p1).unwrap();
        assert_same_answers(&idx, &loaded);
        save_serial(&loaded, &p2).unwrap();
        let b1 = std::fs::read(&p1).unwrap();
        let b2 = std::fs::read(&p2).unwrap();
        assert_eq!(b1, b2, "reserialization must be byte-identical");
        std::fs::remove_file(&p1).ok();
        std::fs::remove_file(&p2).ok();
    }

    #[test]
    fn mmser_roundtrip_and_idempotence() {
        let idx = toy_index();
        let p1 = std::env::temp_dir().join("fmsearch_rust_test_a.mmser");
        let p2 = std::env::temp_dir().join("fmsearch_rust_test_b.mmser");
        save_mmser(&idx, &p1).unwrap();
        let loaded = load_mmser(&p1).unwrap();
        assert_same_answers(&idx, &loaded.index);
        save_mmser(&loaded.index, &p2).unwrap();
        let b1 = std::fs::read(&p1).unwrap();
        let b2 = std::fs::read(&p2).unwrap();
        assert_eq!(b1, b2);
        std::fs::remove_file(&p1).ok();
        std::fs::remove_file(&p2).ok();
    }

    #[test]
    fn load_detects_bad_magic() {
        let p = std::env::temp_dir().join("fmsearch_rust_test_bad.mmser");
        std::fs::write(&p, [0u8; 64]).unwrap();
        assert!(load_mmser(&p).is_err());
        std::fs::remove_file(&p).ok();
    }

    #[test]
    fn load_auto_picks_format_by_extension() {
        let idx = toy_index();
        let ps = std::env::temp_dir().join("fmsearch_rust_test_auto.idx");
        let pm = std::env::temp_dir().join("fmsearch_rust_test_auto.mmser");
        save_serial(&idx, &ps).unwrap();
        save_mmser(&idx, &pm).unwrap();
        let a = load_auto(&ps).unwrap();
        let b = load_auto(&pm).unwrap();
        assert_same_answers(&a, &b);
        std::fs::remove_file(&ps).ok();
        std::fs::remove_file(&pm).ok();
    }
}
