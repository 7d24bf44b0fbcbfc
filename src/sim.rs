//! 读段模拟器：从参考序列抽取子串并注入错误，生成查询用的 FASTA。
//! 随机数用确定性 LCG，同一种子输出完全可重现。

use anyhow::{bail, Result};
use std::io::Write;

use crate::alphabet::Lcg;
use crate::io::fasta::FastaRecord;

#[derive(Debug, Clone, Copy)]
pub struct SimOpts {
    pub count: usize,
    pub length: usize,
    pub errors: usize,
    /// 注入插入/删除（否则只做替换）
    pub indels: bool,
    pub seed: u32,
}

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

fn substitute(b: u8, rng: &mut Lcg) -> u8 {
    loop {
        let cand = BASES[rng.below(4)];
        if cand != b {
            return cand;
        }
    }
}

/// 逐条写出模拟读段，头行携带来源坐标，便于对拍。
pub fn simulate<W: Write>(refs: &[FastaRecord], opts: SimOpts, out: &mut W) -> Result<()> {
    if refs.is_empty() {
        bail!("reference collection is empty");
    }
    let usable: Vec<&FastaRecord> = refs.iter().filter(|r| r.seq.len() >= opts.length).collect();
    if usable.is_empty() {
        bail!(
            "no reference sequence is at least {} characters long",
            opts.length
        );
    }
    if opts.length == 0 {
        bail!("read length must be positive");
    }

    let mut rng = Lcg::new(opts.seed);
    for i in 0..opts.count {
        let rec = usable[rng.below(usable.len())];
        let pos = rng.below(rec.seq.len() - opts.length + 1);
        let mut read: Vec<u8> = rec.seq[pos..pos + opts.length].to_vec();

        for _ in 0..opts.errors {
            if read.is_empty() {
                break;
            }
            let p = rng.below(read.len());
            if !opts.indels {
                read[p] = substitute(read[p], &mut rng);
            } else {
                match rng.below(3) {
                    0 => read[p] = substitute(read[p], &mut rng),
                    1 => {
                        read.remove(p);
                    }
                    _ => read.insert(p, BASES[rng.below(4)]),
                }
            }
        }

        writeln!(
            out,
            ">read{} src={} pos={} errors={}",
            i, rec.id, pos, opts.errors
        )?;
        out.write_all(&read)?;
        writeln!(out)?;
    }
    Ok(())
}
