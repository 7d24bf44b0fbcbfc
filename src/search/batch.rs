//! 并行批量调度与命中落座。
//!
//! 查询按 1024 条一批交给 rayon 线程池；索引只读共享，每个工作线程
//! 在本地缓冲里聚合命中，并行段结束后统一合并。工作线程内的失败作为
//! Result 带回，第一个错误向上传播。
//!
//! 命中落座：游标逐行 locate 成片段坐标；非 delimited 索引先沿平铺
//! 布局归一化（跨序列边界的起点算前一条序列的假阳性命中）；反向片段
//! 按 pos_fwd = seg_len - pos_rev - query_len 折回正链坐标。
//! 同一 (seq, pos) 的重复命中只保留最小错误数。

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;

use crate::index::fm::{BiFmIndex, Cursor};
use crate::scheme::expand::ExpansionMode;
use crate::scheme::{generator, Search};
use crate::search::{search_query, search_query_best, Distance, SearchOpts};

const BATCH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    All,
    BestHits,
}

impl SearchMode {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "all" => Ok(SearchMode::All),
            "besthits" => Ok(SearchMode::BestHits),
            other => anyhow::bail!("invalid search mode \"{}\" (expected all or besthits)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOpts {
    pub threads: usize,
    pub errors: usize,
    pub generator: String,
    pub expansion: ExpansionMode,
    pub distance: Distance,
    pub mode: SearchMode,
    pub max_hits: usize,
    pub k_step: usize,
    pub count_only: bool,
}

impl Default for BatchOpts {
    fn default() -> Self {
        Self {
            threads: 1,
            errors: 0,
            generator: "h2-k2".to_string(),
            expansion: ExpansionMode::Uniform,
            distance: Distance::Hamming,
            mode: SearchMode::All,
            max_hits: 0,
            k_step: 0,
            count_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Hit {
    pub query: usize,
    pub seq: u32,
    pub pos: usize,
    pub errors: usize,
}

#[derive(Debug)]
pub enum BatchOutput {
    Hits(Vec<Hit>),
    Counts(Vec<(usize, usize)>),
}

/// 按查询长度缓存展开好的方案
enum LengthPlan {
    All(Vec<Search>, Vec<usize>),
    Ladder(Vec<(Vec<Search>, Vec<usize>)>),
}

fn build_plans(
    index: &BiFmIndex,
    queries: &[Vec<u8>],
    opts: &BatchOpts,
) -> Result<HashMap<usize, LengthPlan>> {
    let entry = generator::get(&opts.generator)?;
    let sigma = index.sigma();
    let n = index.size();
    let edit = opts.distance == Distance::Edit;

    let mut plans = HashMap::new();
    for q in queries {
        let len = q.len();
        if len == 0 || plans.contains_key(&len) {
            continue;
        }
        let plan = match opts.mode {
            SearchMode::All => {
                let scheme = (entry.generate)(0, opts.errors, sigma, n)?;
                let parts = opts
                    .expansion
                    .parts(&scheme, len, sigma, n, edit)
                    .with_context(|| format!("query length {}", len))?;
                LengthPlan::All(scheme, parts)
            }
            SearchMode::BestHits => {
                let mut ladder = Vec::with_capacity(opts.errors + 1);
                for j in 0..=opts.errors {
                    let scheme = (entry.generate)(j, j, sigma, n)?;
                    let parts = opts
                        .expansion
                        .parts(&scheme, len, sigma, n, edit)
                        .with_context(|| format!("query length {}", len))?;
                    ladder.push((scheme, parts));
                }
                LengthPlan::Ladder(ladder)
            }
        };
        plans.insert(len, plan);
    }
    Ok(plans)
}

/// 单条查询的命中落座（locate + 坐标折算 + 最小错误去重）
fn resolve_cursors(
    index: &BiFmIndex,
    query_id: usize,
    query_len: usize,
    cursors: &[(Cursor, usize)],
    out: &mut Vec<Hit>,
) {
    let mut best: HashMap<(u32, usize), usize> = HashMap::new();
    for &(cur, errors) in cursors {
        for row in cur.lb..cur.lb + cur.len {
            let (entry, offset) = index.locate(row);
            let pos = entry.pos as usize + offset;
            let (seq, pos, reverse) = index.normalize_hit(entry.seq, pos, entry.reverse);
            let pos = if reverse {
                let seg_len = index.seg_len(seq, true);
                match (seg_len).checked_sub(pos + query_len) {
                    Some(p) => p,
                    None => continue, // 编辑距离下折算越过片段起点，丢弃
                }
            } else {
                pos
            };
            best.entry((seq, pos))
                .and_modify(|e| *e = (*e).min(errors))
                .or_insert(errors);
        }
    }
    out.extend(best.into_iter().map(|((seq, pos), errors)| Hit {
        query: query_id,
        seq,
        pos,
        errors,
    }));
}

/// 批量跑一组查询。返回命中表或（count_only 时）每查询命中数。
pub fn run(index: &BiFmIndex, queries: &[Vec<u8>], opts: &BatchOpts) -> Result<BatchOutput> {
    let plans = build_plans(index, queries, opts)?;
    let search_opts = SearchOpts {
        distance: opts.distance,
        max_hits: opts.max_hits,
        k_step: opts.k_step,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.threads)
        .build()
        .context("cannot build worker pool")?;

    if opts.count_only {
        // 只统计游标宽度，跳过 locate
        let counts: Result<Vec<Vec<(usize, usize)>>> = pool.install(|| {
            queries
                .par_chunks(BATCH)
                .enumerate()
                .map(|(chunk_id, chunk)| {
                    let mut local = Vec::with_capacity(chunk.len());
                    for (i, q) in chunk.iter().enumerate() {
                        let query_id = chunk_id * BATCH + i;
                        let mut total = 0usize;
                        run_one(index, q, &plans, search_opts, &mut |cur, _| {
                            total += cur.len;
                        });
                        local.push((query_id, total));
                    }
                    Ok(local)
                })
                .collect()
        });
        let mut flat: Vec<(usize, usize)> = counts?.into_iter().flatten().collect();
        flat.sort_unstable();
        return Ok(BatchOutput::Counts(flat));
    }

    let hits: Result<Vec<Vec<Hit>>> = pool.install(|| {
        queries
            .par_chunks(BATCH)
            .enumerate()
            .map(|(chunk_id, chunk)| {
                let mut local: Vec<Hit> = Vec::new();
                let mut cursors: Vec<(Cursor, usize)> = Vec::new();
                for (i, q) in chunk.iter().enumerate() {
                    let query_id = chunk_id * BATCH + i;
                    cursors.clear();
                    run_one(index, q, &plans, search_opts, &mut |cur, errors| {
                        cursors.push((cur, errors));
                    });
                    resolve_cursors(index, query_id, q.len(), &cursors, &mut local);
                }
                Ok(local)
            })
            .collect()
    });

    let mut flat: Vec<Hit> = hits?.into_iter().flatten().collect();
    flat.sort_unstable();
    Ok(BatchOutput::Hits(flat))
}

fn run_one<F: FnMut(Cursor, usize)>(
    index: &BiFmIndex,
    query: &[u8],
    plans: &HashMap<usize, LengthPlan>,
    opts: SearchOpts,
    cb: &mut F,
) {
    if query.is_empty() {
        return;
    }
    match plans.get(&query.len()) {
        Some(LengthPlan::All(scheme, parts)) => {
            search_query(index, query, scheme, parts, opts, cb);
        }
        Some(LengthPlan::Ladder(ladder)) => {
            search_query_best(index, query, ladder, opts, cb);
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::revcomp_ranks;
    use crate::index::fm::{BiFmIndex, BuildOpts};
    use crate::index::rank::RankKind;

    fn build(refs: &[&[u8]], opts: BuildOpts) -> BiFmIndex {
        let refs: Vec<Vec<u8>> = refs.iter().map(|r| r.to_vec()).collect();
        BiFmIndex::build(&refs, opts).unwrap()
    }

    fn hits(out: BatchOutput) -> Vec<Hit> {
        match out {
            BatchOutput::Hits(h) => h,
            BatchOutput::Counts(_) => panic!("expected hits"),
        }
    }

    #[test]
    fn exact_two_hits_scenario() {
        // ACGTACGT 上查 ACGT：位置 0 和 4
        let idx = build(&[&[1, 2, 3, 4, 1, 2, 3, 4]], BuildOpts::default());
        let queries = vec![vec![1u8, 2, 3, 4]];
        let out = hits(run(&idx, &queries, &BatchOpts::default()).unwrap());
        assert_eq!(
            out,
            vec![
                Hit { query: 0, seq: 0, pos: 0, errors: 0 },
                Hit { query: 0, seq: 0, pos: 4, errors: 0 },
            ]
        );
    }

    #[test]
    fn hamming_one_error_scenario() {
        let idx = build(&[&[1, 2, 3, 4, 1, 2, 3, 4]], BuildOpts::default());
        let queries = vec![vec![1u8, 3, 3, 4]]; // AGGT
        let opts = BatchOpts { errors: 1, ..BatchOpts::default() };
        let out = hits(run(&idx, &queries, &opts).unwrap());
        assert_eq!(
            out,
            vec![
                Hit { query: 0, seq: 0, pos: 0, errors: 1 },
                Hit { query: 0, seq: 0, pos: 4, errors: 1 },
            ]
        );
    }

    #[test]
    fn non_delimited_cross_boundary_false_positive() {
        // ["AAAA", "CCCC"] 非 delimited：AC 在拼接缝上命中 (0, 3)
        let idx = build(
            &[&[1, 1, 1, 1], &[2, 2, 2, 2]],
            BuildOpts { delimited: false, ..BuildOpts::default() },
        );
        let queries = vec![vec![1u8, 2]];
        let out = hits(run(&idx, &queries, &BatchOpts::default()).unwrap());
        assert_eq!(out, vec![Hit { query: 0, seq: 0, pos: 3, errors: 0 }]);

        // delimited 索引上同样的查询没有命中
        let idx2 = build(&[&[1, 1, 1, 1], &[2, 2, 2, 2]], BuildOpts::default());
        let out2 = hits(run(&idx2, &queries, &BatchOpts::default()).unwrap());
        assert!(out2.is_empty());
    }

    #[test]
    fn mirrored_strand_symmetry_scenario() {
        // 镜像索引：查询与其反向互补得到同一组正链坐标
        let seq: &[u8] = &[1, 2, 3, 4, 1, 2, 3, 4];
        let idx = build(
            &[seq],
            BuildOpts { include_reverse: true, ..BuildOpts::default() },
        );
        let fwd = vec![1u8, 2, 3, 4];
        let rc = revcomp_ranks(&fwd);
        let queries = vec![fwd, rc];
        let out = hits(run(&idx, &queries, &BatchOpts::default()).unwrap());

        let q0: Vec<(u32, usize)> = out.iter().filter(|h| h.query == 0).map(|h| (h.seq, h.pos)).collect();
        let q1: Vec<(u32, usize)> = out.iter().filter(|h| h.query == 1).map(|h| (h.seq, h.pos)).collect();
        assert_eq!(q0, vec![(0, 0), (0, 4)]);
        // ACGT 自反向互补，反链命中折回后坐标一致
        assert_eq!(q1, q0);
    }

    #[test]
    fn mirrored_asymmetric_query() {
        // AACCG 只出现在正链；反向互补查询应折回同一坐标
        let seq: &[u8] = &[1, 1, 2, 2, 3, 4, 4, 4];
        let idx = build(
            &[seq],
            BuildOpts { include_reverse: true, ..BuildOpts::default() },
        );
        let fwd = vec![1u8, 1, 2, 2, 3];
        let rc = revcomp_ranks(&fwd);
        let queries = vec![fwd, rc];
        let out = hits(run(&idx, &queries, &BatchOpts::default()).unwrap());
        let q0: Vec<(u32, usize)> = out.iter().filter(|h| h.query == 0).map(|h| (h.seq, h.pos)).collect();
        let q1: Vec<(u32, usize)> = out.iter().filter(|h| h.query == 1).map(|h| (h.seq, h.pos)).collect();
        assert_eq!(q0, vec![(0, 0)]);
        assert_eq!(q1, vec![(0, 0)]);
    }

    #[test]
    fn sampling_rate_scenario() {
        // 长度 12 的 A 串、采样率 4：AAA 命中 0..=9
        let idx = build(
            &[&[1u8; 12][..]],
            BuildOpts { sampling_rate: 4, ..BuildOpts::default() },
        );
        let queries = vec![vec![1u8, 1, 1]];
        let out = hits(run(&idx, &queries, &BatchOpts::default()).unwrap());
        assert_eq!(out.len(), 10);
        for (i, h) in out.iter().enumerate() {
            assert_eq!((h.seq, h.pos, h.errors), (0, i, 0));
        }
    }

    #[test]
    fn count_only_tallies_cursor_widths() {
        let idx = build(&[&[1u8; 12][..]], BuildOpts::default());
        let queries = vec![vec![1u8, 1, 1], vec![2u8, 2]];
        let opts = BatchOpts { count_only: true, ..BatchOpts::default() };
        match run(&idx, &queries, &opts).unwrap() {
            BatchOutput::Counts(c) => assert_eq!(c, vec![(0, 10), (1, 0)]),
            BatchOutput::Hits(_) => panic!("expected counts"),
        }
    }

    #[test]
    fn parallel_matches_serial() {
        let mut rng = crate::alphabet::Lcg::new(77);
        let seq: Vec<u8> = (0..600).map(|_| 1 + (rng.next() % 4) as u8).collect();
        let idx = build(&[&seq], BuildOpts::default());
        let queries: Vec<Vec<u8>> = (0..40)
            .map(|_| {
                let start = rng.below(seq.len() - 16);
                seq[start..start + 12].to_vec()
            })
            .collect();
        let o1 = BatchOpts { threads: 1, errors: 1, ..BatchOpts::default() };
        let o4 = BatchOpts { threads: 4, errors: 1, ..BatchOpts::default() };
        let h1 = hits(run(&idx, &queries, &o1).unwrap());
        let h4 = hits(run(&idx, &queries, &o4).unwrap());
        assert_eq!(h1, h4);
    }

    #[test]
    fn best_hits_reports_lowest_error_level() {
        let idx = build(&[&[1, 2, 3, 4, 1, 2, 3, 4]], BuildOpts::default());
        let opts = BatchOpts {
            errors: 2,
            mode: SearchMode::BestHits,
            ..BatchOpts::default()
        };
        // 精确命中的查询只报 0 错命中
        let out = hits(run(&idx, &vec![vec![1u8, 2, 3, 4]], &opts).unwrap());
        assert!(!out.is_empty());
        assert!(out.iter().all(|h| h.errors == 0));
        // 1 错查询只报 1 错命中
        let out = hits(run(&idx, &vec![vec![1u8, 3, 3, 4]], &opts).unwrap());
        assert!(!out.is_empty());
        assert!(out.iter().all(|h| h.errors == 1));
    }

    #[test]
    fn dna4_index_end_to_end() {
        let mut rng = crate::alphabet::Lcg::new(9);
        let seq: Vec<u8> = (0..200).map(|_| 1 + (rng.next() % 4) as u8).collect();
        let idx = build(
            &[&seq],
            BuildOpts { kind: RankKind::Dna4, delimited: false, ..BuildOpts::default() },
        );
        let queries = vec![seq[30..42].to_vec()];
        let opts = BatchOpts { errors: 1, ..BatchOpts::default() };
        let out = hits(run(&idx, &queries, &opts).unwrap());
        assert!(out.iter().any(|h| h.seq == 0 && h.pos == 30 && h.errors == 0));
    }

    #[test]
    fn unknown_generator_is_an_error() {
        let idx = build(&[&[1, 2, 3, 4]], BuildOpts::default());
        let opts = BatchOpts { generator: "nope".to_string(), ..BatchOpts::default() };
        assert!(run(&idx, &vec![vec![1u8, 2]], &opts).is_err());
    }
}
