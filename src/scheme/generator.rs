//! 搜索方案生成器。
//!
//! 每个生成器是纯函数 `(k_min, k_max, σ, N) -> Scheme`。σ 与 N 只有
//! `optimum` 用到（按加权节点数挑选候选族），传 0 时退回默认值。
//!
//! k ≤ 2 的具名表（kianfar、lam、h2-k1/k2）既完备又非冗余，逐一对拍过；
//! 任意 k 的族（pigeon、suffix、01*0、kucherov、hato、pex）按构造完备，
//! 下界收紧只砍重复工作、不保证严格非冗余。

use anyhow::{bail, Result};

use crate::scheme::{expand, node_count, Scheme, Search};

/// 把 [0, k_max] 的方案限制到 [k_min, k_max]：
/// 抬高末位下界，去掉由此变空的搜索。
pub fn restrict_min(mut scheme: Scheme, k_min: usize) -> Scheme {
    for s in &mut scheme {
        let last = s.l.len() - 1;
        s.l[last] = s.l[last].max(k_min);
    }
    scheme.retain(|s| s.l[s.l.len() - 1] <= s.u[s.u.len() - 1]);
    scheme
}

/// π = [j, j+1, …, p-1, j-1, …, 0]（先向右补完，再向左回填）
fn pi_right_then_left(p: usize, j: usize) -> Vec<usize> {
    let mut pi = Vec::with_capacity(p);
    pi.extend(j..p);
    pi.extend((0..j).rev());
    pi
}

/// π = [j, j-1, …, 0, j+1, …, p-1]
fn pi_left_then_right(p: usize, j: usize) -> Vec<usize> {
    let mut pi = Vec::with_capacity(p);
    pi.extend((0..=j).rev());
    pi.extend(j + 1..p);
    pi
}

fn single_exact(p: usize, k_min: usize) -> Scheme {
    let mut l = vec![0; p];
    *l.last_mut().unwrap() = k_min;
    vec![Search::new((0..p).collect(), l, vec![0; p])]
}

pub fn backtracking(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(vec![Search::new(vec![0], vec![k_min], vec![k_max])])
}

/// 鸽笼：k+1 个分块中必有一个无错
pub fn pigeon(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    let p = k_max + 1;
    let mut out = Vec::with_capacity(p);
    for j in 0..p {
        let mut u = vec![k_max; p];
        u[0] = 0;
        let mut l = vec![0; p];
        l[p - 1] = k_min;
        out.push(Search::new(pi_right_then_left(p, j), l, u));
    }
    Ok(out)
}

/// 鸽笼 + 收紧：锚定首个无错分块，对回填方向加下界坡道
pub fn pigeon_opt(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(first_zero_scheme(k_max + 1, k_min, k_max))
}

/// 首零分块构造：搜索 j 锚定分块 j，要求 0..j-1 合计至少 j 个错误
fn first_zero_scheme(p: usize, k_min: usize, k_max: usize) -> Scheme {
    let mut out = Vec::new();
    for j in 0..p.min(k_max + 1) {
        let mut u = vec![k_max; p];
        u[0] = 0;
        let mut l = vec![0; p - j];
        l.extend(1..=j);
        let last = l.len() - 1;
        l[last] = l[last].max(k_min);
        out.push(Search::new(pi_right_then_left(p, j), l, u));
    }
    out
}

/// 末零分块构造（镜像）
fn last_zero_scheme(p: usize, k_min: usize, k_max: usize) -> Scheme {
    let mut out = Vec::new();
    for j in (0..p).rev() {
        if p - 1 - j > k_max {
            continue;
        }
        let mut u = vec![k_max; p];
        u[0] = 0;
        let mut l = vec![0; j + 1];
        l.extend(1..=p - 1 - j);
        let last = l.len() - 1;
        l[last] = l[last].max(k_min);
        out.push(Search::new(pi_left_then_right(p, j), l, u));
    }
    out
}

/// 后缀过滤（Kärkkäinen–Na）：沿后缀方向逐块放宽
pub fn suffix(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    let p = k_max + 1;
    let mut out = Vec::with_capacity(p);
    for j in 0..p {
        let mut u: Vec<usize> = (0..p - j).collect();
        u.extend(vec![k_max; j]);
        let mut l = vec![0; p];
        l[p - 1] = k_min;
        out.push(Search::new(pi_right_then_left(p, j), l, u));
    }
    Ok(out)
}

/// 01*0 过滤（Vroland 等）：k+2 个分块里必有 `0 1^m 0` 连续窗口
pub fn zero_one_star_zero(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    let p = k_max + 2;
    let mut out = Vec::new();
    for a in 0..p {
        for b in a + 1..p {
            let m = b - a - 1;
            if m > k_max {
                continue;
            }
            // 窗口 a..=b 内的界：0, 1, …, m, m；窗口外放宽到 k_max
            let mut l = Vec::with_capacity(p);
            let mut u = Vec::with_capacity(p);
            l.push(0);
            u.push(0);
            for t in 1..=m {
                l.push(t);
                u.push(t);
            }
            l.push(m);
            u.push(m);
            while l.len() < p {
                l.push(m);
                u.push(k_max);
            }
            let last = l.len() - 1;
            l[last] = l[last].max(k_min);
            out.push(Search::new(pi_right_then_left(p, a), l, u));
        }
    }
    Ok(out)
}

/// k ≤ 1 的标准双向对（正向 + 反向，各锚定一半）
fn table_k1(k_min: usize) -> Scheme {
    restrict_min(
        vec![
            Search::new(vec![0, 1], vec![0, 0], vec![0, 1]),
            Search::new(vec![1, 0], vec![0, 1], vec![0, 1]),
        ],
        k_min,
    )
}

/// Kianfar 等的 k=2 最优方案（3 搜索、3 分块）
fn table_kianfar_k2(k_min: usize) -> Scheme {
    restrict_min(
        vec![
            Search::new(vec![0, 1, 2], vec![0, 0, 2], vec![0, 1, 2]),
            Search::new(vec![2, 1, 0], vec![0, 0, 0], vec![0, 2, 2]),
            Search::new(vec![1, 2, 0], vec![0, 1, 1], vec![0, 1, 2]),
        ],
        k_min,
    )
}

/// 上表的分块镜像（i -> 2-i），同样完备非冗余
fn table_h2_k2(k_min: usize) -> Scheme {
    restrict_min(
        vec![
            Search::new(vec![2, 1, 0], vec![0, 0, 2], vec![0, 1, 2]),
            Search::new(vec![0, 1, 2], vec![0, 0, 0], vec![0, 2, 2]),
            Search::new(vec![1, 0, 2], vec![0, 1, 1], vec![0, 1, 2]),
        ],
        k_min,
    )
}

/// Lam 等风格的 k=2 方案：按中间分块的错误形态三分
fn table_lam_k2(k_min: usize) -> Scheme {
    restrict_min(
        vec![
            Search::new(vec![0, 1, 2], vec![0, 0, 0], vec![0, 0, 2]),
            Search::new(vec![1, 0, 2], vec![0, 1, 1], vec![0, 2, 2]),
            Search::new(vec![1, 2, 0], vec![1, 1, 1], vec![2, 2, 2]),
        ],
        k_min,
    )
}

fn h2_family(limit: usize, k_min: usize, k_max: usize) -> Result<Scheme> {
    if k_max > limit {
        bail!(
            "generator h2-k{} supports at most {} errors (asked for {})",
            limit, limit, k_max
        );
    }
    Ok(match k_max {
        0 => single_exact(1, k_min),
        1 => table_k1(k_min),
        2 => table_h2_k2(k_min),
        _ => first_zero_scheme(k_max + 1, k_min, k_max),
    })
}

pub fn h2_k1(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    h2_family(1, k_min, k_max)
}

pub fn h2_k2(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    h2_family(2, k_min, k_max)
}

pub fn h2_k3(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    h2_family(3, k_min, k_max)
}

pub fn kianfar(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(match k_max {
        0 => single_exact(1, k_min),
        1 => table_k1(k_min),
        2 => table_kianfar_k2(k_min),
        _ => bail!("generator kianfar covers k <= 2 (asked for {})", k_max),
    })
}

pub fn lam(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(match k_max {
        0 => single_exact(1, k_min),
        1 => table_k1(k_min),
        2 => table_lam_k2(k_min),
        _ => bail!("generator lam covers k <= 2 (asked for {})", k_max),
    })
}

/// k+1 分块、末零锚定
pub fn kucherov_k1(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(last_zero_scheme(k_max + 1, k_min, k_max))
}

/// k+2 分块、首零锚定（分块更多换更早剪枝）
pub fn kucherov_k2(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(first_zero_scheme(k_max + 2, k_min, k_max))
}

/// k+2 分块、末零锚定
pub fn hato(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(last_zero_scheme(k_max + 2, k_min, k_max))
}

/// PEX 划分树。节点覆盖一段分块区间并携带错误预算；
/// 每个叶对应一个搜索：从叶出发逐层补完祖先区间，步上界取当前祖先的预算。
#[derive(Debug, Clone, Copy)]
enum PexBudget {
    /// 自底向上：budget = min(k, 区间大小 - 1)
    BottomUp,
    /// 自顶向下：从 k 逐层折半
    TopDown,
}

fn pex_scheme(k_min: usize, k_max: usize, budget: PexBudget, mirrored: bool) -> Scheme {
    let p = k_max + 1;
    if p == 1 {
        return single_exact(1, k_min);
    }

    // 叶 j 的搜索：区间 [lo,hi] 从 [j,j] 逐层长到 [0,p-1]
    fn leaf_search(
        p: usize,
        j: usize,
        k_max: usize,
        budget: PexBudget,
        k_min: usize,
    ) -> Search {
        // 祖先链：自顶向下切分再回放
        fn ancestors(lo: usize, hi: usize, j: usize, acc: &mut Vec<(usize, usize)>) {
            acc.push((lo, hi));
            if lo == hi {
                return;
            }
            let mid = (lo + hi) / 2;
            if j <= mid {
                ancestors(lo, mid, j, acc);
            } else {
                ancestors(mid + 1, hi, j, acc);
            }
        }
        let mut chain = Vec::new();
        ancestors(0, p - 1, j, &mut chain);
        chain.reverse(); // 叶在前

        let node_budget = |depth_from_leaf: usize, lo: usize, hi: usize| -> usize {
            match budget {
                PexBudget::BottomUp => k_max.min(hi - lo),
                PexBudget::TopDown => {
                    // 根为 k，往下每层折半；depth_from_leaf 数到根
                    let levels_below_root = chain.len() - 1 - depth_from_leaf;
                    let mut b = k_max;
                    for _ in 0..levels_below_root {
                        b /= 2;
                    }
                    b
                }
            }
        };

        let mut pi = vec![j];
        let mut u = vec![node_budget(0, j, j)];
        let (mut lo, mut hi) = (j, j);
        for (depth, &(alo, ahi)) in chain.iter().enumerate().skip(1) {
            let b = node_budget(depth, alo, ahi);
            if ahi > hi {
                for part in hi + 1..=ahi {
                    pi.push(part);
                    u.push(b);
                }
            }
            if alo < lo {
                for part in (alo..lo).rev() {
                    pi.push(part);
                    u.push(b);
                }
            }
            lo = alo;
            hi = ahi;
        }
        let mut l = vec![0; p];
        l[p - 1] = k_min;
        Search::new(pi, l, u)
    }

    let mut out: Scheme = (0..p)
        .map(|j| leaf_search(p, j, k_max, budget, k_min))
        .collect();
    if mirrored {
        for s in &mut out {
            for part in &mut s.pi {
                *part = p - 1 - *part;
            }
        }
    }
    out
}

pub fn pex_td(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(pex_scheme(k_min, k_max, PexBudget::TopDown, false))
}

pub fn pex_td_l(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(pex_scheme(k_min, k_max, PexBudget::TopDown, true))
}

pub fn pex_bu(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(pex_scheme(k_min, k_max, PexBudget::BottomUp, false))
}

pub fn pex_bu_l(k_min: usize, k_max: usize, _sigma: usize, _n: usize) -> Result<Scheme> {
    Ok(pex_scheme(k_min, k_max, PexBudget::BottomUp, true))
}

/// 在内建候选族里按加权节点数挑最便宜的方案。
/// σ、N 传 0 时采用 4 与 10^9（信息子命令的默认假设），查询长度假定 150。
pub fn optimum(k_min: usize, k_max: usize, sigma: usize, n: usize) -> Result<Scheme> {
    let sigma = if sigma == 0 { 4 } else { sigma };
    let n = if n == 0 { 1_000_000_000 } else { n };
    let mut candidates: Vec<Scheme> = Vec::new();
    if k_max <= 2 {
        candidates.push(kianfar(k_min, k_max, sigma, n)?);
    }
    candidates.push(pigeon_opt(k_min, k_max, sigma, n)?);
    candidates.push(zero_one_star_zero(k_min, k_max, sigma, n)?);
    candidates.push(suffix(k_min, k_max, sigma, n)?);
    candidates.push(pex_bu(k_min, k_max, sigma, n)?);

    let assumed_len = 150usize;
    let mut best: Option<(f64, Scheme)> = None;
    for cand in candidates {
        let p = cand[0].parts();
        let len = assumed_len.max(p);
        let parts = expand::uniform_parts(p, len)?;
        let score = node_count::weighted_node_count(&cand, &parts, sigma, n, false);
        if best.as_ref().map(|(s, _)| score < *s).unwrap_or(true) {
            best = Some((score, cand));
        }
    }
    Ok(best.unwrap().1)
}

/// 生成器注册表条目
pub struct GeneratorEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub generate: fn(usize, usize, usize, usize) -> Result<Scheme>,
}

/// 全部生成器，展示顺序即信息表顺序
pub static ALL: &[GeneratorEntry] = &[
    GeneratorEntry { name: "backtracking", description: "single part, plain backtracking", generate: backtracking },
    GeneratorEntry { name: "optimum", description: "cheapest built-in family by weighted node count", generate: optimum },
    GeneratorEntry { name: "01*0", description: "0 1^m 0 window filter over k+2 parts", generate: zero_one_star_zero },
    GeneratorEntry { name: "pigeon", description: "pigeonhole over k+1 parts", generate: pigeon },
    GeneratorEntry { name: "pigeon_opt", description: "pigeonhole with tightened lower bounds", generate: pigeon_opt },
    GeneratorEntry { name: "suffix", description: "suffix filter, widening error budget", generate: suffix },
    GeneratorEntry { name: "h2-k1", description: "two-search bidirectional table, k <= 1", generate: h2_k1 },
    GeneratorEntry { name: "h2-k2", description: "three-search table, k <= 2 (default)", generate: h2_k2 },
    GeneratorEntry { name: "h2-k3", description: "anchored family up to k = 3", generate: h2_k3 },
    GeneratorEntry { name: "kianfar", description: "optimal published tables, k <= 2", generate: kianfar },
    GeneratorEntry { name: "kucherov-k1", description: "k+1 parts, last-zero anchor", generate: kucherov_k1 },
    GeneratorEntry { name: "kucherov-k2", description: "k+2 parts, first-zero anchor", generate: kucherov_k2 },
    GeneratorEntry { name: "lam", description: "case split on the middle part, k <= 2", generate: lam },
    GeneratorEntry { name: "hato", description: "k+2 parts, last-zero anchor", generate: hato },
    GeneratorEntry { name: "pex-td", description: "PEX tree, budgets halved top-down", generate: pex_td },
    GeneratorEntry { name: "pex-td-l", description: "mirrored pex-td", generate: pex_td_l },
    GeneratorEntry { name: "pex-bu", description: "PEX tree, budgets grown bottom-up", generate: pex_bu },
    GeneratorEntry { name: "pex-bu-l", description: "mirrored pex-bu", generate: pex_bu_l },
];

pub fn get(name: &str) -> Result<&'static GeneratorEntry> {
    ALL.iter()
        .find(|e| e.name == name)
        .ok_or_else(|| anyhow::anyhow!("unknown search scheme generator \"{}\"", name))
}
