//! 容错搜索驱动：按搜索方案在双向索引上做深度优先回溯。
//!
//! 每个搜索先被编成逐步计划（消费方向 + 查询位置序列 + 逐步错误界），
//! 随后沿计划扩展游标：匹配零代价，错配对 Σ\{q} 逐符号分支；
//! 编辑距离额外引入参考侧插入（消费索引符号）与参考侧删除（跳过查询符号），
//! 相邻的插入/删除互斥（等价对齐必有更便宜的替换版本）。
//! 累计错误超出当前步上界即剪枝，分块边界检查下界。

pub mod batch;

use anyhow::{bail, Result};

use crate::index::fm::{BiFmIndex, Cursor};
use crate::scheme::Search;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Hamming,
    Edit,
}

impl Distance {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "ham" => Ok(Distance::Hamming),
            "lev" => Ok(Distance::Edit),
            other => bail!("invalid distance metric \"{}\" (expected ham or lev)", other),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOpts {
    pub distance: Distance,
    /// 单查询命中上限，0 表示不限
    pub max_hits: usize,
    /// 无错误预算时每轮下降的符号数，0/1 关闭
    pub k_step: usize,
}

impl Default for SearchOpts {
    fn default() -> Self {
        Self {
            distance: Distance::Hamming,
            max_hits: 0,
            k_step: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Left,
    Right,
}

/// 一个搜索步：向哪个方向扩展、依序取哪些查询位置、错误上下界
struct StepPlan {
    dir: Dir,
    qpos: Vec<usize>,
    lo: usize,
    hi: usize,
}

/// 把 (π, l, u) 与分块长度编成消费计划（索引走 π 顺序、符号取自然位置）
fn plan_search(search: &Search, parts: &[usize]) -> Vec<StepPlan> {
    let p = parts.len();
    let mut starts = vec![0usize; p];
    for j in 1..p {
        starts[j] = starts[j - 1] + parts[j - 1];
    }

    let mut plans = Vec::with_capacity(p);
    let (mut cov_lo, mut cov_hi) = (search.pi[0], search.pi[0]);
    for (i, &part) in search.pi.iter().enumerate() {
        let dir = if i == 0 || part > cov_hi { Dir::Right } else { Dir::Left };
        let range = starts[part]..starts[part] + parts[part];
        let qpos: Vec<usize> = match dir {
            Dir::Right => range.collect(),
            Dir::Left => range.rev().collect(),
        };
        plans.push(StepPlan {
            dir,
            qpos,
            lo: search.l[i],
            hi: search.u[i],
        });
        cov_lo = cov_lo.min(part);
        cov_hi = cov_hi.max(part);
    }
    plans
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastOp {
    Free,
    Ins,
    Del,
}

struct Walker<'a, F: FnMut(Cursor, usize)> {
    index: &'a BiFmIndex,
    query: &'a [u8],
    sigma: u8,
    opts: SearchOpts,
    cb: &'a mut F,
    hits: usize,
    emitted_any: bool,
}

impl<'a, F: FnMut(Cursor, usize)> Walker<'a, F> {
    #[inline]
    fn extend(&self, cur: Cursor, dir: Dir, ch: u8) -> Option<Cursor> {
        match dir {
            Dir::Left => self.index.extend_left(cur, ch),
            Dir::Right => self.index.extend_right(cur, ch),
        }
    }

    /// 返回 false 表示命中已达上限，整个查询停止
    fn emit(&mut self, cur: Cursor, errors: usize) -> bool {
        self.emitted_any = true;
        (self.cb)(cur, errors);
        self.hits += cur.len;
        self.opts.max_hits == 0 || self.hits < self.opts.max_hits
    }

    fn walk(
        &mut self,
        plans: &[StepPlan],
        cur: Cursor,
        step: usize,
        idx: usize,
        errors: usize,
        last: LastOp,
    ) -> bool {
        let plan = &plans[step];
        if idx == plan.qpos.len() {
            // 边界插入归属当前分块。左向分块收尾后，这里是补出
            // 其左缘参考插入（例如查询最左端之前的插入）的唯一机会。
            if self.opts.distance == Distance::Edit
                && errors + 1 <= plan.hi
                && last != LastOp::Del
            {
                for ch in 1..self.sigma {
                    if let Some(next) = self.extend(cur, plan.dir, ch) {
                        if !self.walk(plans, next, step, idx, errors + 1, LastOp::Ins) {
                            return false;
                        }
                    }
                }
            }
            // 分块边界：下界不满足的前缀到不了任何可接受的叶子
            if errors < plan.lo {
                return true;
            }
            if step + 1 == plans.len() {
                return self.emit(cur, errors);
            }
            return self.walk(plans, cur, step + 1, 0, errors, last);
        }

        // 预算用尽时只剩精确匹配一条路，成批下降
        if self.opts.k_step >= 2 && errors == plan.hi {
            let batch = self.opts.k_step.min(plan.qpos.len() - idx);
            if batch >= 2 {
                let mut c = cur;
                for t in 0..batch {
                    match self.extend(c, plan.dir, self.query[plan.qpos[idx + t]]) {
                        Some(n) => c = n,
                        None => return true,
                    }
                }
                return self.walk(plans, c, step, idx + batch, errors, LastOp::Free);
            }
        }

        let q = self.query[plan.qpos[idx]];

        // 匹配优先，保证 DFS 先探代价低的路径
        if let Some(next) = self.extend(cur, plan.dir, q) {
            if !self.walk(plans, next, step, idx + 1, errors, LastOp::Free) {
                return false;
            }
        }

        if errors + 1 > plan.hi {
            return true;
        }

        // 错配：对字母表逐符号分支（哨兵除外）
        for ch in 1..self.sigma {
            if ch == q {
                continue;
            }
            if let Some(next) = self.extend(cur, plan.dir, ch) {
                if !self.walk(plans, next, step, idx + 1, errors + 1, LastOp::Free) {
                    return false;
                }
            }
        }

        if self.opts.distance == Distance::Edit {
            // 参考侧删除：跳过查询符号
            if last != LastOp::Ins
                && !self.walk(plans, cur, step, idx + 1, errors + 1, LastOp::Del)
            {
                return false;
            }
            // 参考侧插入：消费索引符号、查询原地不动
            if last != LastOp::Del {
                for ch in 1..self.sigma {
                    if let Some(next) = self.extend(cur, plan.dir, ch) {
                        if !self.walk(plans, next, step, idx, errors + 1, LastOp::Ins) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }
}

/// 对单条查询跑完一个方案，命中以 (游标, 错误数) 回调。
/// 返回是否有任何命中。空查询直接返回 false。
pub fn search_query<F: FnMut(Cursor, usize)>(
    index: &BiFmIndex,
    query: &[u8],
    scheme: &[Search],
    parts: &[usize],
    opts: SearchOpts,
    cb: &mut F,
) -> bool {
    if query.is_empty() || scheme.is_empty() {
        return false;
    }

    // k = 0：跳过方案机制，纯反向搜索
    let exact_only = scheme.iter().all(|s| *s.u.last().unwrap() == 0)
        && scheme.iter().all(|s| *s.l.last().unwrap() == 0);
    if exact_only {
        if let Some(cur) = index.backward_search(query) {
            cb(cur, 0);
            return true;
        }
        return false;
    }

    let mut walker = Walker {
        index,
        query,
        sigma: index.sigma() as u8,
        opts,
        cb,
        hits: 0,
        emitted_any: false,
    };
    for search in scheme {
        let plans = plan_search(search, parts);
        let start = index.initial_cursor();
        if !walker.walk(&plans, start, 0, 0, 0, LastOp::Free) {
            break; // 命中上限
        }
    }
    walker.emitted_any
}

/// best-hits 模式：错误预算从低到高逐级尝试，最低命中级别即停。
/// ladder 的第 j 项是为 [j, j] 生成并展开的方案。
pub fn search_query_best<F: FnMut(Cursor, usize)>(
    index: &BiFmIndex,
    query: &[u8],
    ladder: &[(Vec<Search>, Vec<usize>)],
    opts: SearchOpts,
    cb: &mut F,
) -> bool {
    for (scheme, parts) in ladder {
        if search_query(index, query, scheme, parts, opts, cb) {
            return true;
        }
    }
    false
}
