//! 节点数估价：不碰文本，闭式算出方案在均匀随机查询上的期望工作量。
//!
//! 节点数：对每个搜索、每个在界内的 (深度, 累计错误) 注解求和，
//! 汉明每节点记 1，编辑记 1 + 2(σ-1)（替换与参考侧插入的分支因子）。
//! 加权版再乘存活概率 min(1, σ^{-匹配字符数} · C(深度, 错误数))。

use crate::scheme::Search;

fn ln_binom(n: usize, k: usize) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    let mut s = 0.0f64;
    for i in 0..k {
        s += ((n - i) as f64).ln() - ((i + 1) as f64).ln();
    }
    s
}

/// 注解 (d, e) 的存活权重
fn survival_weight(depth: usize, errors: usize, sigma: usize) -> f64 {
    let matched = depth - errors;
    let ln_w = ln_binom(depth, errors) - matched as f64 * (sigma as f64).ln();
    ln_w.exp().min(1.0)
}

fn count_one(search: &Search, parts: &[usize], sigma: usize, edit: bool, weighted: bool) -> f64 {
    let k_cap = *search.u.last().unwrap();
    let node_cost: f64 = if edit { 1.0 + 2.0 * (sigma as f64 - 1.0) } else { 1.0 };
    let branch = sigma as f64 - 1.0;

    // cnt[e] = 当前深度、累计 e 个错误的注解条数
    let mut cnt = vec![0.0f64; k_cap + 1];
    cnt[0] = 1.0;
    let mut total = 0.0f64;
    let mut depth = 0usize;

    for (step, &part) in search.pi.iter().enumerate() {
        let hi = search.u[step];
        for _ in 0..parts[part] {
            depth += 1;
            let mut next = vec![0.0f64; k_cap + 1];
            for e in 0..=hi.min(k_cap) {
                let mut v = cnt[e]; // 匹配分支
                if e > 0 {
                    v += cnt[e - 1] * branch; // 错配分支
                }
                next[e] = v;
            }
            cnt = next;
            for (e, &v) in cnt.iter().enumerate() {
                if v == 0.0 {
                    continue;
                }
                let w = if weighted { survival_weight(depth, e, sigma) } else { 1.0 };
                total += v * node_cost * w;
            }
        }
        // 分块边界：低于下界的注解在此被剪掉
        for e in 0..search.l[step].min(k_cap + 1) {
            cnt[e] = 0.0;
        }
    }
    total
}

/// 方案的节点数（汉明 / 编辑由 edit 选择）
pub fn node_count(scheme: &[Search], parts: &[usize], sigma: usize, edit: bool) -> f64 {
    scheme
        .iter()
        .map(|s| count_one(s, parts, sigma, edit, false))
        .sum()
}

/// 加权节点数：按期望存活区间占比折算（N 只影响折算上限，比值里消去）
pub fn weighted_node_count(
    scheme: &[Search],
    parts: &[usize],
    sigma: usize,
    n_text: usize,
    edit: bool,
) -> f64 {
    let _ = n_text;
    scheme
        .iter()
        .map(|s| count_one(s, parts, sigma, edit, true))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::generator;
    use crate::scheme::Search;

    #[test]
    fn exact_search_counts_query_length() {
        // 单搜索、零错误：每深度恰一个节点
        let s = vec![Search::new(vec![0], vec![0], vec![0])];
        assert_eq!(node_count(&s, &[12], 4, false), 12.0);
    }

    #[test]
    fn backtracking_k1_hand_computed() {
        // p=1, u=[1]：深度 d 有 1 个零错注解和 (d-1)·(σ-1)+... 个一错注解；
        // 递推：c0=1，c1(d) = c1(d-1) + (σ-1) => c1(d) = d·(σ-1)
        // 总和_{d=1..Q} (1 + d·(σ-1))
        let s = vec![Search::new(vec![0], vec![0], vec![1])];
        let q = 5usize;
        let sigma = 4usize;
        let expect: f64 = (1..=q).map(|d| 1.0 + d as f64 * (sigma as f64 - 1.0)).sum();
        assert_eq!(node_count(&s, &[q], sigma, false), expect);
    }

    #[test]
    fn edit_cost_scales_per_node() {
        let s = vec![Search::new(vec![0], vec![0], vec![0])];
        let ham = node_count(&s, &[10], 4, false);
        let edit = node_count(&s, &[10], 4, true);
        assert_eq!(edit, ham * 7.0); // 1 + 2·(4-1)
    }

    #[test]
    fn weighted_is_at_most_plain() {
        let scheme = generator::kianfar(0, 2, 4, 0).unwrap();
        let parts = [20usize, 20, 20];
        let plain = node_count(&scheme, &parts, 4, false);
        let weighted = weighted_node_count(&scheme, &parts, 4, 1 << 30, false);
        assert!(weighted <= plain + 1e-9);
        assert!(weighted > 0.0);
    }

    #[test]
    fn more_errors_cost_more() {
        let k1 = generator::pigeon(0, 1, 4, 0).unwrap();
        let k2 = generator::pigeon(0, 2, 4, 0).unwrap();
        // 同一查询长度下，k=2 的方案要访问更多节点
        let c1 = node_count(&k1, &uniform(k1[0].parts(), 60), 4, false);
        let c2 = node_count(&k2, &uniform(k2[0].parts(), 60), 4, false);
        assert!(c2 > c1);
    }

    fn uniform(p: usize, q: usize) -> Vec<usize> {
        crate::scheme::expand::uniform_parts(p, q).unwrap()
    }

    #[test]
    fn lower_bounds_prune_annotations() {
        // 末位下界抬高后节点数不增
        let free = vec![Search::new(vec![0, 1], vec![0, 0], vec![0, 1])];
        let pinned = vec![Search::new(vec![0, 1], vec![0, 1], vec![0, 1])];
        let parts = [10usize, 10];
        assert!(node_count(&pinned, &parts, 4, false) <= node_count(&free, &parts, 4, false));
    }
}
