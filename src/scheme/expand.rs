//! 分块尺寸选择（partition expansion）。
//!
//! 方案本身只带分块个数；给定查询长度 Q 后由这里产出各分块的长度，
//! 三种策略：均匀、自底向上加权节点数下降、自顶向下加权节点数贪心。

use anyhow::{bail, Result};

use crate::scheme::node_count::weighted_node_count;
use crate::scheme::Search;

/// 均匀切分：每块 ⌊Q/p⌋，余数摊给靠前的块
pub fn uniform_parts(p: usize, query_len: usize) -> Result<Vec<usize>> {
    if p == 0 {
        bail!("scheme has zero parts");
    }
    if query_len < p {
        bail!(
            "query length {} is shorter than the scheme's {} parts",
            query_len, p
        );
    }
    let base = query_len / p;
    let rem = query_len % p;
    Ok((0..p).map(|i| base + usize::from(i < rem)).collect())
}

/// 自底向上：从均匀切分出发，反复把一个单位从收益最大的块挪走
pub fn wnc_parts_bottom_up(
    scheme: &[Search],
    query_len: usize,
    sigma: usize,
    n_text: usize,
    edit: bool,
) -> Result<Vec<usize>> {
    let p = scheme[0].parts();
    let mut parts = uniform_parts(p, query_len)?;
    let mut score = weighted_node_count(scheme, &parts, sigma, n_text, edit);

    // 每轮尝试所有相邻搬运，收敛或步数耗尽为止
    for _ in 0..2 * query_len {
        let mut best: Option<(f64, usize, usize)> = None;
        for from in 0..p {
            if parts[from] <= 1 {
                continue;
            }
            for to in [from.wrapping_sub(1), from + 1] {
                if to >= p {
                    continue;
                }
                parts[from] -= 1;
                parts[to] += 1;
                let cand = weighted_node_count(scheme, &parts, sigma, n_text, edit);
                parts[from] += 1;
                parts[to] -= 1;
                if cand < score && best.as_ref().map(|(b, _, _)| cand < *b).unwrap_or(true) {
                    best = Some((cand, from, to));
                }
            }
        }
        match best {
            Some((cand, from, to)) => {
                parts[from] -= 1;
                parts[to] += 1;
                score = cand;
            }
            None => break,
        }
    }
    Ok(parts)
}

/// 自顶向下：从每块 1 起步，按 step 个字符一批贪心长到 Q
pub fn wnc_parts_top_down(
    scheme: &[Search],
    query_len: usize,
    sigma: usize,
    n_text: usize,
    edit: bool,
    step: usize,
) -> Result<Vec<usize>> {
    let p = scheme[0].parts();
    if step == 0 {
        bail!("top-down expansion step must be positive");
    }
    if query_len < p {
        bail!(
            "query length {} is shorter than the scheme's {} parts",
            query_len, p
        );
    }
    let mut parts = vec![1usize; p];
    let mut remaining = query_len - p;
    while remaining > 0 {
        let grow = step.min(remaining);
        let mut best: Option<(f64, usize)> = None;
        for i in 0..p {
            parts[i] += grow;
            let cand = weighted_node_count(scheme, &parts, sigma, n_text, edit);
            parts[i] -= grow;
            if best.as_ref().map(|(b, _)| cand < *b).unwrap_or(true) {
                best = Some((cand, i));
            }
        }
        parts[best.unwrap().1] += grow;
        remaining -= grow;
    }
    Ok(parts)
}

/// 策略选择（CLI 的 expansion_mode）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMode {
    Uniform,
    BottomUp,
    TopDown,
}

impl ExpansionMode {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "uniform" => Ok(ExpansionMode::Uniform),
            "bottomup" => Ok(ExpansionMode::BottomUp),
            "topdown" => Ok(ExpansionMode::TopDown),
            other => bail!("invalid expansion mode \"{}\"", other),
        }
    }

    pub fn parts(
        self,
        scheme: &[Search],
        query_len: usize,
        sigma: usize,
        n_text: usize,
        edit: bool,
    ) -> Result<Vec<usize>> {
        match self {
            ExpansionMode::Uniform => uniform_parts(scheme[0].parts(), query_len),
            ExpansionMode::BottomUp => {
                wnc_parts_bottom_up(scheme, query_len, sigma, n_text, edit)
            }
            ExpansionMode::TopDown => {
                wnc_parts_top_down(scheme, query_len, sigma, n_text, edit, 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::generator;

    #[test]
    fn uniform_spreads_remainder_to_front() {
        assert_eq!(uniform_parts(3, 10).unwrap(), vec![4, 3, 3]);
        assert_eq!(uniform_parts(3, 9).unwrap(), vec![3, 3, 3]);
        assert_eq!(uniform_parts(4, 6).unwrap(), vec![2, 2, 1, 1]);
        assert!(uniform_parts(4, 3).is_err());
        assert!(uniform_parts(0, 3).is_err());
    }

    #[test]
    fn weighted_expansions_preserve_total_length() {
        let scheme = generator::h2_k2(0, 2, 4, 0).unwrap();
        for q in [30usize, 100, 151] {
            let bu = wnc_parts_bottom_up(&scheme, q, 4, 1_000_000, false).unwrap();
            assert_eq!(bu.iter().sum::<usize>(), q);
            assert!(bu.iter().all(|&c| c >= 1));
            let td = wnc_parts_top_down(&scheme, q, 4, 1_000_000, false, 2).unwrap();
            assert_eq!(td.iter().sum::<usize>(), q);
            assert!(td.iter().all(|&c| c >= 1));
        }
    }

    #[test]
    fn bottom_up_never_worse_than_uniform() {
        use crate::scheme::node_count::weighted_node_count;
        let scheme = generator::kianfar(0, 2, 4, 0).unwrap();
        let q = 60;
        let uni = uniform_parts(3, q).unwrap();
        let bu = wnc_parts_bottom_up(&scheme, q, 4, 1 << 30, false).unwrap();
        let s_uni = weighted_node_count(&scheme, &uni, 4, 1 << 30, false);
        let s_bu = weighted_node_count(&scheme, &bu, 4, 1 << 30, false);
        assert!(s_bu <= s_uni + 1e-9);
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!(ExpansionMode::from_name("uniform").unwrap(), ExpansionMode::Uniform);
        assert_eq!(ExpansionMode::from_name("bottomup").unwrap(), ExpansionMode::BottomUp);
        assert_eq!(ExpansionMode::from_name("topdown").unwrap(), ExpansionMode::TopDown);
        assert!(ExpansionMode::from_name("sideways").is_err());
    }
}
