use serde::{Deserialize, Serialize};

use crate::alphabet;

/// 边界表条目：文本中一个连续片段（正向序列或其反向互补拷贝）。
/// 片段按文本顺序排列；正向片段在前，反向片段（若启用镜像）在后。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub len: u32,
    pub reverse: bool,
}

/// 根据后缀数组构建 BWT。
/// text 为数值化字母表（0..SIGMA），sa 为后缀数组位置。
pub fn build_bwt(text: &[u8], sa: &[u32]) -> Vec<u8> {
    let n = text.len();
    if n == 0 {
        return Vec::new();
    }
    let mut bwt = Vec::with_capacity(n);
    for &p in sa {
        let i = p as usize;
        let prev = if i == 0 { text[n - 1] } else { text[i - 1] };
        bwt.push(prev);
    }
    bwt
}

/// 把参考序列拼接成索引文本。
///
/// - delimited：每条序列后跟一个哨兵 `$`；
/// - 非 delimited：全部直接相连，仅末尾一个哨兵（跨序列边界会出现假阳性命中）；
/// - include_reverse：所有正向片段之后，逐条追加反向互补拷贝（哨兵策略同上）。
pub fn assemble_text(
    refs: &[Vec<u8>],
    delimited: bool,
    include_reverse: bool,
) -> (Vec<u8>, Vec<Segment>) {
    let total: usize = refs.iter().map(|r| r.len()).sum();
    let copies = if include_reverse { 2 } else { 1 };
    let mut text = Vec::with_capacity(total * copies + refs.len() * copies + 1);
    let mut segments = Vec::with_capacity(refs.len() * copies);

    for r in refs {
        text.extend_from_slice(r);
        segments.push(Segment { len: r.len() as u32, reverse: false });
        if delimited {
            text.push(alphabet::SENTINEL);
        }
    }
    if include_reverse {
        for r in refs {
            let rc = alphabet::revcomp_ranks(r);
            text.extend_from_slice(&rc);
            segments.push(Segment { len: r.len() as u32, reverse: true });
            if delimited {
                text.push(alphabet::SENTINEL);
            }
        }
    }
    if !delimited {
        // 非 delimited 模式仍然需要唯一的终止哨兵
        text.push(alphabet::SENTINEL);
    }
    (text, segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::sa::build_sa;

    #[test]
    fn bwt_banana_like() {
        // 文本 ACCA$ -> SA 排序后最后一列
        let text = [1u8, 2, 2, 1, 0];
        let sa = build_sa(&text);
        let bwt = build_bwt(&text, &sa);
        assert_eq!(bwt.len(), text.len());
        // BWT 是文本的一个重排
        let mut sorted_t = text.to_vec();
        let mut sorted_b = bwt.clone();
        sorted_t.sort_unstable();
        sorted_b.sort_unstable();
        assert_eq!(sorted_t, sorted_b);
    }

    #[test]
    fn assemble_delimited() {
        let refs = vec![vec![1u8, 2], vec![3u8, 4, 4]];
        let (text, segs) = assemble_text(&refs, true, false);
        assert_eq!(text, vec![1, 2, 0, 3, 4, 4, 0]);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0], Segment { len: 2, reverse: false });
        assert_eq!(segs[1], Segment { len: 3, reverse: false });
    }

    #[test]
    fn assemble_non_delimited_single_sentinel() {
        let refs = vec![vec![1u8, 1], vec![2u8, 2]];
        let (text, segs) = assemble_text(&refs, false, false);
        assert_eq!(text, vec![1, 1, 2, 2, 0]);
        assert_eq!(segs.len(), 2);
    }

    #[test]
    fn assemble_mirrored_appends_revcomp() {
        // ACG 的反向互补是 CGT
        let refs = vec![vec![1u8, 2, 3]];
        let (text, segs) = assemble_text(&refs, true, true);
        assert_eq!(text, vec![1, 2, 3, 0, 2, 3, 4, 0]);
        assert_eq!(segs.len(), 2);
        assert!(!segs[0].reverse);
        assert!(segs[1].reverse);
        assert_eq!(segs[1].len, 3);
    }
}
