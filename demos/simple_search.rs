//! 演示如何在 library 模式下使用 fmsearch-rust 做容错搜索。
//!
//! 运行方式：
//! ```bash
//! cargo run --example simple_search
//! ```

use fmsearch_rust::alphabet;
use fmsearch_rust::index::fm::{BiFmIndex, BuildOpts};
use fmsearch_rust::scheme::{expand, generator};
use fmsearch_rust::search::{search_query, Distance, SearchOpts};

fn main() {
    // 1. 参考序列转排名编码
    let reference = b"ACGTACGTAGCTGATCGTAGCTAGCTAGCTGATCGTAGCTAGCTAGCTGAT";
    println!("参考序列: {}", std::str::from_utf8(reference).unwrap());
    let mut rng = alphabet::Lcg::new(1);
    let ranks = alphabet::seq_to_ranks(reference, alphabet::UnknownPolicy::Fail, &mut rng).unwrap();

    // 2. 构建双向 FM 索引
    let index = BiFmIndex::build(&vec![ranks.clone()], BuildOpts::default()).unwrap();
    println!("索引构建完成：文本长度={}, σ={}", index.size(), index.sigma());

    // 3. 精确匹配（k=0 快路径）
    let pattern = b"GCTGATCGTAG";
    let pat_ranks =
        alphabet::seq_to_ranks(pattern, alphabet::UnknownPolicy::Fail, &mut rng).unwrap();
    if let Some(cur) = index.backward_search(&pat_ranks) {
        println!("\n精确匹配 '{}': 找到 {} 处", std::str::from_utf8(pattern).unwrap(), cur.len);
        for row in cur.lb..cur.lb + cur.len {
            let (entry, offset) = index.locate(row);
            println!("  seq={}, pos={}", entry.seq, entry.pos as usize + offset);
        }
    }

    // 4. 带 1 个错误的方案搜索
    let mut query = ranks[8..28].to_vec();
    query[10] = if query[10] == 1 { 2 } else { 1 }; // 注入一个替换
    let entry = generator::get("h2-k2").unwrap();
    let scheme = (entry.generate)(0, 1, index.sigma(), index.size()).unwrap();
    let parts = expand::uniform_parts(scheme[0].parts(), query.len()).unwrap();

    println!("\nk=1 搜索（20bp，带 1 个注入错误）:");
    search_query(
        &index,
        &query,
        &scheme,
        &parts,
        SearchOpts { distance: Distance::Hamming, ..SearchOpts::default() },
        &mut |cur, errors| {
            for row in cur.lb..cur.lb + cur.len {
                let (entry, offset) = index.locate(row);
                println!("  seq={}, pos={}, errors={}", entry.seq, entry.pos as usize + offset, errors);
            }
        },
    );

    // 5. 方案本身长什么样
    println!("\nh2-k2 的搜索方案:");
    for s in &scheme {
        println!("  pi={:?} l={:?} u={:?}", s.pi, s.l, s.u);
    }

    println!("\n完成！");
}
