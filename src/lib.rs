//! # fmsearch-rust
//!
//! 面向生物序列的近似匹配引擎：在双向 FM 索引上按搜索方案（search
//! scheme）做容错搜索。
//!
//! 本 crate 提供：
//!
//! - **索引构建**：参考序列拼接（delimited / 非 delimited / 镜像反链）、
//!   后缀数组、BWT、可插拔排名字典后端与稀疏 SA 采样器
//! - **搜索方案**：生成、校验（有效 / 完备 / 非冗余）、分块展开与
//!   节点数估价
//! - **容错搜索**：汉明 / 编辑距离回溯驱动，best-hits 模式与命中上限
//! - **并行批处理**：rayon 线程池按批调度查询并合并命中
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use fmsearch_rust::index::{BiFmIndex, BuildOpts};
//! use fmsearch_rust::search::{batch, Distance};
//!
//! // 构建索引（序列已转为排名编码：1:A 2:C 3:G 4:T）
//! let refs = vec![vec![1u8, 2, 3, 4, 1, 2, 3, 4]];
//! let index = BiFmIndex::build(&refs, BuildOpts::default()).unwrap();
//!
//! // 1 个错误以内搜索
//! let queries = vec![vec![1u8, 3, 3, 4]];
//! let opts = batch::BatchOpts { errors: 1, ..batch::BatchOpts::default() };
//! match batch::run(&index, &queries, &opts).unwrap() {
//!     batch::BatchOutput::Hits(hits) => {
//!         for h in hits {
//!             println!("query {} -> seq {} pos {} ({} errors)", h.query, h.seq, h.pos, h.errors);
//!         }
//!     }
//!     _ => unreachable!(),
//! }
//! ```
//!
//! ## 模块说明
//!
//! - [`alphabet`] — 字符与排名编码、反向互补、未知字符策略
//! - [`io`] — FASTA 解析与查询装载
//! - [`index`] — 后缀数组、BWT、排名字典、采样器、双向 FM 索引与持久化
//! - [`scheme`] — 搜索方案的生成、校验、展开与估价
//! - [`search`] — 回溯搜索驱动与并行批处理
//! - [`sim`] — 读段模拟器

pub mod alphabet;
pub mod index;
pub mod io;
pub mod scheme;
pub mod search;
pub mod sim;
