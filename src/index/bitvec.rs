use serde::{Deserialize, Serialize};

const WORD_BITS: usize = 64;
const BLOCK_BITS: usize = 512;
const SUPER_BITS: usize = 1 << 16;
const WORDS_PER_BLOCK: usize = BLOCK_BITS / WORD_BITS;

/// 支持 O(1) rank1 的定长位向量。
/// 两级计数：512 位块内相对计数（u32）+ 64Ki 位超块绝对计数（u64）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitVec {
    pub(crate) len: u64,
    pub(crate) words: Vec<u64>,
    pub(crate) blocks: Vec<u32>,
    pub(crate) superblocks: Vec<u64>,
}

impl BitVec {
    /// 全 0 的位向量；set 完所有位后必须调用 finalize 重建计数。
    pub fn new(len: usize) -> Self {
        let n_blocks = len.div_ceil(BLOCK_BITS).max(1);
        Self {
            len: len as u64,
            words: vec![0; n_blocks * WORDS_PER_BLOCK],
            blocks: vec![0; n_blocks],
            superblocks: vec![0; len.div_ceil(SUPER_BITS).max(1)],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn set(&mut self, i: usize) {
        debug_assert!(i < self.len as usize);
        self.words[i / WORD_BITS] |= 1u64 << (i % WORD_BITS);
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len as usize);
        (self.words[i / WORD_BITS] >> (i % WORD_BITS)) & 1 == 1
    }

    /// 重建两级计数表
    pub fn finalize(&mut self) {
        let mut total: u64 = 0;
        for (bi, chunk) in self.words.chunks(WORDS_PER_BLOCK).enumerate() {
            if bi * BLOCK_BITS % SUPER_BITS == 0 {
                self.superblocks[bi * BLOCK_BITS / SUPER_BITS] = total;
            }
            self.blocks[bi] = (total - self.superblocks[bi * BLOCK_BITS / SUPER_BITS]) as u32;
            for &w in chunk {
                total += w.count_ones() as u64;
            }
        }
    }

    /// [0, i) 中 1 的个数，i ∈ [0, len]
    #[inline]
    pub fn rank1(&self, i: usize) -> usize {
        debug_assert!(i <= self.len as usize);
        if i == 0 {
            return 0;
        }
        let bl = i / BLOCK_BITS;
        let mut cnt = self.superblocks[i / SUPER_BITS] + self.blocks[bl] as u64;
        let base = bl * WORDS_PER_BLOCK;
        let w_in_block = i / WORD_BITS - bl * WORDS_PER_BLOCK;
        for j in 0..w_in_block {
            cnt += self.words[base + j].count_ones() as u64;
        }
        let rem = i % WORD_BITS;
        if rem > 0 {
            let mask = (1u64 << rem) - 1;
            cnt += (self.words[base + w_in_block] & mask).count_ones() as u64;
        }
        cnt as usize
    }

    /// 1 的总数
    pub fn count_ones(&self) -> usize {
        self.rank1(self.len as usize)
    }
}
