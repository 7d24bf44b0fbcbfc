pub mod bitvec;
pub mod bwt;
pub mod fm;
pub mod rank;
pub mod sa;
pub mod sampler;
pub mod store;

pub use bwt::Segment;
pub use fm::{BiFmIndex, BuildOpts, Cursor, IndexMeta};
pub use rank::{RankDict, RankKind};
pub use sampler::SeqPos;
