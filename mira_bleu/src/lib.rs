//! BLEU 代理特征：参考译文统计、句级/文档级 BLEU、按句子 id 组织的 history。
mod feature;
mod history;
mod ngram;
mod references;

pub use feature::BleuScoreFeature;
pub use history::{BleuHistory, SentenceHistory};
pub use ngram::{BLEU_ORDER, BleuStats, ngram_counts};
pub use references::{ReferenceSentence, References};
