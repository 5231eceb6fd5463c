//! `filter`：n-best 抽取的后处理（排序/去重/截断）。

use std::collections::HashSet;

use crate::model::{Derivation, Phrase};

/// Filter：对推导列表做后处理。
pub trait Filter: Send + Sync {
    fn apply(&self, derivations: Vec<Derivation>) -> Vec<Derivation>;
}

/// 默认 filter：按 total 稳定降序排序，可选按输出短语去重，截断到 limit。
///
/// 同分时保持输入顺序（即后端给出的顺序），不引入第二排序键。
pub struct SortDedupTruncate {
    pub limit: usize,
    pub distinct: bool,
}

impl Filter for SortDedupTruncate {
    fn apply(&self, mut derivations: Vec<Derivation>) -> Vec<Derivation> {
        derivations.sort_by(|a, b| b.total_score().total_cmp(&a.total_score()));
        if self.distinct {
            let mut seen: HashSet<Phrase> = HashSet::new();
            derivations.retain(|d| seen.insert(d.phrase().clone()));
        }
        derivations.truncate(self.limit);
        derivations
    }
}
