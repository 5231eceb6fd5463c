//! 搜索后端：短语表、特征函数，以及 beam search / chart parsing 两种实现。
pub mod beam;
pub mod chart;
pub mod features;
pub mod phrase_table;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use mira_core::backend::{SearchAlgorithm, SearchBackend};
use mira_core::config::SearchOptions;

pub use beam::{BeamSearch, BeamSession};
pub use chart::{ChartParser, ChartSession};
pub use phrase_table::{PhraseTable, TranslationOption, TsvPhraseTable};

/// 按算法构造后端。
pub fn backend_for<T>(algorithm: SearchAlgorithm, table: Arc<T>, options: SearchOptions) -> Box<dyn SearchBackend>
where
    T: PhraseTable + ?Sized + 'static,
{
    match algorithm {
        SearchAlgorithm::Beam => Box::new(BeamSearch::new(table, options)),
        SearchAlgorithm::Chart => Box::new(ChartParser::new(table, options)),
    }
}

/// 两种后端都构造出来（适配器可在运行时切换）。
pub fn all_backends<T>(table: Arc<T>, options: &SearchOptions) -> Vec<Box<dyn SearchBackend>>
where
    T: PhraseTable + ?Sized + 'static,
{
    [SearchAlgorithm::Beam, SearchAlgorithm::Chart]
        .into_iter()
        .map(|a| backend_for(a, Arc::clone(&table), options.clone()))
        .collect()
}
