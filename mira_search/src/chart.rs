//! 自底向上 chart parsing（CKY 式）。
//!
//! 约定：
//! - `cells[start][len - 1]` 覆盖源端 `start..start + len`
//! - 一个 cell 的来源：该 span 的短语规则 + 任意切分点上左右两个子 cell 的组合
//! - 组合默认顺序拼接（`glue` +1）；允许倒序时同时生成右+左（`glue` +1，`inversion` +1）
//! - 每个 cell 按 total 降序截断到 `beam_size`，同分保持生成顺序
use std::sync::Arc;

use mira_core::backend::{SearchAlgorithm, SearchBackend, SearchSession};
use mira_core::bleu::BleuFeature;
use mira_core::config::SearchOptions;
use mira_core::context::SentenceContext;
use mira_core::filter::{Filter, SortDedupTruncate};
use mira_core::model::{Derivation, Phrase, ScoreVector};
use mira_core::weights::WeightVector;
use mira_core::Result;
use tracing::debug;

use crate::features::{FeatureIds, OptionMatrix, Scorer};
use crate::phrase_table::PhraseTable;

#[derive(Debug, Clone)]
struct ChartItem {
    phrase: Phrase,
    features: ScoreVector,
    bleu: f32,
    total: f32,
}

pub struct ChartParser<T: ?Sized> {
    table: Arc<T>,
    options: SearchOptions,
}

impl<T: PhraseTable + ?Sized> ChartParser<T> {
    pub fn new(table: Arc<T>, options: SearchOptions) -> Self {
        Self { table, options }
    }
}

fn combine(
    scorer: &Scorer<'_>,
    ids: &FeatureIds,
    first: &ChartItem,
    second: &ChartItem,
    inverted: bool,
) -> Result<ChartItem> {
    let phrase = first.phrase.concat(&second.phrase);
    let mut features = first.features.clone();
    features.plus_equals(&second.features);
    features.add(&ids.glue, 1.0);
    if inverted {
        features.add(&ids.inversion, 1.0);
    }
    let (bleu, total) = scorer.score(&phrase, &features)?;
    Ok(ChartItem {
        phrase,
        features,
        bleu,
        total,
    })
}

impl<T: PhraseTable + ?Sized> SearchBackend for ChartParser<T> {
    fn algorithm(&self) -> SearchAlgorithm {
        SearchAlgorithm::Chart
    }

    fn search(
        &self,
        context: &SentenceContext,
        weights: &WeightVector,
        bleu: &dyn BleuFeature,
    ) -> Result<Box<dyn SearchSession>> {
        let sentence = &context.sentence;
        let n = sentence.len();
        let ids = FeatureIds::new(self.table.num_scores());
        let matrix = OptionMatrix::collect(
            self.table.as_ref(),
            &ids,
            sentence,
            self.options.max_phrase_length,
            self.options.per_span_limit,
        );
        let scorer = Scorer::new(weights, bleu);
        let beam_k = self.options.beam_size.max(1);

        let mut cells: Vec<Vec<Vec<ChartItem>>> = (0..n).map(|start| vec![Vec::new(); n - start]).collect();
        let mut built = 0usize;

        for len in 1..=n {
            for start in 0..=(n - len) {
                let end = start + len;
                let mut items = Vec::new();

                for option in matrix.get(start, end) {
                    let (b, total) = scorer.score(&option.target, &option.features)?;
                    items.push(ChartItem {
                        phrase: option.target.clone(),
                        features: option.features.clone(),
                        bleu: b,
                        total,
                    });
                }

                for mid in (start + 1)..end {
                    let left = &cells[start][mid - start - 1];
                    let right = &cells[mid][end - mid - 1];
                    for l in left {
                        for r in right {
                            items.push(combine(&scorer, &ids, l, r, false)?);
                            if self.options.allow_inversion {
                                items.push(combine(&scorer, &ids, r, l, true)?);
                            }
                        }
                    }
                }

                items.sort_by(|a, b| b.total.total_cmp(&a.total));
                items.truncate(beam_k);
                built += items.len();
                cells[start][len - 1] = items;
            }
        }

        let root = if n == 0 {
            Vec::new()
        } else {
            std::mem::take(&mut cells[0][n - 1])
        };
        debug!(
            sentence_id = context.sentence_id,
            source_length = n,
            items = built,
            complete = root.len(),
            "chart parsing 完成"
        );

        let derivations = root
            .into_iter()
            .map(|item| scorer.finish(item.phrase, item.features, item.bleu, item.total))
            .collect();
        Ok(Box::new(ChartSession {
            derivations,
            items: built,
        }))
    }
}

/// chart parsing 的结果：覆盖整句的根 cell。
pub struct ChartSession {
    derivations: Vec<Derivation>,
    items: usize,
}

impl ChartSession {
    /// 所有 cell 剪枝后保留的条目总数。
    pub fn items(&self) -> usize {
        self.items
    }
}

impl SearchSession for ChartSession {
    fn extract_top_k(&self, k: usize, distinct: bool) -> Vec<Derivation> {
        SortDedupTruncate { limit: k, distinct }.apply(self.derivations.clone())
    }
}
