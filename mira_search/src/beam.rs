//! 左到右 beam search（短语式解码）。
//!
//! 约定：
//! - `stacks[k]` 存放覆盖了 k 个源端词的假设，逐个 stack 扩展
//! - 每个 stack 扩展前按 total 降序截断到 `beam_size`
//! - 跳跃距离 = |新短语起点 - 上一个短语终点|，超过 `distortion_limit` 的扩展被丢弃
//! - 扩展后最左边未覆盖的词必须仍在 `distortion_limit` 之内，否则丢弃（避免留下够不到的空洞）
//! - 不做假设合并：同一输出的不同切分都会保留（`distinct` 负责去重）
use std::sync::Arc;

use mira_core::backend::{SearchAlgorithm, SearchBackend, SearchSession};
use mira_core::bleu::BleuFeature;
use mira_core::config::SearchOptions;
use mira_core::context::SentenceContext;
use mira_core::filter::{Filter, SortDedupTruncate};
use mira_core::model::{Derivation, Phrase, ScoreVector};
use mira_core::weights::WeightVector;
use mira_core::{DecoderError, Result};
use tracing::debug;

use crate::features::{FeatureIds, OptionMatrix, Scorer};
use crate::phrase_table::PhraseTable;

#[derive(Clone)]
struct Hypothesis {
    coverage: Vec<bool>,
    covered: usize,
    last_end: usize,
    phrase: Phrase,
    features: ScoreVector,
    bleu: f32,
    total: f32,
}

pub struct BeamSearch<T: ?Sized> {
    table: Arc<T>,
    options: SearchOptions,
}

impl<T: PhraseTable + ?Sized> BeamSearch<T> {
    pub fn new(table: Arc<T>, options: SearchOptions) -> Self {
        Self { table, options }
    }

    fn distortion_allowed(&self, distance: usize) -> bool {
        self.options.distortion_limit < 0 || distance <= self.options.distortion_limit as usize
    }

    /// 从 `end` 还能跳回最左边的空洞。
    fn gap_reachable(&self, coverage: &[bool], end: usize) -> bool {
        match coverage.iter().position(|c| !c) {
            Some(gap) => self.distortion_allowed(gap.abs_diff(end)),
            None => true,
        }
    }
}

impl<T: PhraseTable + ?Sized> SearchBackend for BeamSearch<T> {
    fn algorithm(&self) -> SearchAlgorithm {
        SearchAlgorithm::Beam
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

        let mut stacks: Vec<Vec<Hypothesis>> = vec![Vec::new(); n + 1];
        stacks[0].push(Hypothesis {
            coverage: vec![false; n],
            covered: 0,
            last_end: 0,
            phrase: Phrase::default(),
            features: ScoreVector::new(),
            bleu: 0.0,
            total: 0.0,
        });

        let mut expanded = 0usize;
        for k in 0..n {
            if stacks[k].is_empty() {
                continue;
            }
            let mut current = std::mem::take(&mut stacks[k]);
            current.sort_by(|a, b| b.total.total_cmp(&a.total));
            current.truncate(beam_k);

            for hyp in &current {
                for start in 0..n {
                    if hyp.coverage[start] {
                        continue;
                    }
                    let distance = start.abs_diff(hyp.last_end);
                    if !self.distortion_allowed(distance) {
                        continue;
                    }
                    for end in (start + 1)..=n {
                        if hyp.coverage[end - 1] {
                            break;
                        }
                        for option in matrix.get(start, end) {
                            let mut coverage = hyp.coverage.clone();
                            coverage[start..end].iter_mut().for_each(|c| *c = true);
                            if !self.gap_reachable(&coverage, end) {
                                continue;
                            }

                            let phrase = hyp.phrase.concat(&option.target);
                            let mut features = hyp.features.clone();
                            features.plus_equals(&option.features);
                            features.add(&ids.distortion, -(distance as f32));
                            let (b, total) = scorer.score(&phrase, &features)?;

                            let covered = hyp.covered + (end - start);
                            stacks[covered].push(Hypothesis {
                                coverage,
                                covered,
                                last_end: end,
                                phrase,
                                features,
                                bleu: b,
                                total,
                            });
                            expanded += 1;
                        }
                    }
                }
            }
        }

        let mut finals = std::mem::take(&mut stacks[n]);
        finals.sort_by(|a, b| b.total.total_cmp(&a.total));
        finals.truncate(beam_k);
        debug!(
            sentence_id = context.sentence_id,
            source_length = n,
            expanded,
            complete = finals.len(),
            "beam search 完成"
        );
        if finals.is_empty() {
            return Err(DecoderError::InputParse(format!(
                "句子 {} 在 distortion_limit = {} 下没有完整译文",
                context.sentence_id, self.options.distortion_limit
            )));
        }

        let derivations = finals
            .into_iter()
            .map(|h| scorer.finish(h.phrase, h.features, h.bleu, h.total))
            .collect();
        Ok(Box::new(BeamSession {
            derivations,
            expanded,
        }))
    }
}

/// beam search 的结果：最后一个 stack 里的完整假设（已按 total 降序）。
pub struct BeamSession {
    derivations: Vec<Derivation>,
    expanded: usize,
}

impl BeamSession {
    /// 搜索过程中生成的假设数。
    pub fn expanded(&self) -> usize {
        self.expanded
    }
}

impl SearchSession for BeamSession {
    fn extract_top_k(&self, k: usize, distinct: bool) -> Vec<Derivation> {
        SortDedupTruncate { limit: k, distinct }.apply(self.derivations.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phrase_table::TsvPhraseTable;
    use crate::test_support::{ZeroBleu, context, table};
    use mira_core::bleu::BLEU_FEATURE_NAME;

    fn weights() -> WeightVector {
        WeightVector::new()
            .with(&"tm_0".into(), 1.0)
            .with(&"distortion".into(), 1.0)
    }

    #[test]
    fn finds_best_monotone_translation() {
        let backend = BeamSearch::new(table(), SearchOptions::default());
        let bleu = ZeroBleu::new();
        let session = backend.search(&context("das haus"), &weights(), &bleu).unwrap();
        let top = session.extract_top_k(10, false);

        assert_eq!(top[0].phrase().to_string(), "the house");
        assert!((top[0].total_score() - (-0.3)).abs() < 1e-6);
        // 两种切分都能得到 "the house"
        let same: Vec<_> = top.iter().filter(|d| d.phrase().to_string() == "the house").collect();
        assert_eq!(same.len(), 2);
        assert!(top.iter().all(|d| d.scores().contains(&BLEU_FEATURE_NAME.into())));
        assert!(top.windows(2).all(|w| w[0].total_score() >= w[1].total_score()));

        let distinct = session.extract_top_k(10, true);
        let mut outputs: Vec<String> = distinct.iter().map(|d| d.phrase().to_string()).collect();
        let before = outputs.len();
        outputs.sort();
        outputs.dedup();
        assert_eq!(outputs.len(), before);
    }

    #[test]
    fn distortion_limit_zero_is_monotone() {
        let options = SearchOptions {
            distortion_limit: 0,
            ..SearchOptions::default()
        };
        let backend = BeamSearch::new(table(), options);
        let bleu = ZeroBleu::new();
        let session = backend.search(&context("klein haus"), &weights(), &bleu).unwrap();
        let top = session.extract_top_k(100, false);
        assert!(!top.is_empty());
        assert!(top.iter().all(|d| d.phrase().surfaces()[0] == "small"));
        assert!(top.iter().all(|d| d.scores().get(&"distortion".into()) == 0.0));

        let free = BeamSearch::new(table(), SearchOptions::default());
        let swapped = free.search(&context("klein haus"), &weights(), &bleu).unwrap();
        assert!(
            swapped
                .extract_top_k(100, false)
                .iter()
                .any(|d| d.phrase().surfaces()[0] != "small")
        );
    }

    #[test]
    fn unknown_words_pass_through() {
        let backend = BeamSearch::new(table(), SearchOptions::default());
        let bleu = ZeroBleu::new();
        let session = backend.search(&context("das boot"), &weights(), &bleu).unwrap();
        let best = &session.extract_top_k(1, false)[0];
        assert_eq!(best.phrase().to_string(), "the boot");
        assert_eq!(best.scores().get(&"unknown_word".into()), 1.0);
    }

    #[test]
    fn cheap_jumps_do_not_strand_uncovered_words() {
        let table = Arc::new(TsvPhraseTable::from_tsv_str("a\tA\t-5\nb\tB\t-5\nc\tC\t0\nd\tD\t-1\n").unwrap());
        let options = SearchOptions {
            beam_size: 1,
            distortion_limit: 2,
            ..SearchOptions::default()
        };
        let backend = BeamSearch::new(table, options);
        let bleu = ZeroBleu::new();
        let session = backend.search(&context("a b c d"), &weights(), &bleu).unwrap();
        let top = session.extract_top_k(10, false);
        assert!(!top.is_empty());
        let mut words = top[0].phrase().surfaces();
        words.sort_unstable();
        assert_eq!(words, vec!["A", "B", "C", "D"]);
    }
}
