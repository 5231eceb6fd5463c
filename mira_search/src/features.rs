//! 两种后端共用的特征函数与打分。
//!
//! 特征：
//! - `tm_<i>`：短语表第 i 列分数
//! - `word_penalty`：每个目标词 -1
//! - `phrase_penalty`：每个短语 +1
//! - `unknown_word`：每个原样透传的未登录词 +1
//! - `distortion`：beam search 的跳跃距离（负值）
//! - `glue` / `inversion`：chart 的顺序/倒序组合次数
//!
//! BLEU 特征不进入 `ScoreVector`，直到推导完成时才写入（见 `Scorer::finish`）。
use mira_core::bleu::BleuFeature;
use mira_core::input::Sentence;
use mira_core::model::{Derivation, FeatureId, Phrase, ScoreVector, Token};
use mira_core::weights::WeightVector;
use mira_core::Result;

use crate::phrase_table::{PhraseTable, TranslationOption};

pub const WORD_PENALTY: &str = "word_penalty";
pub const PHRASE_PENALTY: &str = "phrase_penalty";
pub const UNKNOWN_WORD: &str = "unknown_word";
pub const DISTORTION: &str = "distortion";
pub const GLUE: &str = "glue";
pub const INVERSION: &str = "inversion";

pub fn tm_feature(index: usize) -> FeatureId {
    FeatureId::new(format!("tm_{index}"))
}

/// 预先构造好的特征 id，避免在内层循环里反复分配。
#[derive(Debug, Clone)]
pub struct FeatureIds {
    pub tm: Vec<FeatureId>,
    pub word_penalty: FeatureId,
    pub phrase_penalty: FeatureId,
    pub unknown_word: FeatureId,
    pub distortion: FeatureId,
    pub glue: FeatureId,
    pub inversion: FeatureId,
}

impl FeatureIds {
    pub fn new(num_scores: usize) -> Self {
        Self {
            tm: (0..num_scores).map(tm_feature).collect(),
            word_penalty: WORD_PENALTY.into(),
            phrase_penalty: PHRASE_PENALTY.into(),
            unknown_word: UNKNOWN_WORD.into(),
            distortion: DISTORTION.into(),
            glue: GLUE.into(),
            inversion: INVERSION.into(),
        }
    }
}

/// 一个已打好局部特征的翻译选项。
#[derive(Debug, Clone)]
pub struct ScoredOption {
    pub target: Phrase,
    pub features: ScoreVector,
}

impl ScoredOption {
    fn from_option(ids: &FeatureIds, option: TranslationOption) -> Self {
        let mut features = ScoreVector::new();
        for (id, score) in ids.tm.iter().zip(&option.scores) {
            features.assign(id, *score);
        }
        features.assign(&ids.word_penalty, -(option.target.len() as f32));
        features.assign(&ids.phrase_penalty, 1.0);
        Self {
            target: option.target,
            features,
        }
    }

    fn passthrough(ids: &FeatureIds, token: &Token) -> Self {
        let mut features = ScoreVector::new();
        features.assign(&ids.word_penalty, -1.0);
        features.assign(&ids.phrase_penalty, 1.0);
        features.assign(&ids.unknown_word, 1.0);
        Self {
            target: Phrase::new(vec![token.clone()]),
            features,
        }
    }
}

/// 源句所有 span 的翻译选项：`spans[start][len - 1]`。
///
/// 单词 span 查不到时原样透传，保证任何输入都至少有一个完整推导。
pub struct OptionMatrix {
    spans: Vec<Vec<Vec<ScoredOption>>>,
    max_phrase_length: usize,
}

impl OptionMatrix {
    pub fn collect<T: PhraseTable + ?Sized>(
        table: &T,
        ids: &FeatureIds,
        sentence: &Sentence,
        max_phrase_length: usize,
        per_span_limit: usize,
    ) -> Self {
        let n = sentence.len();
        let max_phrase_length = max_phrase_length.max(1);
        let mut spans = Vec::with_capacity(n);
        for start in 0..n {
            let max_end = (start + max_phrase_length).min(n);
            let mut by_len = Vec::with_capacity(max_end - start);
            for end in (start + 1)..=max_end {
                let mut options: Vec<ScoredOption> = table
                    .lookup_span(sentence, start, end, per_span_limit)
                    .into_iter()
                    .map(|o| ScoredOption::from_option(ids, o))
                    .collect();
                if options.is_empty() && end == start + 1 {
                    options.push(ScoredOption::passthrough(ids, &sentence.tokens()[start]));
                }
                by_len.push(options);
            }
            spans.push(by_len);
        }
        Self {
            spans,
            max_phrase_length,
        }
    }

    pub fn get(&self, start: usize, end: usize) -> &[ScoredOption] {
        if start >= end || end - start > self.max_phrase_length {
            return &[];
        }
        self.spans
            .get(start)
            .and_then(|by_len| by_len.get(end - start - 1))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// 打分器：模型分数 + BLEU 权重 * 部分 BLEU。
pub struct Scorer<'a> {
    pub weights: &'a WeightVector,
    pub bleu: &'a dyn BleuFeature,
}

impl<'a> Scorer<'a> {
    pub fn new(weights: &'a WeightVector, bleu: &'a dyn BleuFeature) -> Self {
        Self { weights, bleu }
    }

    /// 返回 `(bleu, total)`；部分假设也按当前输出计算 BLEU。
    pub fn score(&self, phrase: &Phrase, features: &ScoreVector) -> Result<(f32, f32)> {
        let bleu = self.bleu.evaluate(phrase)?;
        let total = self.weights.score(features) + self.bleu.weight() * bleu;
        Ok((bleu, total))
    }

    /// 完成的推导：把 BLEU 写进分数向量。
    pub fn finish(&self, phrase: Phrase, mut features: ScoreVector, bleu: f32, total: f32) -> Derivation {
        self.bleu.assign(&mut features, bleu);
        Derivation::new(phrase, features, total)
    }
}
