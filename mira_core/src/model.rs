use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 输出词（可带多个 factor，例如 surface|POS|lemma）。
///
/// 创建后不可变；由所在的 `Phrase` 持有。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token {
    factors: Vec<String>,
}

impl Token {
    /// 单 factor 词。
    pub fn new(surface: impl Into<String>) -> Self {
        Self {
            factors: vec![surface.into()],
        }
    }

    /// 多 factor 词；调用方保证 `factors` 非空。
    pub fn with_factors(factors: Vec<String>) -> Self {
        debug_assert!(!factors.is_empty());
        Self { factors }
    }

    /// 第一个 factor（表层词形）。
    pub fn surface(&self) -> &str {
        self.factors.first().map(String::as_str).unwrap_or("")
    }

    pub fn factor(&self, index: usize) -> Option<&str> {
        self.factors.get(index).map(String::as_str)
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factors.join("|"))
    }
}

/// 候选译文的目标端词序列；跨适配器边界时按值复制。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Phrase {
    tokens: Vec<Token>,
}

impl Phrase {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// 由表层词构造（每个词只有一个 factor）。
    pub fn from_words<S: AsRef<str>>(words: &[S]) -> Self {
        Self {
            tokens: words.iter().map(|w| Token::new(w.as_ref())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn surfaces(&self) -> Vec<&str> {
        self.tokens.iter().map(Token::surface).collect()
    }

    /// 拼接：`self` 在前，`other` 在后。
    pub fn concat(&self, other: &Phrase) -> Phrase {
        let mut tokens = Vec::with_capacity(self.len() + other.len());
        tokens.extend_from_slice(&self.tokens);
        tokens.extend_from_slice(&other.tokens);
        Phrase { tokens }
    }
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{t}")?;
        }
        Ok(())
    }
}

impl FromIterator<Token> for Phrase {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

/// 特征（score producer）的身份。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// 特征值向量：producer -> 分值。
///
/// 约定：
/// - 键唯一；不存在的键读作 0
/// - `assign` 覆盖，`add` 累加
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreVector {
    values: BTreeMap<FeatureId, f32>,
}

impl ScoreVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &FeatureId) -> f32 {
        self.values.get(id).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.values.contains_key(id)
    }

    pub fn assign(&mut self, id: &FeatureId, value: f32) {
        match self.values.get_mut(id) {
            Some(v) => *v = value,
            None => {
                self.values.insert(id.clone(), value);
            }
        }
    }

    pub fn add(&mut self, id: &FeatureId, value: f32) {
        *self.values.entry(id.clone()).or_insert(0.0) += value;
    }

    /// 逐项累加 `other`。
    pub fn plus_equals(&mut self, other: &ScoreVector) {
        for (id, v) in &other.values {
            self.add(id, *v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FeatureId, f32)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 点积：只计算双方都有的键。
    pub fn inner_product(&self, other: &ScoreVector) -> f32 {
        self.values
            .iter()
            .map(|(id, v)| v * other.get(id))
            .sum()
    }
}

impl fmt::Display for ScoreVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (id, v)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{id}= {v}")?;
        }
        Ok(())
    }
}

impl<'a> FromIterator<(&'a str, f32)> for ScoreVector {
    fn from_iter<I: IntoIterator<Item = (&'a str, f32)>>(iter: I) -> Self {
        let mut sv = ScoreVector::new();
        for (name, v) in iter {
            sv.assign(&FeatureId::new(name), v);
        }
        sv
    }
}

/// 后端抽取出的一个完整候选（推导）。
///
/// 创建后只允许适配器做一次“清零 BLEU 项”的改写。
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    phrase: Phrase,
    scores: ScoreVector,
    total_score: f32,
}

impl Derivation {
    pub fn new(phrase: Phrase, scores: ScoreVector, total_score: f32) -> Self {
        Self {
            phrase,
            scores,
            total_score,
        }
    }

    pub fn phrase(&self) -> &Phrase {
        &self.phrase
    }

    pub fn scores(&self) -> &ScoreVector {
        &self.scores
    }

    pub fn total_score(&self) -> f32 {
        self.total_score
    }

    pub(crate) fn into_parts(self) -> (Phrase, ScoreVector, f32) {
        (self.phrase, self.scores, self.total_score)
    }
}

/// 分解打分后的候选：交给训练器消费。
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub phrase: Phrase,
    /// BLEU 项已清零的特征向量
    pub scores: ScoreVector,
    pub bleu_score: f32,
    /// total - objective_weight * score_weight * bleu
    pub model_score: f32,
    pub total_score: f32,
}

/// 一次 `decode_and_rescore` 的结果。
///
/// `n_best` 保留全部抽取结果的分解分数（训练器构造 margin 约束时需要），
/// `returned()` 只给出前 `num_returned` 个。
#[derive(Debug, Clone)]
pub struct RankedCandidates {
    pub sentence_id: usize,
    pub rank: usize,
    pub epoch: usize,
    pub n_best: Vec<Candidate>,
    num_returned: usize,
}

impl RankedCandidates {
    pub fn new(
        sentence_id: usize,
        rank: usize,
        epoch: usize,
        n_best: Vec<Candidate>,
        num_returned: usize,
    ) -> Self {
        Self {
            sentence_id,
            rank,
            epoch,
            n_best,
            num_returned,
        }
    }

    /// 从 n-best 头部取出的候选（最多 `num_returned` 个）。
    pub fn returned(&self) -> &[Candidate] {
        let n = self.num_returned.min(self.n_best.len());
        &self.n_best[..n]
    }

    pub fn translations(&self) -> Vec<Phrase> {
        self.returned().iter().map(|c| c.phrase.clone()).collect()
    }

    pub fn bleu_scores(&self) -> Vec<f32> {
        self.returned().iter().map(|c| c.bleu_score).collect()
    }

    pub fn model_scores(&self) -> Vec<f32> {
        self.returned().iter().map(|c| c.model_score).collect()
    }

    pub fn total_scores(&self) -> Vec<f32> {
        self.returned().iter().map(|c| c.total_score).collect()
    }

    pub fn feature_values(&self) -> Vec<ScoreVector> {
        self.returned().iter().map(|c| c.scores.clone()).collect()
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.returned().first()
    }

    pub fn is_empty(&self) -> bool {
        self.returned().is_empty()
    }
}
