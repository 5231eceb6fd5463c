use std::io::Write;
use std::sync::Arc;

use mira_core::bleu::{BLEU_FEATURE_NAME, BleuFeature, BleuParameters, SmoothingScheme};
use mira_core::context::RefLengthPolicy;
use mira_core::model::{FeatureId, Phrase, Token};
use mira_core::{DecoderError, Result};
use tracing::debug;

use crate::history::{BleuHistory, SentenceHistory};
use crate::ngram::{BLEU_ORDER, BleuStats};
use crate::references::References;

/// 当前绑定的句子。
#[derive(Debug, Clone, Default)]
struct Current {
    source_length: usize,
    /// (句子 id, 按策略选出的参考长度)
    reference_length: Option<(usize, f32)>,
    /// `set_current_reference_ngrams` 绑定的句子 id
    ngrams: Option<usize>,
}

/// BLEU 代理特征：句级 BLEU，或在 history（pseudo-document）上下文中的 BLEU。
///
/// 每个 rank 各有一个实例；`references` 与 `history` 通过 `Arc` 在 rank 之间共享。
#[derive(Debug)]
pub struct BleuScoreFeature {
    id: FeatureId,
    weight: f32,
    parameters: BleuParameters,
    references: Arc<References>,
    history: Arc<BleuHistory>,
    current: Current,
}

impl BleuScoreFeature {
    pub fn new(references: Arc<References>, history: Arc<BleuHistory>) -> Result<Self> {
        if references.len() != history.len() {
            return Err(DecoderError::Configuration(format!(
                "history 大小 {} 与参考译文句数 {} 不一致",
                history.len(),
                references.len()
            )));
        }
        Ok(Self::build(references, history))
    }

    /// 为一套参考译文创建配套的空 history。
    pub fn with_fresh_history(references: Arc<References>) -> Self {
        let history = Arc::new(BleuHistory::new(references.len()));
        Self::build(references, history)
    }

    fn build(references: Arc<References>, history: Arc<BleuHistory>) -> Self {
        Self {
            id: FeatureId::new(BLEU_FEATURE_NAME),
            weight: 0.0,
            parameters: BleuParameters::default(),
            references,
            history,
            current: Current::default(),
        }
    }

    pub fn parameters(mut self, parameters: BleuParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn references(&self) -> &Arc<References> {
        &self.references
    }

    pub fn history(&self) -> &Arc<BleuHistory> {
        &self.history
    }

    fn surfaces(hypothesis: &Phrase) -> Vec<&str> {
        hypothesis.iter().map(Token::surface).collect()
    }

    fn collect_stats(&self, sentence_id: usize, hypothesis: &Phrase, ref_length: f32) -> Result<BleuStats> {
        let reference = self.references.get(sentence_id)?;
        let scaled = ref_length * self.parameters.brevity_penalty_relaxation;
        Ok(BleuStats::collect(&Self::surfaces(hypothesis), scaled, |ng| {
            reference.max_count(ng)
        }))
    }

    fn current_reference_length(&self, sentence_id: usize) -> Result<f32> {
        match self.current.reference_length {
            Some((id, len)) if id == sentence_id => Ok(len),
            _ => Err(DecoderError::UninitializedReference(format!(
                "句子 {sentence_id} 的参考长度尚未设置"
            ))),
        }
    }

    fn average_input_length(&self) -> f32 {
        self.history
            .average_input_length()
            .unwrap_or(self.current.source_length as f32)
            .max(1.0)
    }

    fn calculate(&self, stats: &BleuStats, history: &SentenceHistory) -> f32 {
        if stats.counts[0] == 0.0 || stats.matches[0] == 0.0 {
            return 0.0;
        }
        let p = &self.parameters;
        let source_length = self.current.source_length.max(1) as f32;
        let mut precision = 1.0_f32;

        if p.sentence_bleu {
            let mut smooth = 1.0_f32;
            for i in 0..BLEU_ORDER {
                if stats.counts[i] == 0.0 {
                    continue;
                }
                let mut matches = stats.matches[i];
                let mut count = stats.counts[i];
                match p.scheme {
                    SmoothingScheme::PlusOne => {
                        if i > 0 {
                            matches += 1.0;
                            count += 1.0;
                        }
                    }
                    SmoothingScheme::PlusPointOne => {
                        if i > 0 {
                            matches += 0.1;
                            count += 0.1;
                        }
                    }
                    SmoothingScheme::Papineni => {
                        if stats.matches[i] == 0.0 {
                            smooth *= 0.5;
                            matches += smooth;
                            count += smooth;
                        }
                    }
                }
                precision *= matches / count;
            }
            precision = precision.powf(1.0 / BLEU_ORDER as f32);

            if stats.target_length < stats.ref_length {
                precision *= (1.0 - stats.ref_length / stats.target_length).exp();
            }

            if p.scale_by_input_length {
                precision *= source_length;
            } else if p.scale_by_avg_input_length {
                precision *= self.average_input_length();
            } else if p.scale_by_inverse_length {
                precision *= 100.0 / source_length;
            } else if p.scale_by_avg_inverse_length {
                precision *= 100.0 / self.average_input_length();
            }
            precision * p.scale_factor
        } else {
            // 伪文档（history + 当前假设）的 BLEU
            for i in 0..BLEU_ORDER {
                if stats.counts[i] == 0.0 {
                    continue;
                }
                let matches = history.matches[i] + stats.matches[i] + 0.1;
                let count = history.counts[i] + stats.counts[i] + 0.1;
                precision *= matches / count;
            }
            precision = precision.powf(1.0 / BLEU_ORDER as f32);

            let target_length = history.target_length + stats.target_length;
            let ref_length = history.ref_length + stats.ref_length;
            if target_length < ref_length {
                precision *= (1.0 - ref_length / target_length).exp();
            }

            let document_size = if p.use_source_length_history {
                history.source_length + source_length
            } else {
                source_length
            };
            precision * document_size * p.scale_factor
        }
    }
}

impl BleuFeature for BleuScoreFeature {
    fn id(&self) -> &FeatureId {
        &self.id
    }

    fn weight(&self) -> f32 {
        self.weight
    }

    fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    fn set_current_source_length(&mut self, length: usize) {
        self.current.source_length = length;
    }

    fn set_current_reference_length(&mut self, sentence_id: usize, policy: RefLengthPolicy) -> Result<()> {
        let reference = self.references.get(sentence_id)?;
        let length = match policy {
            RefLengthPolicy::Average => reference.average_length(),
            RefLengthPolicy::Shortest => reference.shortest_length() as f32,
        };
        self.current.reference_length = Some((sentence_id, length));
        Ok(())
    }

    fn set_current_reference_ngrams(&mut self, sentence_id: usize) -> Result<()> {
        self.references.get(sentence_id)?;
        self.history.check(sentence_id)?;
        self.current.ngrams = Some(sentence_id);
        Ok(())
    }

    fn current_sentence(&self) -> Option<usize> {
        self.current.ngrams
    }

    fn unbind(&mut self) {
        self.weight = 0.0;
        self.current = Current::default();
    }

    fn evaluate(&self, hypothesis: &Phrase) -> Result<f32> {
        let sentence_id = self.current.ngrams.ok_or_else(|| {
            DecoderError::UninitializedReference("打分前未调用 set_current_reference_ngrams".to_string())
        })?;
        let ref_length = self.current_reference_length(sentence_id)?;
        let stats = self.collect_stats(sentence_id, hypothesis, ref_length)?;
        let history = if self.parameters.sentence_bleu {
            SentenceHistory::default()
        } else {
            self.history.snapshot(sentence_id)?
        };
        Ok(self.calculate(&stats, &history))
    }

    fn update_history(&self, hypothesis: &Phrase, rank: usize, epoch: usize) -> Result<()> {
        let sentence_id = self.current.ngrams.ok_or_else(|| {
            DecoderError::UninitializedReference("更新 history 前没有绑定句子".to_string())
        })?;
        let ref_length = self.current_reference_length(sentence_id)?;
        let stats = self.collect_stats(sentence_id, hypothesis, ref_length)?;
        self.history.update(
            sentence_id,
            &stats,
            self.current.source_length,
            self.parameters.history_smoothing,
            Some((rank, epoch)),
        )
    }

    fn update_history_batch(
        &self,
        hypotheses: &[Phrase],
        source_lengths: &[usize],
        reference_ids: &[usize],
        rank: usize,
        epoch: usize,
    ) -> Result<()> {
        if hypotheses.len() != source_lengths.len() || hypotheses.len() != reference_ids.len() {
            return Err(DecoderError::InputParse(format!(
                "批量更新参数长度不一致：{} 个假设，{} 个源长，{} 个 id",
                hypotheses.len(),
                source_lengths.len(),
                reference_ids.len()
            )));
        }
        // 先整体校验，避免部分更新
        for &id in reference_ids {
            self.history.check(id)?;
            self.references.get(id)?;
        }
        for ((hypothesis, &source_length), &id) in hypotheses.iter().zip(source_lengths).zip(reference_ids) {
            let ref_length = self.references.get(id)?.closest_length(hypothesis.len()) as f32;
            let stats = self.collect_stats(id, hypothesis, ref_length)?;
            self.history.update(
                id,
                &stats,
                source_length,
                self.parameters.history_smoothing,
                Some((rank, epoch)),
            )?;
        }
        debug!(rank, epoch, updated = hypotheses.len(), "bleu history updated");
        Ok(())
    }

    fn closest_reference_length(&self, reference_id: usize, hypothesis_length: usize) -> Result<usize> {
        Ok(self.references.get(reference_id)?.closest_length(hypothesis_length))
    }

    fn shortest_reference_index(&self, reference_id: usize) -> Result<usize> {
        Ok(self.references.get(reference_id)?.shortest_index())
    }

    fn set_parameters(&mut self, parameters: BleuParameters) {
        self.parameters = parameters;
    }

    fn print_history(&self, out: &mut dyn Write) -> std::io::Result<()> {
        self.history.print(out)
    }
}
