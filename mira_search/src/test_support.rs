//! 单元测试共用的桩与小型短语表。
use std::sync::Arc;

use mira_core::Result;
use mira_core::bleu::{BLEU_FEATURE_NAME, BleuFeature, BleuParameters};
use mira_core::context::{RefLengthPolicy, SentenceContext};
use mira_core::input::{FactorParser, InputParser};
use mira_core::model::{FeatureId, Phrase};

use crate::phrase_table::TsvPhraseTable;

/// 不看参考译文的 BLEU：恒为 0，权重为 0。
pub struct ZeroBleu(FeatureId);

impl ZeroBleu {
    pub fn new() -> Self {
        Self(BLEU_FEATURE_NAME.into())
    }
}

impl BleuFeature for ZeroBleu {
    fn id(&self) -> &FeatureId {
        &self.0
    }
    fn weight(&self) -> f32 {
        0.0
    }
    fn set_weight(&mut self, _: f32) {}
    fn set_current_source_length(&mut self, _: usize) {}
    fn set_current_reference_length(&mut self, _: usize, _: RefLengthPolicy) -> Result<()> {
        Ok(())
    }
    fn set_current_reference_ngrams(&mut self, _: usize) -> Result<()> {
        Ok(())
    }
    fn current_sentence(&self) -> Option<usize> {
        Some(0)
    }
    fn unbind(&mut self) {}
    fn evaluate(&self, _: &Phrase) -> Result<f32> {
        Ok(0.0)
    }
    fn update_history(&self, _: &Phrase, _: usize, _: usize) -> Result<()> {
        Ok(())
    }
    fn update_history_batch(&self, _: &[Phrase], _: &[usize], _: &[usize], _: usize, _: usize) -> Result<()> {
        Ok(())
    }
    fn closest_reference_length(&self, _: usize, _: usize) -> Result<usize> {
        Ok(0)
    }
    fn shortest_reference_index(&self, _: usize) -> Result<usize> {
        Ok(0)
    }
    fn set_parameters(&mut self, _: BleuParameters) {}
    fn print_history(&self, _: &mut dyn std::io::Write) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn context(source: &str) -> SentenceContext {
    SentenceContext {
        source: source.to_string(),
        sentence_id: 0,
        sentence: FactorParser::default().parse(source).unwrap(),
        ref_length_policy: RefLengthPolicy::Shortest,
        bleu_objective_weight: 1.0,
        bleu_score_weight: 1.0,
    }
}

pub fn table() -> Arc<TsvPhraseTable> {
    Arc::new(
        TsvPhraseTable::from_tsv_str(
            "das\tthe\t-0.1\n\
             haus\thouse\t-0.2\n\
             haus\thome\t-0.9\n\
             das haus\tthe house\t-0.4\n\
             klein\tsmall\t-0.3\n",
        )
        .unwrap(),
    )
}
