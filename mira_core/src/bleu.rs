//! `bleu`：BLEU 代理特征的调用契约。
//!
//! 适配器只依赖这里的 trait；具体的 BLEU 计算与 history 由 `mira_bleu` 提供。
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::context::RefLengthPolicy;
use crate::error::Result;
use crate::model::{FeatureId, Phrase, ScoreVector};

/// BLEU 特征在 `ScoreVector` 中的默认名字。
pub const BLEU_FEATURE_NAME: &str = "bleu";

/// 平滑方案。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingScheme {
    /// n>1 的 matches/counts 各加 1
    #[default]
    PlusOne,
    /// n>1 的 matches/counts 各加 0.1
    PlusPointOne,
    /// 无匹配时依次加 1/2, 1/4, ...
    Papineni,
}

/// BLEU 特征的参数集合（构造时给出，也可在运行期整体替换）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleuParameters {
    /// true：句级 BLEU；false：在 pseudo-document（history）上下文里计算
    pub sentence_bleu: bool,
    pub scale_by_input_length: bool,
    pub scale_by_avg_input_length: bool,
    pub scale_by_inverse_length: bool,
    pub scale_by_avg_inverse_length: bool,
    pub scale_factor: f32,
    pub history_smoothing: f32,
    pub scheme: SmoothingScheme,
    /// 参考长度乘以该系数后再算 brevity penalty
    pub brevity_penalty_relaxation: f32,
    pub use_source_length_history: bool,
}

impl Default for BleuParameters {
    fn default() -> Self {
        Self {
            sentence_bleu: true,
            scale_by_input_length: false,
            scale_by_avg_input_length: false,
            scale_by_inverse_length: false,
            scale_by_avg_inverse_length: false,
            scale_factor: 1.0,
            history_smoothing: 0.9,
            scheme: SmoothingScheme::PlusOne,
            brevity_penalty_relaxation: 1.0,
            use_source_length_history: false,
        }
    }
}

/// BLEU 代理特征。
///
/// 约定：
/// - `set_current_*` 必须在对该句任何候选打分之前调用
/// - 未调用 `set_current_reference_ngrams` 就打分 -> `UninitializedReference`
/// - history 只增不减（除显式 reset，不在本 trait 范围内）
pub trait BleuFeature: Send + Sync {
    /// 本特征在 `ScoreVector` 中的身份。
    fn id(&self) -> &FeatureId;

    /// 搜索时使用的组合权重（objective * score）。
    fn weight(&self) -> f32;
    fn set_weight(&mut self, weight: f32);

    fn set_current_source_length(&mut self, length: usize);
    fn set_current_reference_length(&mut self, sentence_id: usize, policy: RefLengthPolicy) -> Result<()>;
    fn set_current_reference_ngrams(&mut self, sentence_id: usize) -> Result<()>;

    /// 当前绑定的句子 id（未绑定时为 None）。
    fn current_sentence(&self) -> Option<usize>;

    /// 解除句子绑定并把权重归零；之后打分和更新 history 都返回 `UninitializedReference`。
    fn unbind(&mut self);

    /// 对一个（部分或完整）假设打分。
    fn evaluate(&self, hypothesis: &Phrase) -> Result<f32>;

    /// 读取 `scores` 中本特征的分量。
    fn score(&self, scores: &ScoreVector) -> f32 {
        scores.get(self.id())
    }

    /// 覆盖 `scores` 中本特征的分量。
    fn assign(&self, scores: &mut ScoreVector, value: f32) {
        scores.assign(self.id(), value);
    }

    /// 把当前句的一个假设并入 history，并记下来源 (rank, epoch)。
    ///
    /// 只能在同一句的解码之后调用。
    fn update_history(&self, hypothesis: &Phrase, rank: usize, epoch: usize) -> Result<()>;

    /// 批量并入 history；三个切片按下标对齐。
    fn update_history_batch(
        &self,
        hypotheses: &[Phrase],
        source_lengths: &[usize],
        reference_ids: &[usize],
        rank: usize,
        epoch: usize,
    ) -> Result<()>;

    /// 与 `hypothesis_length` 最接近的参考译文长度。
    fn closest_reference_length(&self, reference_id: usize, hypothesis_length: usize) -> Result<usize>;

    /// 最短参考译文的下标。
    fn shortest_reference_index(&self, reference_id: usize) -> Result<usize>;

    fn set_parameters(&mut self, parameters: BleuParameters);

    fn print_history(&self, out: &mut dyn Write) -> std::io::Result<()>;
}
