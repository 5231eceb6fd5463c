//! `SentenceContext`：一次解码的全部输入状态。
//!
//! 约定：
//! - 每次 `initialize_sentence` 创建一个，解码完成后在 `cleanup` 中丢弃
//! - 持有后端消费的输入表示（`Sentence`），不跨句共享
use serde::{Deserialize, Serialize};

use crate::input::Sentence;

/// 参考译文长度策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefLengthPolicy {
    /// 所有参考译文长度的平均值
    Average,
    /// 最短参考译文的长度
    #[default]
    Shortest,
}

impl RefLengthPolicy {
    pub fn from_avg_flag(avg_ref_length: bool) -> Self {
        if avg_ref_length {
            RefLengthPolicy::Average
        } else {
            RefLengthPolicy::Shortest
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentenceContext {
    /// 原始源句
    pub source: String,
    /// 调用方给定的句子 id（n-best 输出与 history 都用它）
    pub sentence_id: usize,
    /// 解析后的输入
    pub sentence: Sentence,
    pub ref_length_policy: RefLengthPolicy,
    /// BLEU 在搜索目标中的权重
    pub bleu_objective_weight: f32,
    /// BLEU 作为特征上报时的权重
    pub bleu_score_weight: f32,
}

impl SentenceContext {
    pub fn source_length(&self) -> usize {
        self.sentence.len()
    }

    /// 搜索时 BLEU 特征的实际权重：objective * score。
    pub fn combined_bleu_weight(&self) -> f32 {
        self.bleu_objective_weight * self.bleu_score_weight
    }
}
