//! `config`：解码器配置（JSON）。
//!
//! 示例：
//! ```json
//! {
//!   "search_algorithm": "chart",
//!   "phrase_table": "model/phrase-table.tsv",
//!   "references": ["dev/ref.0", "dev/ref.1"],
//!   "search": { "beam_size": 50 },
//!   "bleu": { "history_smoothing": 0.7 },
//!   "weights": { "tm_0": 0.3, "word_penalty": -0.5 }
//! }
//! ```
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::SearchAlgorithm;
use crate::bleu::BleuParameters;
use crate::error::{DecoderError, Result};
use crate::weights::WeightVector;

/// 搜索参数（两种后端共用）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// 每个 stack / chart cell 最多保留的假设数
    pub beam_size: usize,
    /// 短语最多覆盖多少个源端词
    pub max_phrase_length: usize,
    /// beam search 的跳跃上限；负数表示不限制
    pub distortion_limit: i32,
    /// 每个源端 span 最多取多少个翻译选项
    pub per_span_limit: usize,
    /// chart parsing 是否允许倒序组合
    pub allow_inversion: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            beam_size: 100,
            max_phrase_length: 7,
            distortion_limit: 6,
            per_span_limit: 20,
            allow_inversion: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default)]
    pub search_algorithm: SearchAlgorithm,
    #[serde(default = "default_factor_order")]
    pub input_factor_order: Vec<usize>,
    #[serde(default)]
    pub search: SearchOptions,
    #[serde(default)]
    pub bleu: BleuParameters,
    pub phrase_table: PathBuf,
    pub references: Vec<PathBuf>,
    #[serde(default)]
    pub weights: BTreeMap<String, f32>,
}

fn default_factor_order() -> Vec<usize> {
    vec![0]
}

impl DecoderConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .map_err(|e| DecoderError::Configuration(format!("无法读取配置 {}: {e}", path.display())))?;
        let mut config = Self::from_json_str(&s)?;
        config.resolve_relative_to(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| DecoderError::Configuration(format!("配置格式错误: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 相对路径按配置文件所在目录解析。
    fn resolve_relative_to(&mut self, base: &Path) {
        if self.phrase_table.is_relative() {
            self.phrase_table = base.join(&self.phrase_table);
        }
        for r in &mut self.references {
            if r.is_relative() {
                *r = base.join(&*r);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.references.is_empty() {
            return Err(DecoderError::Configuration("至少需要一个参考译文文件".into()));
        }
        if self.input_factor_order.is_empty() {
            return Err(DecoderError::Configuration("input_factor_order 不能为空".into()));
        }
        if self.search.beam_size == 0 {
            return Err(DecoderError::Configuration("beam_size 必须大于 0".into()));
        }
        if self.search.max_phrase_length == 0 {
            return Err(DecoderError::Configuration("max_phrase_length 必须大于 0".into()));
        }
        let smoothing = self.bleu.history_smoothing;
        if !(0.0..=1.0).contains(&smoothing) {
            return Err(DecoderError::Configuration(format!(
                "history_smoothing 应在 [0, 1] 内，实际为 {smoothing}"
            )));
        }
        if self.bleu.brevity_penalty_relaxation <= 0.0 {
            return Err(DecoderError::Configuration("brevity_penalty_relaxation 必须为正".into()));
        }
        Ok(())
    }

    pub fn initial_weights(&self) -> WeightVector {
        WeightVector::from_map(&self.weights)
    }
}
