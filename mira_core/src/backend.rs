//! `backend`：搜索后端的能力接口。
//!
//! 两种实现（见 `mira_search`）：
//! - 左到右 beam search
//! - 自底向上 chart parsing
//!
//! 后端对每句话创建一个 session（`search`），适配器负责 session 的生命周期。
use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::bleu::BleuFeature;
use crate::context::SentenceContext;
use crate::error::Result;
use crate::model::Derivation;
use crate::weights::WeightVector;

/// 搜索算法（进程配置项）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchAlgorithm {
    #[default]
    Beam,
    Chart,
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchAlgorithm::Beam => f.write_str("beam"),
            SearchAlgorithm::Chart => f.write_str("chart"),
        }
    }
}

impl std::str::FromStr for SearchAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "beam" => Ok(SearchAlgorithm::Beam),
            "chart" => Ok(SearchAlgorithm::Chart),
            other => Err(format!("未知搜索算法 `{other}`（可选 beam/chart）")),
        }
    }
}

/// 搜索后端：无状态的工厂，每句话产出一个 session。
pub trait SearchBackend: Send + Sync {
    fn algorithm(&self) -> SearchAlgorithm;

    /// 阻塞地完成整句搜索；要么返回完整 session，要么失败。
    fn search(
        &self,
        context: &SentenceContext,
        weights: &WeightVector,
        bleu: &dyn BleuFeature,
    ) -> Result<Box<dyn SearchSession>>;
}

/// 单句搜索会话：持有搜索结果，供 n-best 抽取。
pub trait SearchSession: Send {
    /// 抽取前 k 个推导（按 total 降序；同分保持后端自己的顺序）。
    /// - `distinct`：同一输出短语只保留分数最高的那个
    fn extract_top_k(&self, k: usize, distinct: bool) -> Vec<Derivation>;

    /// 以后端原生的 n-best 文本格式输出；句子 id 一律使用调用方给定的值。
    fn write_n_best(&self, out: &mut dyn Write, sentence_id: usize, k: usize, distinct: bool) -> io::Result<()> {
        crate::nbest::write_moses_n_best(out, sentence_id, &self.extract_top_k(k, distinct))
    }
}
