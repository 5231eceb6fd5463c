//! `ActiveSession`：适配器独占持有的单句搜索会话。
//!
//! 不论底层是 beam 还是 chart，都只有这一个句柄；`Decoder::cleanup` 时确定性释放。
use std::io::{self, Write};

use crate::backend::{SearchAlgorithm, SearchSession};
use crate::model::Derivation;

pub struct ActiveSession {
    /// 创建该会话的后端
    algorithm: SearchAlgorithm,
    /// 调用方给定的句子 id
    sentence_id: usize,
    inner: Box<dyn SearchSession>,
}

impl ActiveSession {
    pub fn new(algorithm: SearchAlgorithm, sentence_id: usize, inner: Box<dyn SearchSession>) -> Self {
        Self {
            algorithm,
            sentence_id,
            inner,
        }
    }

    pub fn algorithm(&self) -> SearchAlgorithm {
        self.algorithm
    }

    pub fn sentence_id(&self) -> usize {
        self.sentence_id
    }

    pub fn extract_top_k(&self, k: usize, distinct: bool) -> Vec<Derivation> {
        self.inner.extract_top_k(k, distinct)
    }

    pub fn write_n_best(&self, out: &mut dyn Write, k: usize, distinct: bool) -> io::Result<()> {
        self.inner.write_n_best(out, self.sentence_id, k, distinct)
    }
}

impl std::fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSession")
            .field("algorithm", &self.algorithm)
            .field("sentence_id", &self.sentence_id)
            .finish_non_exhaustive()
    }
}
