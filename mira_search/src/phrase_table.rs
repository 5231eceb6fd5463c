use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use mira_core::input::{FACTOR_DELIMITER, Sentence};
use mira_core::model::{Phrase, Token};
use mira_core::{DecoderError, Result};

/// 一个源端 span 的翻译选项。
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOption {
    pub target: Phrase,
    /// 短语表分数列（对应特征 `tm_0`, `tm_1`, ...）
    pub scores: Vec<f32>,
}

/// 短语表抽象：后端不关心短语表来自文件还是内存。
///
/// 约定：`start..end` 是源句的词下标范围，含 start 不含 end。
pub trait PhraseTable: Send + Sync {
    /// 查询源端 `sentence[start..end]` 的翻译选项（按第一列分数降序）。
    fn lookup_span(&self, sentence: &Sentence, start: usize, end: usize, limit: usize) -> Vec<TranslationOption>;

    /// 分数列数（决定 `tm_*` 特征个数）。
    fn num_scores(&self) -> usize;
}

/// TSV 格式：
///
/// - `source<TAB>target<TAB>score score ...`
/// - 分数列可省略；省略时该条目所有 `tm_*` 为 0
/// - 允许 `#` 开头注释行
/// - target 端可带 factor（`house|NN`）
pub struct TsvPhraseTable {
    map: BTreeMap<String, Vec<TranslationOption>>,
    num_scores: usize,
}

impl TsvPhraseTable {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .map_err(|e| DecoderError::Configuration(format!("无法读取短语表 {}: {e}", path.display())))?;
        Self::from_tsv_str(&s)
    }

    pub fn from_tsv_str(s: &str) -> Result<Self> {
        let mut map: BTreeMap<String, Vec<TranslationOption>> = BTreeMap::new();
        let mut num_scores = 0;

        for (idx, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut it = line.split('\t');
            let source = it.next().unwrap_or("").trim();
            let target = it.next().unwrap_or("").trim();
            if source.is_empty() || target.is_empty() {
                return Err(DecoderError::Configuration(format!(
                    "短语表第 {} 行缺少 source/target",
                    idx + 1
                )));
            }
            let scores = match it.next().map(str::trim).filter(|x| !x.is_empty()) {
                Some(cols) => cols
                    .split_whitespace()
                    .map(|x| x.parse::<f32>())
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(|e| {
                        DecoderError::Configuration(format!("短语表第 {} 行分数无法解析: {e}", idx + 1))
                    })?,
                None => Vec::new(),
            };
            num_scores = num_scores.max(scores.len());

            let target: Phrase = target
                .split_whitespace()
                .map(|w| Token::with_factors(w.split(FACTOR_DELIMITER).map(str::to_string).collect()))
                .collect();
            let key = source.split_whitespace().collect::<Vec<_>>().join(" ");
            map.entry(key).or_default().push(TranslationOption { target, scores });
        }

        for v in map.values_mut() {
            v.sort_by(|a, b| {
                let sa = a.scores.first().copied().unwrap_or(0.0);
                let sb = b.scores.first().copied().unwrap_or(0.0);
                sb.total_cmp(&sa)
            });
        }

        Ok(Self { map, num_scores })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl PhraseTable for TsvPhraseTable {
    fn lookup_span(&self, sentence: &Sentence, start: usize, end: usize, limit: usize) -> Vec<TranslationOption> {
        let limit = limit.max(1);
        if start >= end || end > sentence.len() {
            return Vec::new();
        }
        let key = sentence.span_key(start, end);
        match self.map.get(&key) {
            Some(options) => options.iter().take(limit).cloned().collect(),
            None => Vec::new(),
        }
    }

    fn num_scores(&self) -> usize {
        self.num_scores
    }
}
