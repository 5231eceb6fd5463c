use std::collections::HashMap;
use std::fs;
use std::path::Path;

use mira_core::{DecoderError, Result};

use crate::ngram::{BLEU_ORDER, ngram_counts};

/// 一个源句对应的全部参考译文的统计量。
#[derive(Debug, Clone, Default)]
pub struct ReferenceSentence {
    /// 每条参考译文的长度（按文件顺序）
    lengths: Vec<usize>,
    /// n-gram（空格连接）-> 所有参考译文中的最大出现次数，用于 clip
    max_counts: HashMap<String, usize>,
}

impl ReferenceSentence {
    fn add(&mut self, words: &[&str]) {
        self.lengths.push(words.len());
        for (ngram, n) in ngram_counts(words, BLEU_ORDER) {
            let slot = self.max_counts.entry(ngram).or_insert(0);
            if n > *slot {
                *slot = n;
            }
        }
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn max_count(&self, ngram: &str) -> usize {
        self.max_counts.get(ngram).copied().unwrap_or(0)
    }

    pub fn average_length(&self) -> f32 {
        if self.lengths.is_empty() {
            return 0.0;
        }
        self.lengths.iter().sum::<usize>() as f32 / self.lengths.len() as f32
    }

    /// 最短参考译文的下标（同长取第一个）。
    pub fn shortest_index(&self) -> usize {
        self.lengths
            .iter()
            .enumerate()
            .min_by_key(|&(i, len)| (*len, i))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    pub fn shortest_length(&self) -> usize {
        self.lengths.get(self.shortest_index()).copied().unwrap_or(0)
    }

    /// 与 `hypothesis_length` 最接近的参考长度；距离相同取更短的。
    pub fn closest_length(&self, hypothesis_length: usize) -> usize {
        self.lengths
            .iter()
            .copied()
            .min_by_key(|&len| (len.abs_diff(hypothesis_length), len))
            .unwrap_or(0)
    }
}

/// 参考译文集合：下标即句子 id。
///
/// 文件格式：每行一句、空白分词；多个文件代表多套参考，行数必须一致。
#[derive(Debug, Clone, Default)]
pub struct References {
    sentences: Vec<ReferenceSentence>,
}

impl References {
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut texts = Vec::with_capacity(paths.len());
        for p in paths {
            let p = p.as_ref();
            let s = fs::read_to_string(p).map_err(|e| {
                DecoderError::Configuration(format!("无法读取参考译文 {}: {e}", p.display()))
            })?;
            texts.push(s);
        }
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        Self::from_texts(&refs)
    }

    /// 每个元素是一整套参考译文（一个文件的内容）。
    pub fn from_texts(texts: &[&str]) -> Result<Self> {
        if texts.is_empty() {
            return Err(DecoderError::Configuration("没有参考译文".to_string()));
        }
        let mut sentences: Vec<ReferenceSentence> = Vec::new();
        for (set, text) in texts.iter().enumerate() {
            let lines: Vec<&str> = text.lines().collect();
            if set == 0 {
                sentences.resize_with(lines.len(), ReferenceSentence::default);
            } else if lines.len() != sentences.len() {
                return Err(DecoderError::Configuration(format!(
                    "第 {} 套参考译文有 {} 行，第 1 套有 {} 行",
                    set + 1,
                    lines.len(),
                    sentences.len()
                )));
            }
            for (sentence, line) in sentences.iter_mut().zip(lines) {
                let words: Vec<&str> = line.split_whitespace().collect();
                sentence.add(&words);
            }
        }
        Ok(Self { sentences })
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn get(&self, sentence_id: usize) -> Result<&ReferenceSentence> {
        self.sentences
            .get(sentence_id)
            .ok_or(DecoderError::UnknownSentenceId {
                sentence_id,
                known: self.sentences.len(),
            })
    }
}
