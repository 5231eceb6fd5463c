//! `input`：把原始源句转换为后端使用的输入表示（factor 化的词序列）。
//!
//! 约定：
//! - 空白分词，`|` 分隔 factor（例如 `house|NN`）
//! - `factor_order` 决定保留哪些 factor 以及顺序（默认只保留第 0 个）
//! - 所有词的 factor 数必须一致
use crate::error::{DecoderError, Result};
use crate::model::Token;

pub const FACTOR_DELIMITER: char = '|';

/// 已解析的源句。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    tokens: Vec<Token>,
}

impl Sentence {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
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

    /// 源端 span `[start, end)` 的表层词，用空格连接（短语表的查询键）。
    pub fn span_key(&self, start: usize, end: usize) -> String {
        let end = end.min(self.tokens.len());
        if start >= end {
            return String::new();
        }
        self.tokens[start..end]
            .iter()
            .map(Token::surface)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 输入解析器：raw -> `Sentence`。
pub trait InputParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<Sentence>;
}

/// 默认解析器：按 factor 切分。
#[derive(Debug, Clone)]
pub struct FactorParser {
    factor_order: Vec<usize>,
}

impl Default for FactorParser {
    fn default() -> Self {
        Self {
            factor_order: vec![0],
        }
    }
}

impl FactorParser {
    pub fn new(factor_order: Vec<usize>) -> Self {
        if factor_order.is_empty() {
            return Self::default();
        }
        Self { factor_order }
    }

    pub fn factor_order(&self) -> &[usize] {
        &self.factor_order
    }

    fn parse_token(&self, word: &str, position: usize) -> Result<(Token, usize)> {
        let factors: Vec<&str> = word.split(FACTOR_DELIMITER).collect();
        if factors.iter().any(|f| f.is_empty()) {
            return Err(DecoderError::InputParse(format!(
                "第 {} 个词 `{word}` 含空 factor",
                position + 1
            )));
        }
        let mut picked = Vec::with_capacity(self.factor_order.len());
        for &idx in &self.factor_order {
            let Some(f) = factors.get(idx) else {
                return Err(DecoderError::InputParse(format!(
                    "第 {} 个词 `{word}` 没有第 {idx} 个 factor",
                    position + 1
                )));
            };
            picked.push((*f).to_string());
        }
        Ok((Token::with_factors(picked), factors.len()))
    }
}

impl InputParser for FactorParser {
    fn parse(&self, source: &str) -> Result<Sentence> {
        let source = source.trim();
        if source.is_empty() {
            return Err(DecoderError::InputParse("源句为空".to_string()));
        }

        let mut tokens = Vec::new();
        let mut arity: Option<usize> = None;
        for (i, word) in source.split_whitespace().enumerate() {
            let (token, n) = self.parse_token(word, i)?;
            match arity {
                None => arity = Some(n),
                Some(expected) if expected != n => {
                    return Err(DecoderError::InputParse(format!(
                        "第 {} 个词 `{word}` 有 {n} 个 factor，前面的词有 {expected} 个",
                        i + 1
                    )));
                }
                Some(_) => {}
            }
            tokens.push(token);
        }
        Ok(Sentence::new(tokens))
    }
}
