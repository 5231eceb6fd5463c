//! 错误分类：配置错误（致命）、输入解析错误（可跳过句子）、调用顺序错误（契约违反）、输出错误（可恢复）。
use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecoderError {
    /// 启动参数非法或模型文件加载失败；进程应直接退出。
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 源句无法转换为后端输入；训练器应跳过该句。
    #[error("输入解析失败: {0}")]
    InputParse(String),

    /// 参考译文尚未绑定（例如在 `initialize_sentence` 之前解码或打分）。
    #[error("参考译文尚未绑定: {0}")]
    UninitializedReference(String),

    /// 句子 id 超出 history 的键范围。
    #[error("未知句子 id {sentence_id}（共 {known} 句参考译文）")]
    UnknownSentenceId { sentence_id: usize, known: usize },

    /// n-best 目标打开/写入失败；已经算好的解码结果仍然有效。
    #[error("n-best 写入失败 {destination}: {source}")]
    OutputWrite {
        destination: String,
        source: io::Error,
    },

    #[error("IO 错误: {0}")]
    Io(#[from] io::Error),
}

impl DecoderError {
    /// 配置错误与调用顺序错误不应被静默吞掉。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecoderError::Configuration(_)
                | DecoderError::UninitializedReference(_)
                | DecoderError::UnknownSentenceId { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DecoderError>;
