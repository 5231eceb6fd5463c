//! n-best 文本输出：`id ||| 译文 ||| 特征= 值 ... ||| total`，每行一个推导，最优在前。
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::{DecoderError, Result};
use crate::model::Derivation;

pub fn write_moses_n_best(out: &mut dyn Write, sentence_id: usize, derivations: &[Derivation]) -> io::Result<()> {
    for d in derivations {
        writeln!(
            out,
            "{sentence_id} ||| {} ||| {} ||| {}",
            d.phrase(),
            d.scores(),
            d.total_score()
        )?;
    }
    Ok(())
}

/// 打开 n-best 目标文件；失败映射为 `OutputWrite`。
pub fn create_destination(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| DecoderError::OutputWrite {
            destination: path.display().to_string(),
            source,
        })
}
