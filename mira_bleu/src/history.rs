//! 按句子 id 组织的 BLEU history。
//!
//! 约定：
//! - 每个 id 一把锁：同一 id 的并发更新串行化，不同 id 互不阻塞
//! - `accumulated_*` 是原始累加量，只增不减
//! - 打分使用平滑后的量：`h <- smoothing * (h + stats)`
use std::io::{self, Write};

use mira_core::{DecoderError, Result};
use parking_lot::Mutex;

use crate::ngram::{BLEU_ORDER, BleuStats};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentenceHistory {
    /// 平滑后的 n-gram 总数
    pub counts: [f32; BLEU_ORDER],
    /// 平滑后的 n-gram 匹配数
    pub matches: [f32; BLEU_ORDER],
    pub source_length: f32,
    pub target_length: f32,
    pub ref_length: f32,
    /// 原始累加的 n-gram 总数
    pub accumulated_counts: [f32; BLEU_ORDER],
    /// 原始累加的 n-gram 匹配数
    pub accumulated_matches: [f32; BLEU_ORDER],
    pub updates: usize,
    /// 最近一次更新的 (rank, epoch)；单句接口不带这两个值
    pub last_update: Option<(usize, usize)>,
}

impl SentenceHistory {
    fn fold(&mut self, stats: &BleuStats, source_length: usize, smoothing: f32, origin: Option<(usize, usize)>) {
        for i in 0..BLEU_ORDER {
            self.counts[i] = smoothing * (self.counts[i] + stats.counts[i]);
            self.matches[i] = smoothing * (self.matches[i] + stats.matches[i]);
            self.accumulated_counts[i] += stats.counts[i];
            self.accumulated_matches[i] += stats.matches[i];
        }
        self.source_length = smoothing * (self.source_length + source_length as f32);
        self.target_length = smoothing * (self.target_length + stats.target_length);
        self.ref_length = smoothing * (self.ref_length + stats.ref_length);
        self.updates += 1;
        if origin.is_some() {
            self.last_update = origin;
        }
    }
}

#[derive(Debug, Default)]
struct InputLengths {
    total: usize,
    count: usize,
}

/// 整个训练过程共享的 history（各 rank 通过 `Arc` 持有）。
#[derive(Debug)]
pub struct BleuHistory {
    entries: Vec<Mutex<SentenceHistory>>,
    inputs: Mutex<InputLengths>,
}

impl BleuHistory {
    pub fn new(sentences: usize) -> Self {
        Self {
            entries: (0..sentences).map(|_| Mutex::new(SentenceHistory::default())).collect(),
            inputs: Mutex::new(InputLengths::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, sentence_id: usize) -> Result<&Mutex<SentenceHistory>> {
        self.entries.get(sentence_id).ok_or(DecoderError::UnknownSentenceId {
            sentence_id,
            known: self.entries.len(),
        })
    }

    pub fn check(&self, sentence_id: usize) -> Result<()> {
        self.entry(sentence_id).map(|_| ())
    }

    pub fn snapshot(&self, sentence_id: usize) -> Result<SentenceHistory> {
        Ok(self.entry(sentence_id)?.lock().clone())
    }

    pub fn update(
        &self,
        sentence_id: usize,
        stats: &BleuStats,
        source_length: usize,
        smoothing: f32,
        origin: Option<(usize, usize)>,
    ) -> Result<()> {
        self.entry(sentence_id)?
            .lock()
            .fold(stats, source_length, smoothing, origin);
        let mut inputs = self.inputs.lock();
        inputs.total += source_length;
        inputs.count += 1;
        Ok(())
    }

    /// 已并入 history 的源句平均长度。
    pub fn average_input_length(&self) -> Option<f32> {
        let inputs = self.inputs.lock();
        (inputs.count > 0).then(|| inputs.total as f32 / inputs.count as f32)
    }

    /// 每个有过更新的句子一行。
    pub fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        for (id, entry) in self.entries.iter().enumerate() {
            let h = entry.lock().clone();
            if h.updates == 0 {
                continue;
            }
            writeln!(
                out,
                "{id}\tupdates={}\tcounts={:?}\tmatches={:?}\tsrc={}\ttgt={}\tref={}",
                h.updates, h.counts, h.matches, h.source_length, h.target_length, h.ref_length
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn stats() -> BleuStats {
        BleuStats {
            counts: [2.0, 1.0, 0.0, 0.0],
            matches: [1.0, 0.0, 0.0, 0.0],
            target_length: 2.0,
            ref_length: 3.0,
        }
    }

    #[test]
    fn repeated_updates_are_additive() {
        let h = BleuHistory::new(2);
        h.update(1, &stats(), 4, 0.9, Some((0, 1))).unwrap();
        let first = h.snapshot(1).unwrap();
        h.update(1, &stats(), 4, 0.9, None).unwrap();
        let second = h.snapshot(1).unwrap();

        assert!((first.counts[0] - 1.8).abs() < 1e-6);
        assert!((second.counts[0] - (0.9 * (1.8 + 2.0))).abs() < 1e-6);
        assert!(second.counts[0] > first.counts[0]);
        assert_eq!(second.accumulated_counts[0], 4.0);
        assert_eq!(second.updates, 2);
        assert_eq!(second.last_update, Some((0, 1)));
        assert_eq!(h.snapshot(0).unwrap(), SentenceHistory::default());
        assert_eq!(h.average_input_length(), Some(4.0));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let h = BleuHistory::new(1);
        assert!(matches!(
            h.update(3, &stats(), 1, 0.9, None),
            Err(DecoderError::UnknownSentenceId { sentence_id: 3, known: 1 })
        ));
        assert!(h.average_input_length().is_none());
    }

    #[test]
    fn concurrent_updates_to_one_id_are_serialized() {
        let h = Arc::new(BleuHistory::new(4));
        thread::scope(|s| {
            for rank in 0..4 {
                let h = Arc::clone(&h);
                s.spawn(move || {
                    for epoch in 0..50 {
                        h.update(2, &stats(), 1, 1.0, Some((rank, epoch))).unwrap();
                        h.update(rank, &stats(), 1, 1.0, Some((rank, epoch))).unwrap();
                    }
                });
            }
        });
        let two = h.snapshot(2).unwrap();
        // 每个 rank 对 id 2 各更新 50 次，rank 2 自己的 id 再加 50 次
        assert_eq!(two.updates, 250);
        assert_eq!(two.accumulated_counts[0], 500.0);
        assert_eq!(h.snapshot(0).unwrap().updates, 50);
    }

    #[test]
    fn print_lists_updated_sentences_only() {
        let h = BleuHistory::new(3);
        h.update(2, &stats(), 1, 1.0, None).unwrap();
        let mut out = Vec::new();
        h.print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("2\tupdates=1\t"));
    }
}
