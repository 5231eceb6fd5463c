use std::collections::HashMap;

/// BLEU 最高阶数。
pub const BLEU_ORDER: usize = 4;

/// 统计 1..=max_order 阶 n-gram；键为空格连接的词串。
pub fn ngram_counts(words: &[&str], max_order: usize) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for order in 1..=max_order {
        if order > words.len() {
            break;
        }
        for window in words.windows(order) {
            *counts.entry(window.join(" ")).or_insert(0) += 1;
        }
    }
    counts
}

/// 一个假设相对于参考译文的充分统计量。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BleuStats {
    /// 第 i 项为 (i+1)-gram 的总数
    pub counts: [f32; BLEU_ORDER],
    /// 第 i 项为 clip 后的 (i+1)-gram 匹配数
    pub matches: [f32; BLEU_ORDER],
    pub target_length: f32,
    /// 已乘 brevity-penalty 放松系数的参考长度
    pub ref_length: f32,
}

impl BleuStats {
    /// `max_count` 给出某个 n-gram 在参考译文中的最大次数。
    pub fn collect(words: &[&str], ref_length: f32, max_count: impl Fn(&str) -> usize) -> Self {
        let mut stats = BleuStats {
            target_length: words.len() as f32,
            ref_length,
            ..Default::default()
        };
        for (ngram, n) in ngram_counts(words, BLEU_ORDER) {
            let order = ngram.split(' ').count() - 1;
            stats.counts[order] += n as f32;
            stats.matches[order] += n.min(max_count(&ngram)) as f32;
        }
        stats
    }
}
