//! 多 rank × 多 epoch 的解码驱动。
//!
//! - rank r 负责 `id % ranks == r` 的句子，每个 rank 一个 `Decoder`
//! - 所有 rank 共享同一份权重、参考译文、history 和短语表
//! - 输出按 (epoch, sentence_id) 排序，与 rank 数无关
use std::sync::Arc;

use mira_bleu::{BleuHistory, BleuScoreFeature, References};
use mira_core::backend::SearchAlgorithm;
use mira_core::config::DecoderConfig;
use mira_core::context::RefLengthPolicy;
use mira_core::model::Phrase;
use mira_core::weights::WeightStore;
use mira_core::{Decoder, Result};
use mira_search::{TsvPhraseTable, all_backends};
use rayon::prelude::*;
use tracing::{info, warn};

/// 每次运行的解码参数（来自命令行）。
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub n_best_size: usize,
    pub num_returned: usize,
    pub distinct: bool,
    pub ref_length_policy: RefLengthPolicy,
    pub bleu_objective_weight: f32,
    pub bleu_score_weight: f32,
    pub epochs: usize,
    pub update_history: bool,
}

/// 一句话一个 epoch 的解码结果。
#[derive(Debug, Clone)]
pub struct SentenceOutput {
    pub epoch: usize,
    pub sentence_id: usize,
    pub rank: usize,
    /// 该句的 n-best 文本（每行一个候选）
    pub n_best: String,
    pub best: Option<Phrase>,
    pub best_bleu: f32,
}

pub struct Trainer {
    decoders: Vec<Decoder<BleuScoreFeature>>,
    history: Arc<BleuHistory>,
    weights: Arc<WeightStore>,
}

impl Trainer {
    pub fn from_config(config: &DecoderConfig, algorithm: SearchAlgorithm, ranks: usize) -> Result<Self> {
        let references = Arc::new(References::from_paths(&config.references)?);
        let history = Arc::new(BleuHistory::new(references.len()));
        let table = Arc::new(TsvPhraseTable::from_path(&config.phrase_table)?);
        let weights = Arc::new(WeightStore::new(config.initial_weights()));
        info!(
            references = references.len(),
            phrases = table.len(),
            ranks,
            %algorithm,
            "模型加载完成"
        );

        let mut decoders = Vec::with_capacity(ranks.max(1));
        for _ in 0..ranks.max(1) {
            let bleu = BleuScoreFeature::new(Arc::clone(&references), Arc::clone(&history))?
                .parameters(config.bleu.clone());
            let mut decoder = Decoder::new(bleu, Arc::clone(&weights))
                .input_factor_order(config.input_factor_order.clone())
                .search_algorithm(algorithm);
            for backend in all_backends(Arc::clone(&table), &config.search) {
                decoder = decoder.with_backend(backend);
            }
            decoders.push(decoder);
        }

        Ok(Self {
            decoders,
            history,
            weights,
        })
    }

    pub fn ranks(&self) -> usize {
        self.decoders.len()
    }

    pub fn history(&self) -> &Arc<BleuHistory> {
        &self.history
    }

    pub fn weights(&self) -> &Arc<WeightStore> {
        &self.weights
    }

    pub fn decoder(&self, rank: usize) -> Option<&Decoder<BleuScoreFeature>> {
        self.decoders.get(rank)
    }

    /// 跑完全部 epoch；致命错误中止，句子级错误跳过该句。
    pub fn run(&mut self, sources: &[String], options: &RunOptions) -> Result<Vec<SentenceOutput>> {
        let ranks = self.decoders.len();
        let mut outputs = Vec::new();
        for epoch in 0..options.epochs.max(1) {
            let shards: Vec<Vec<SentenceOutput>> = self
                .decoders
                .par_iter_mut()
                .enumerate()
                .map(|(rank, decoder)| decode_shard(decoder, rank, ranks, epoch, sources, options))
                .collect::<Result<_>>()?;

            let mut epoch_outputs: Vec<SentenceOutput> = shards.into_iter().flatten().collect();
            epoch_outputs.sort_by_key(|o| o.sentence_id);
            let decoded = epoch_outputs.len();
            let average_bleu = if decoded > 0 {
                epoch_outputs.iter().map(|o| o.best_bleu).sum::<f32>() / decoded as f32
            } else {
                0.0
            };
            info!(epoch, decoded, skipped = sources.len() - decoded, average_bleu, "epoch 完成");
            outputs.extend(epoch_outputs);
        }
        Ok(outputs)
    }
}

fn decode_shard(
    decoder: &mut Decoder<BleuScoreFeature>,
    rank: usize,
    ranks: usize,
    epoch: usize,
    sources: &[String],
    options: &RunOptions,
) -> Result<Vec<SentenceOutput>> {
    let mut outputs = Vec::new();
    let mut oracles = Vec::new();
    let mut source_lengths = Vec::new();
    let mut ids = Vec::new();

    for (sentence_id, source) in sources.iter().enumerate().filter(|(id, _)| id % ranks == rank) {
        let ranked = match decoder.get_n_best(
            source,
            sentence_id,
            options.n_best_size,
            options.bleu_objective_weight,
            options.bleu_score_weight,
            options.num_returned,
            options.distinct,
            options.ref_length_policy,
            rank,
            epoch,
        ) {
            Ok(ranked) => ranked,
            Err(e) if !e.is_fatal() => {
                warn!(rank, epoch, sentence_id, "跳过: {e}");
                decoder.cleanup();
                continue;
            }
            Err(e) => return Err(e),
        };

        let mut buf = Vec::new();
        decoder.write_n_best(options.n_best_size, options.distinct, None, &mut buf)?;
        let best = ranked.best().map(|c| c.phrase.clone());
        let best_bleu = ranked.best().map(|c| c.bleu_score).unwrap_or(0.0);

        if let Some(phrase) = &best {
            oracles.push(phrase.clone());
            source_lengths.push(decoder.context().map(|c| c.source_length()).unwrap_or(0));
            ids.push(sentence_id);
        }
        decoder.cleanup();

        outputs.push(SentenceOutput {
            epoch,
            sentence_id,
            rank,
            n_best: String::from_utf8_lossy(&buf).into_owned(),
            best,
            best_bleu,
        });
    }

    if options.update_history && !oracles.is_empty() {
        decoder.update_history_batch(&oracles, &source_lengths, &ids, rank, epoch)?;
    }
    Ok(outputs)
}
