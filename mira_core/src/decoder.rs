//! `Decoder`：面向训练器的解码适配器。
//!
//! 结构上是一条流水线：
//! - initialize_sentence（解析输入 + 绑定 BLEU 特征）
//! - search（按配置选择 beam/chart 后端）
//! - extract_top_k（后端抽取 n-best）
//! - rescore（把 total 拆成 model + BLEU，并把 BLEU 分量清零）
//!
//! 每个训练 rank 持有自己的 `Decoder`；权重（`WeightStore`）与 BLEU history 在 rank 之间共享。
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{SearchAlgorithm, SearchBackend};
use crate::bleu::{BleuFeature, BleuParameters};
use crate::context::{RefLengthPolicy, SentenceContext};
use crate::error::{DecoderError, Result};
use crate::input::{FactorParser, InputParser};
use crate::model::{Candidate, Derivation, Phrase, RankedCandidates};
use crate::nbest::create_destination;
use crate::session::ActiveSession;
use crate::weights::{WeightStore, WeightVector};

pub struct Decoder<F, P = FactorParser> {
    /// raw source -> Sentence
    parser: P,
    /// BLEU 代理特征（history 在内部共享）
    bleu: F,
    /// 全局权重（快照 + 原子替换）
    weights: Arc<WeightStore>,
    /// 已注册的后端；每种算法一个
    backends: BTreeMap<SearchAlgorithm, Box<dyn SearchBackend>>,
    /// 当前选用的搜索算法
    algorithm: SearchAlgorithm,
    context: Option<SentenceContext>,
    session: Option<ActiveSession>,
}

impl<F> Decoder<F, FactorParser>
where
    F: BleuFeature,
{
    pub fn new(bleu: F, weights: Arc<WeightStore>) -> Self {
        Self {
            parser: FactorParser::default(),
            bleu,
            weights,
            backends: BTreeMap::new(),
            algorithm: SearchAlgorithm::default(),
            context: None,
            session: None,
        }
    }

    /// 设置输入 factor 顺序（空列表回退到 `[0]`）。
    pub fn input_factor_order(mut self, order: Vec<usize>) -> Self {
        self.parser = FactorParser::new(order);
        self
    }
}

impl<F, P> Decoder<F, P>
where
    F: BleuFeature,
    P: InputParser,
{
    /// 替换输入解析器。
    pub fn with_parser<Q: InputParser>(self, parser: Q) -> Decoder<F, Q> {
        Decoder {
            parser,
            bleu: self.bleu,
            weights: self.weights,
            backends: self.backends,
            algorithm: self.algorithm,
            context: self.context,
            session: self.session,
        }
    }

    /// 注册一个后端（同一算法重复注册时后者覆盖前者）。
    pub fn with_backend(mut self, backend: Box<dyn SearchBackend>) -> Self {
        self.backends.insert(backend.algorithm(), backend);
        self
    }

    pub fn search_algorithm(mut self, algorithm: SearchAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// 句间切换搜索算法；不影响已绑定的句子上下文。
    pub fn set_search_algorithm(&mut self, algorithm: SearchAlgorithm) {
        self.algorithm = algorithm;
    }

    pub fn active_algorithm(&self) -> SearchAlgorithm {
        self.algorithm
    }

    pub fn context(&self) -> Option<&SentenceContext> {
        self.context.as_ref()
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    pub fn bleu_feature(&self) -> &F {
        &self.bleu
    }

    /// 为一句话建立上下文并绑定 BLEU 特征。
    ///
    /// 之前未清理的上下文/会话会先被释放。失败时特征不再绑定任何句子。
    pub fn initialize_sentence(
        &mut self,
        source: &str,
        sentence_id: usize,
        bleu_objective_weight: f32,
        bleu_score_weight: f32,
        ref_length_policy: RefLengthPolicy,
    ) -> Result<()> {
        self.cleanup();
        let bound = self.parser.parse(source).and_then(|sentence| {
            let context = SentenceContext {
                source: source.to_string(),
                sentence_id,
                sentence,
                ref_length_policy,
                bleu_objective_weight,
                bleu_score_weight,
            };
            self.bind_feature(&context)?;
            Ok(context)
        });
        let context = match bound {
            Ok(context) => context,
            Err(e) => {
                self.bleu.unbind();
                return Err(e);
            }
        };

        debug!(
            sentence_id,
            source_length = context.source_length(),
            bleu_weight = context.combined_bleu_weight(),
            "sentence initialized"
        );
        self.context = Some(context);
        Ok(())
    }

    /// 先校验 id（可能失败的两步），再写权重和源长。
    fn bind_feature(&mut self, context: &SentenceContext) -> Result<()> {
        self.bleu
            .set_current_reference_length(context.sentence_id, context.ref_length_policy)?;
        self.bleu.set_current_reference_ngrams(context.sentence_id)?;
        self.bleu.set_weight(context.combined_bleu_weight());
        self.bleu.set_current_source_length(context.source_length());
        Ok(())
    }

    fn run_search(&mut self) -> Result<()> {
        let context = self.context.as_ref().ok_or_else(|| {
            DecoderError::UninitializedReference("解码前未调用 initialize_sentence".to_string())
        })?;
        let backend = self.backends.get(&self.algorithm).ok_or_else(|| {
            DecoderError::Configuration(format!("没有注册 `{}` 搜索后端", self.algorithm))
        })?;
        let weights = self.weights.snapshot();
        let inner = backend.search(context, &weights, &self.bleu)?;
        self.session = Some(ActiveSession::new(self.algorithm, context.sentence_id, inner));
        Ok(())
    }

    /// 解码当前句子，抽取 n-best 并做分数分解。
    pub fn decode_and_rescore(
        &mut self,
        n_best_size: usize,
        num_returned: usize,
        distinct: bool,
        rank: usize,
        epoch: usize,
    ) -> Result<RankedCandidates> {
        self.run_search()?;
        let (Some(context), Some(session)) = (self.context.as_ref(), self.session.as_ref()) else {
            return Err(DecoderError::UninitializedReference("搜索会话缺失".to_string()));
        };

        let derivations = session.extract_top_k(n_best_size, distinct);
        let candidates: Vec<Candidate> = derivations
            .into_iter()
            .map(|d| self.rescore(context, d, rank, epoch))
            .collect();

        info!(
            rank,
            epoch,
            sentence_id = context.sentence_id,
            algorithm = %self.algorithm,
            n_best = candidates.len(),
            "decoded"
        );
        Ok(RankedCandidates::new(
            context.sentence_id,
            rank,
            epoch,
            candidates,
            num_returned,
        ))
    }

    /// total 中已含 objective_weight * score_weight * bleu；拆出来并把 BLEU 分量清零，
    /// 下游的权重优化不应直接拟合这个特征。
    fn rescore(&self, context: &SentenceContext, derivation: Derivation, rank: usize, epoch: usize) -> Candidate {
        let (phrase, mut scores, total_score) = derivation.into_parts();
        let bleu_score = self.bleu.score(&scores);
        let model_score = total_score - context.bleu_objective_weight * context.bleu_score_weight * bleu_score;
        self.bleu.assign(&mut scores, 0.0);

        debug!(
            rank,
            epoch,
            "\"{phrase}\", score: {model_score}, Bleu: {bleu_score}, total: {total_score}"
        );
        Candidate {
            phrase,
            scores,
            bleu_score,
            model_score,
            total_score,
        }
    }

    /// 一步完成 initialize + decode。
    #[allow(clippy::too_many_arguments)]
    pub fn get_n_best(
        &mut self,
        source: &str,
        sentence_id: usize,
        n_best_size: usize,
        bleu_objective_weight: f32,
        bleu_score_weight: f32,
        num_returned: usize,
        distinct: bool,
        ref_length_policy: RefLengthPolicy,
        rank: usize,
        epoch: usize,
    ) -> Result<RankedCandidates> {
        self.initialize_sentence(
            source,
            sentence_id,
            bleu_objective_weight,
            bleu_score_weight,
            ref_length_policy,
        )?;
        self.decode_and_rescore(n_best_size, num_returned, distinct, rank, epoch)
    }

    /// 把当前会话的 n-best 写出：给定 `destination` 时写文件，否则写 `stream`。
    pub fn write_n_best(
        &self,
        n_best_size: usize,
        distinct: bool,
        destination: Option<&Path>,
        stream: &mut dyn Write,
    ) -> Result<()> {
        let session = self.session.as_ref().ok_or_else(|| {
            DecoderError::UninitializedReference("输出 n-best 前没有完成解码".to_string())
        })?;
        match destination {
            Some(path) => {
                let mut out = create_destination(path)?;
                session
                    .write_n_best(&mut out, n_best_size, distinct)
                    .and_then(|_| out.flush())
                    .map_err(|source| DecoderError::OutputWrite {
                        destination: path.display().to_string(),
                        source,
                    })
            }
            None => session
                .write_n_best(stream, n_best_size, distinct)
                .map_err(|source| DecoderError::OutputWrite {
                    destination: "<stream>".to_string(),
                    source,
                }),
        }
    }

    /// 解码一句话并输出 n-best，结束后释放该句的会话。
    #[allow(clippy::too_many_arguments)]
    pub fn output_n_best_list(
        &mut self,
        source: &str,
        sentence_id: usize,
        n_best_size: usize,
        bleu_objective_weight: f32,
        bleu_score_weight: f32,
        distinct: bool,
        ref_length_policy: RefLengthPolicy,
        destination: Option<&Path>,
        stream: &mut dyn Write,
    ) -> Result<()> {
        self.initialize_sentence(
            source,
            sentence_id,
            bleu_objective_weight,
            bleu_score_weight,
            ref_length_policy,
        )?;
        let written = self
            .run_search()
            .and_then(|_| self.write_n_best(n_best_size, distinct, destination, stream));
        self.cleanup();
        written
    }

    /// 当前权重快照。
    pub fn weights(&self) -> Arc<WeightVector> {
        self.weights.snapshot()
    }

    /// 整体替换权重（所有共享同一 `WeightStore` 的 rank 都会看到）。
    pub fn set_weights(&self, weights: WeightVector) {
        self.weights.replace(weights);
    }

    pub fn weight_store(&self) -> &Arc<WeightStore> {
        &self.weights
    }

    /// 把当前句的 1-best（或 oracle）并入 history。
    ///
    /// 必须在同一句的 `decode_and_rescore` 之后调用；`initialize_sentence` 失败后返回
    /// `UninitializedReference`。
    pub fn update_history(&self, hypothesis: &Phrase, rank: usize, epoch: usize) -> Result<()> {
        self.bleu.update_history(hypothesis, rank, epoch)
    }

    pub fn update_history_batch(
        &self,
        hypotheses: &[Phrase],
        source_lengths: &[usize],
        reference_ids: &[usize],
        rank: usize,
        epoch: usize,
    ) -> Result<()> {
        self.bleu
            .update_history_batch(hypotheses, source_lengths, reference_ids, rank, epoch)
    }

    pub fn closest_reference_length(&self, reference_id: usize, hypothesis_length: usize) -> Result<usize> {
        self.bleu.closest_reference_length(reference_id, hypothesis_length)
    }

    pub fn shortest_reference_index(&self, reference_id: usize) -> Result<usize> {
        self.bleu.shortest_reference_index(reference_id)
    }

    pub fn set_bleu_parameters(&mut self, parameters: BleuParameters) {
        self.bleu.set_parameters(parameters);
    }

    pub fn print_bleu_history(&self, out: &mut dyn Write) -> std::io::Result<()> {
        self.bleu.print_history(out)
    }

    /// 释放句子上下文与搜索会话；重复调用无副作用。
    pub fn cleanup(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(sentence_id = session.sentence_id(), algorithm = %session.algorithm(), "session released");
        }
        self.context = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SearchSession;
    use crate::filter::{Filter, SortDedupTruncate};
    use crate::model::{FeatureId, ScoreVector};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io;

    /// 一元精确率当作 BLEU；history 只记录更新次数。
    struct UnigramFeature {
        id: FeatureId,
        weight: f32,
        references: Vec<Vec<String>>,
        current: Option<usize>,
        source_length: usize,
        history: Mutex<HashMap<usize, usize>>,
        last_update: Mutex<Option<(usize, usize)>>,
    }

    impl UnigramFeature {
        fn new(references: &[&str]) -> Self {
            Self {
                id: FeatureId::new("bleu"),
                weight: 0.0,
                references: references
                    .iter()
                    .map(|r| r.split_whitespace().map(str::to_string).collect())
                    .collect(),
                current: None,
                source_length: 0,
                history: Mutex::new(HashMap::new()),
                last_update: Mutex::new(None),
            }
        }

        fn check(&self, id: usize) -> Result<()> {
            if id >= self.references.len() {
                return Err(DecoderError::UnknownSentenceId {
                    sentence_id: id,
                    known: self.references.len(),
                });
            }
            Ok(())
        }
    }

    impl BleuFeature for UnigramFeature {
        fn id(&self) -> &FeatureId {
            &self.id
        }
        fn weight(&self) -> f32 {
            self.weight
        }
        fn set_weight(&mut self, weight: f32) {
            self.weight = weight;
        }
        fn set_current_source_length(&mut self, length: usize) {
            self.source_length = length;
        }
        fn set_current_reference_length(&mut self, sentence_id: usize, _: RefLengthPolicy) -> Result<()> {
            self.check(sentence_id)
        }
        fn set_current_reference_ngrams(&mut self, sentence_id: usize) -> Result<()> {
            self.check(sentence_id)?;
            self.current = Some(sentence_id);
            Ok(())
        }
        fn current_sentence(&self) -> Option<usize> {
            self.current
        }
        fn unbind(&mut self) {
            self.weight = 0.0;
            self.current = None;
        }
        fn evaluate(&self, hypothesis: &Phrase) -> Result<f32> {
            let id = self
                .current
                .ok_or_else(|| DecoderError::UninitializedReference("stub".into()))?;
            if hypothesis.is_empty() {
                return Ok(0.0);
            }
            let reference = &self.references[id];
            let hits = hypothesis
                .iter()
                .filter(|t| reference.iter().any(|r| r == t.surface()))
                .count();
            Ok(hits as f32 / hypothesis.len() as f32)
        }
        fn update_history(&self, _hypothesis: &Phrase, rank: usize, epoch: usize) -> Result<()> {
            let id = self
                .current
                .ok_or_else(|| DecoderError::UninitializedReference("stub".into()))?;
            *self.history.lock().entry(id).or_default() += 1;
            *self.last_update.lock() = Some((rank, epoch));
            Ok(())
        }
        fn update_history_batch(&self, hypotheses: &[Phrase], _: &[usize], ids: &[usize], _: usize, _: usize) -> Result<()> {
            for (_, id) in hypotheses.iter().zip(ids) {
                self.check(*id)?;
                *self.history.lock().entry(*id).or_default() += 1;
            }
            Ok(())
        }
        fn closest_reference_length(&self, id: usize, _: usize) -> Result<usize> {
            self.check(id)?;
            Ok(self.references[id].len())
        }
        fn shortest_reference_index(&self, id: usize) -> Result<usize> {
            self.check(id)?;
            Ok(0)
        }
        fn set_parameters(&mut self, _: BleuParameters) {}
        fn print_history(&self, out: &mut dyn Write) -> io::Result<()> {
            let history = self.history.lock();
            let mut ids: Vec<_> = history.keys().copied().collect();
            ids.sort_unstable();
            for id in ids {
                writeln!(out, "{id}\t{}", history[&id])?;
            }
            Ok(())
        }
    }

    /// 固定输出的后端：每个候选 = 源句词序的一个变体 + 预设 model 分。
    struct StubBackend {
        algorithm: SearchAlgorithm,
        outputs: Vec<(&'static str, f32)>,
    }

    struct StubSession {
        derivations: Vec<Derivation>,
    }

    impl SearchSession for StubSession {
        fn extract_top_k(&self, k: usize, distinct: bool) -> Vec<Derivation> {
            SortDedupTruncate { limit: k, distinct }.apply(self.derivations.clone())
        }
    }

    impl SearchBackend for StubBackend {
        fn algorithm(&self) -> SearchAlgorithm {
            self.algorithm
        }

        fn search(
            &self,
            _context: &SentenceContext,
            weights: &WeightVector,
            bleu: &dyn BleuFeature,
        ) -> Result<Box<dyn SearchSession>> {
            let tm = FeatureId::new("tm_0");
            let mut derivations = Vec::new();
            for (text, tm_score) in &self.outputs {
                let phrase = Phrase::from_words(&text.split_whitespace().collect::<Vec<_>>());
                let b = bleu.evaluate(&phrase)?;
                let mut scores = ScoreVector::new();
                scores.assign(&tm, *tm_score);
                bleu.assign(&mut scores, b);
                let total = weights.score(&scores) + bleu.weight() * b;
                derivations.push(Derivation::new(phrase, scores, total));
            }
            Ok(Box::new(StubSession { derivations }))
        }
    }

    fn decoder() -> Decoder<UnigramFeature> {
        let weights = Arc::new(WeightStore::new(
            WeightVector::new().with(&FeatureId::new("tm_0"), 1.0),
        ));
        Decoder::new(UnigramFeature::new(&["the house", "a small house"]), weights)
            .with_backend(Box::new(StubBackend {
                algorithm: SearchAlgorithm::Beam,
                outputs: vec![
                    ("the house", -1.0),
                    ("house the", -1.5),
                    ("the house", -2.0),
                    ("a home", -0.5),
                    ("house", -3.0),
                ],
            }))
            .with_backend(Box::new(StubBackend {
                algorithm: SearchAlgorithm::Chart,
                outputs: vec![("the house", -0.7), ("the home", -0.9)],
            }))
    }

    #[test]
    fn decode_before_initialize_is_uninitialized_reference() {
        let mut d = decoder();
        let err = d.decode_and_rescore(5, 5, false, 0, 0).unwrap_err();
        assert!(matches!(err, DecoderError::UninitializedReference(_)));
    }

    #[test]
    fn scores_decompose_and_bleu_entry_is_zeroed() {
        let mut d = decoder();
        d.initialize_sentence("das haus", 0, 2.0, 3.0, RefLengthPolicy::Shortest)
            .unwrap();
        assert_eq!(d.bleu_feature().weight(), 6.0);
        let ranked = d.decode_and_rescore(5, 5, false, 1, 2).unwrap();
        assert_eq!(ranked.sentence_id, 0);
        assert_eq!((ranked.rank, ranked.epoch), (1, 2));
        assert_eq!(ranked.returned().len(), 5);

        let bleu = FeatureId::new("bleu");
        for c in &ranked.n_best {
            assert!((c.model_score + 2.0 * 3.0 * c.bleu_score - c.total_score).abs() < 1e-5);
            assert_eq!(c.scores.get(&bleu), 0.0);
        }
        let best = ranked.best().unwrap();
        assert_eq!(best.phrase.to_string(), "the house");
        assert_eq!(best.bleu_score, 1.0);
        assert!((best.model_score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn returned_candidates_are_ordered_and_truncated() {
        let mut d = decoder();
        d.initialize_sentence("das haus", 0, 1.0, 1.0, RefLengthPolicy::Average)
            .unwrap();
        let ranked = d.decode_and_rescore(5, 3, false, 0, 0).unwrap();
        assert_eq!(ranked.returned().len(), 3);
        assert_eq!(ranked.n_best.len(), 5);
        let totals = ranked.total_scores();
        assert!(totals.windows(2).all(|w| w[0] >= w[1]));

        let ranked = d.decode_and_rescore(2, 10, false, 0, 0).unwrap();
        assert_eq!(ranked.returned().len(), 2);
    }

    #[test]
    fn distinct_n_best_has_unique_phrases() {
        let mut d = decoder();
        d.initialize_sentence("das haus", 0, 1.0, 1.0, RefLengthPolicy::Average)
            .unwrap();
        let ranked = d.decode_and_rescore(10, 10, true, 0, 0).unwrap();
        let mut phrases = ranked.translations();
        let n = phrases.len();
        phrases.sort();
        phrases.dedup();
        assert_eq!(phrases.len(), n);
        assert_eq!(n, 4);
    }

    #[test]
    fn weights_round_trip() {
        let d = decoder();
        let w = WeightVector::new()
            .with(&FeatureId::new("tm_0"), 0.25)
            .with(&FeatureId::new("word_penalty"), -1.0);
        d.set_weights(w.clone());
        assert_eq!(*d.weights(), w);
    }

    #[test]
    fn cleanup_is_idempotent_and_ends_the_sentence() {
        let mut d = decoder();
        d.initialize_sentence("das haus", 1, 1.0, 1.0, RefLengthPolicy::Shortest)
            .unwrap();
        d.decode_and_rescore(2, 2, false, 0, 0).unwrap();
        assert!(d.session().is_some());
        d.cleanup();
        d.cleanup();
        assert!(d.session().is_none());
        assert!(d.context().is_none());
        assert!(matches!(
            d.decode_and_rescore(2, 2, false, 0, 0),
            Err(DecoderError::UninitializedReference(_))
        ));
        // 会话释放后特征仍绑定在该句上，history 照样可以更新
        d.update_history(&Phrase::from_words(&["a", "house"]), 0, 0).unwrap();
    }

    #[test]
    fn malformed_source_is_input_parse_error() {
        let mut d = decoder();
        let err = d
            .initialize_sentence("a|B c", 0, 1.0, 1.0, RefLengthPolicy::Shortest)
            .unwrap_err();
        assert!(matches!(err, DecoderError::InputParse(_)));
        assert!(d.context().is_none());
    }

    #[test]
    fn unknown_sentence_id_fails_loudly() {
        let mut d = decoder();
        let err = d
            .initialize_sentence("das haus", 9, 1.0, 1.0, RefLengthPolicy::Shortest)
            .unwrap_err();
        assert!(matches!(err, DecoderError::UnknownSentenceId { sentence_id: 9, .. }));
        let err = d
            .update_history_batch(&[Phrase::from_words(&["x"])], &[1], &[5], 0, 0)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_backend_is_configuration_error() {
        let weights = Arc::new(WeightStore::default());
        let mut d = Decoder::new(UnigramFeature::new(&["x"]), weights);
        d.initialize_sentence("x", 0, 1.0, 1.0, RefLengthPolicy::Shortest)
            .unwrap();
        assert!(matches!(
            d.decode_and_rescore(1, 1, false, 0, 0),
            Err(DecoderError::Configuration(_))
        ));
    }

    #[test]
    fn switching_algorithm_keeps_caller_sentence_ids() {
        let mut d = decoder();
        let mut out = Vec::new();
        d.output_n_best_list("das haus", 1, 3, 1.0, 1.0, false, RefLengthPolicy::Shortest, None, &mut out)
            .unwrap();
        d.set_search_algorithm(SearchAlgorithm::Chart);
        d.output_n_best_list("das haus", 0, 3, 1.0, 1.0, false, RefLengthPolicy::Shortest, None, &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let ids: Vec<&str> = text.lines().map(|l| l.split(" ||| ").next().unwrap()).collect();
        assert_eq!(ids, vec!["1", "1", "1", "0", "0"]);
        assert!(d.session().is_none());
    }

    #[test]
    fn n_best_destination_file_and_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = decoder();
        d.initialize_sentence("das haus", 1, 1.0, 1.0, RefLengthPolicy::Shortest)
            .unwrap();
        let ranked = d.decode_and_rescore(5, 5, false, 0, 0).unwrap();

        let path = dir.path().join("1.nbest");
        d.write_n_best(5, false, Some(&path), &mut io::sink()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().all(|l| l.starts_with("1 ||| ")));

        let bad = dir.path().join("no-such-dir").join("x.nbest");
        let err = d.write_n_best(5, false, Some(&bad), &mut io::sink()).unwrap_err();
        assert!(matches!(err, DecoderError::OutputWrite { .. }));
        // 写失败不影响之前已经算好的解码结果
        assert_eq!(ranked.returned().len(), 5);
    }

    #[test]
    fn history_updates_accumulate() {
        let mut d = decoder();
        d.initialize_sentence("das haus", 0, 1.0, 1.0, RefLengthPolicy::Shortest)
            .unwrap();
        let ranked = d.decode_and_rescore(1, 1, false, 0, 0).unwrap();
        let best = ranked.translations().remove(0);
        d.update_history(&best, 0, 0).unwrap();
        d.update_history(&best, 3, 1).unwrap();
        assert_eq!(*d.bleu_feature().last_update.lock(), Some((3, 1)));
        let mut out = Vec::new();
        d.print_bleu_history(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0\t2\n");
    }

    fn history_of(d: &Decoder<UnigramFeature>) -> String {
        let mut out = Vec::new();
        d.print_bleu_history(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn failed_parse_unbinds_previous_sentence() {
        let mut d = decoder();
        d.initialize_sentence("das haus", 0, 1.0, 1.0, RefLengthPolicy::Shortest)
            .unwrap();
        d.decode_and_rescore(1, 1, false, 0, 0).unwrap();
        d.cleanup();

        let err = d
            .initialize_sentence("a|B c", 1, 2.0, 3.0, RefLengthPolicy::Shortest)
            .unwrap_err();
        assert!(matches!(err, DecoderError::InputParse(_)));
        assert_eq!(d.bleu_feature().current_sentence(), None);
        assert!(matches!(
            d.update_history(&Phrase::from_words(&["the", "house"]), 0, 0),
            Err(DecoderError::UninitializedReference(_))
        ));
        assert_eq!(history_of(&d), "");
    }

    #[test]
    fn failed_id_lookup_leaves_no_partial_binding() {
        let mut d = decoder();
        d.initialize_sentence("das haus", 0, 1.0, 1.0, RefLengthPolicy::Shortest)
            .unwrap();
        d.decode_and_rescore(1, 1, false, 0, 0).unwrap();

        let err = d
            .initialize_sentence("das haus", 9, 5.0, 5.0, RefLengthPolicy::Shortest)
            .unwrap_err();
        assert!(matches!(err, DecoderError::UnknownSentenceId { sentence_id: 9, .. }));
        assert_eq!(d.bleu_feature().current_sentence(), None);
        assert_eq!(d.bleu_feature().weight(), 0.0);
        assert!(d.update_history(&Phrase::from_words(&["the"]), 0, 0).is_err());
        assert_eq!(history_of(&d), "");

        // 失败后仍可正常初始化下一句
        d.initialize_sentence("das haus", 1, 1.0, 2.0, RefLengthPolicy::Shortest)
            .unwrap();
        assert_eq!(d.bleu_feature().current_sentence(), Some(1));
        assert_eq!(d.bleu_feature().weight(), 2.0);
    }
}
