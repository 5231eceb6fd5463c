mod driver;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use mira_core::backend::SearchAlgorithm;
use mira_core::config::DecoderConfig;
use mira_core::context::RefLengthPolicy;
use mira_core::nbest::create_destination;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use driver::{RunOptions, Trainer};

#[derive(Parser, Debug)]
#[command(name = "mira_cli")]
#[command(version)]
#[command(about = "带 BLEU 目标的 n-best 解码（margin 训练的解码端）")]
struct Cli {
    /// JSON 配置文件
    #[arg(short, long)]
    config: PathBuf,

    /// 源句文件，每行一句；行号（从 0 开始）即句子 id
    #[arg(short, long)]
    input: PathBuf,

    #[arg(long, default_value = "100")]
    nbest_size: usize,

    /// 每句返回给训练器的候选数
    #[arg(long, default_value = "1")]
    num_returned: usize,

    /// 同一输出只保留一个推导
    #[arg(long)]
    distinct: bool,

    /// 参考长度取平均值（默认取最短）
    #[arg(long)]
    avg_ref_length: bool,

    #[arg(long, default_value = "1.0")]
    bleu_objective_weight: f32,

    #[arg(long, default_value = "1.0")]
    bleu_score_weight: f32,

    #[arg(long, default_value = "1")]
    ranks: usize,

    #[arg(long, default_value = "1")]
    epochs: usize,

    /// 每个 epoch 结束后把 1-best 并入 BLEU history
    #[arg(long)]
    update_history: bool,

    /// n-best 输出文件（默认 stdout）
    #[arg(long)]
    nbest_out: Option<PathBuf>,

    /// 覆盖配置里的搜索算法：beam | chart
    #[arg(long)]
    search: Option<SearchAlgorithm>,

    /// 结束时把 BLEU history 打印到 stderr
    #[arg(long)]
    print_history: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = DecoderConfig::from_path(&cli.config)?;
    let algorithm = cli.search.unwrap_or(config.search_algorithm);
    let mut trainer = Trainer::from_config(&config, algorithm, cli.ranks)?;

    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("无法读取输入 {}", cli.input.display()))?;
    let sources: Vec<String> = text.lines().map(str::to_string).collect();

    let options = RunOptions {
        n_best_size: cli.nbest_size,
        num_returned: cli.num_returned,
        distinct: cli.distinct,
        ref_length_policy: RefLengthPolicy::from_avg_flag(cli.avg_ref_length),
        bleu_objective_weight: cli.bleu_objective_weight,
        bleu_score_weight: cli.bleu_score_weight,
        epochs: cli.epochs,
        update_history: cli.update_history,
    };
    let outputs = trainer.run(&sources, &options)?;

    let mut out: Box<dyn Write> = match &cli.nbest_out {
        Some(path) => Box::new(create_destination(path)?),
        None => Box::new(io::stdout().lock()),
    };
    for o in &outputs {
        out.write_all(o.n_best.as_bytes())?;
    }
    out.flush()?;

    if cli.print_history {
        if let Some(decoder) = trainer.decoder(0) {
            decoder.print_bleu_history(&mut io::stderr().lock())?;
        }
    }
    info!(
        sentences = sources.len(),
        outputs = outputs.len(),
        features = trainer.weights().snapshot().iter().count(),
        "完成"
    );
    Ok(())
}
