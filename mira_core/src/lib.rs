//! `mira_core`：在线 margin 训练用的解码适配层。
//!
//! 设计目标：
//! - **契约清晰**：后端（beam/chart）与 BLEU 代理特征都通过 trait 接入
//! - **分数可分解**：total = model + objective_weight * score_weight * bleu
//! - **可并行**：每个 rank 独占 `Decoder`，只共享权重快照与 BLEU history
pub mod backend;
pub mod bleu;
pub mod config;
pub mod context;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod input;
pub mod model;
pub mod nbest;
pub mod session;
pub mod weights;

pub use decoder::Decoder;
pub use error::{DecoderError, Result};
