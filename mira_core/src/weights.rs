//! `weights`：全局特征权重。
//!
//! 约定：
//! - `WeightVector` 一旦发布就不可变；读者拿到的是 `Arc` 快照
//! - `WeightStore::replace` 整体替换快照，读者只会看到旧向量或新向量
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::{FeatureId, ScoreVector};

/// 特征权重向量（与 `ScoreVector` 同构，语义不同）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(ScoreVector);

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(weights: &BTreeMap<String, f32>) -> Self {
        let mut v = ScoreVector::new();
        for (name, w) in weights {
            v.assign(&FeatureId::new(name.as_str()), *w);
        }
        Self(v)
    }

    /// 构造期设置单个权重（发布之后不再修改）。
    pub fn with(mut self, id: &FeatureId, weight: f32) -> Self {
        self.0.assign(id, weight);
        self
    }

    pub fn weight(&self, id: &FeatureId) -> f32 {
        self.0.get(id)
    }

    /// 加权求和 `w · f`。
    pub fn score(&self, features: &ScoreVector) -> f32 {
        features.inner_product(&self.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FeatureId, f32)> {
        self.0.iter()
    }

    pub fn as_score_vector(&self) -> &ScoreVector {
        &self.0
    }
}

/// 进程内共享的权重存储：快照 + 原子替换。
#[derive(Debug, Default)]
pub struct WeightStore {
    current: RwLock<Arc<WeightVector>>,
}

impl WeightStore {
    pub fn new(weights: WeightVector) -> Self {
        Self {
            current: RwLock::new(Arc::new(weights)),
        }
    }

    /// 当前快照；解码全程持有同一份。
    pub fn snapshot(&self) -> Arc<WeightVector> {
        self.current.read().clone()
    }

    /// 整体替换；不存在“部分更新”的中间状态。
    pub fn replace(&self, weights: WeightVector) {
        let next = Arc::new(weights);
        *self.current.write() = next;
    }
}
