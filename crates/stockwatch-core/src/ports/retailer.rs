//! RetailerAdapter port - 1 小売店分の StockSource / CheckoutDriver を組み立てる

use std::sync::Arc;

use crate::config::{GroupConfig, TaskConfig};
use crate::ports::{CheckoutDriver, StockSource};

/// RetailerAdapter は小売店ごとのファクトリ
///
/// # 設計原則
/// - Monitor はグループごとに専用の source を持つ（ゲストセッションはグループ単位）
/// - Task ごとに専用の driver を持つ（cookie とカートは Task 単位）
pub trait RetailerAdapter: Send + Sync {
    /// Registry のキー（例: `"target"`）
    fn retailer(&self) -> &str;

    fn stock_source(&self, group: &GroupConfig) -> Arc<dyn StockSource>;

    fn checkout_driver(&self, group: &GroupConfig, task: &TaskConfig) -> Arc<dyn CheckoutDriver>;
}
