//! StockSource port - 小売店ごとの在庫ポーリング
//!
//! # 設計原則
//! - 通信・タイムアウト・パースはアダプタ側の責務
//! - Monitor は実行中の呼び出しを中断しない（ハードタイムアウトはアダプタで）

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{SourceError, StockReport, WatchTarget};

/// StockSource は Monitor が使う在庫情報源
#[async_trait]
pub trait StockSource: Send + Sync {
    /// ゲストセッションなど、チェックに必要な準備を行う
    ///
    /// 冪等。`false` は「まだ準備できていない、後で再試行」の意味。
    async fn warm(&self) -> bool;

    /// 全ターゲットを 1 回でチェック
    ///
    /// map に無いターゲットは、この tick では「観測なし」として扱われる。
    async fn check_stock(
        &self,
        targets: &[WatchTarget],
    ) -> Result<HashMap<String, StockReport>, SourceError>;
}
