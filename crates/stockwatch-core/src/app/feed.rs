//! ProductFeed - グループ単位の「最新の商品ウェーブ」スロット
//!
//! Monitor は ProductEvent を EventBus（観測者向け）とこの feed（Task 向け）の
//! 両方に流します。EventBus は購読者ごとの有界キューなので、満杯なら落ちます。
//! Task が待つべきウェーブは落ちてはいけないので、`tokio::sync::watch` で
//! 最新値だけを保持します。
//!
//! # 学習ポイント
//! - `watch` は「最新値 + バージョン」: 取りこぼしても最新のウェーブは必ず見える
//! - `Sender::subscribe()` は既存の値を既読扱いにする（古いウェーブを拾わない）
//! - `changed()` は cancel-safe なので `select!` でそのまま使える

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::ProductEvent;

type Slot = Option<Arc<ProductEvent>>;

/// 1 グループ分の feed。Monitor と Supervisor が共有する。
#[derive(Clone)]
pub struct ProductFeed {
    tx: Arc<watch::Sender<Slot>>,
}

impl ProductFeed {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the current wave. Never blocks, never fails.
    pub fn publish(&self, wave: Arc<ProductEvent>) {
        self.tx.send_replace(Some(wave));
    }

    /// Watch that only sees waves published after this call.
    pub fn subscribe(&self) -> ProductWatch {
        ProductWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ProductFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Task 側の受け口
pub struct ProductWatch {
    rx: watch::Receiver<Slot>,
}

impl ProductWatch {
    /// Waits for a wave newer than the last one seen. Waves published while
    /// nobody was waiting collapse into the latest. `None` once every
    /// `ProductFeed` handle is gone.
    pub async fn next(&mut self) -> Option<Arc<ProductEvent>> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(wave) = self.rx.borrow_and_update().clone() {
                return Some(wave);
            }
        }
    }
}
