//! SupervisorBuilder - Supervisor の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use crate::app::{RegistryError, RetailerRegistry, Supervisor};
use crate::config::{ConfigError, StockwatchConfig, SupervisorConfig};
use crate::ports::{IdGenerator, RetailerAdapter, SystemClock, UlidGenerator};

/// SupervisorBuilder は Supervisor を構築
///
/// # 使用例
/// ```ignore
/// let supervisor = SupervisorBuilder::new()
///     .register(Arc::new(MyRetailer::new()))?
///     .config(&config)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - `expect_retailers()` / `config()` で必要な小売店を登録
/// - `build()` 時に「必要な集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば `BuildError::MissingRetailers` を返す
pub struct SupervisorBuilder {
    registry: RetailerRegistry,
    expected_retailers: Option<Vec<String>>,
    settings: SupervisorConfig,
    ids: Arc<dyn IdGenerator>,
}

/// BuildError は Supervisor 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing retailer adapters: {0:?}. These retailers are configured but not registered.")]
    MissingRetailers(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            registry: RetailerRegistry::new(),
            expected_retailers: None,
            settings: SupervisorConfig::default(),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }

    pub fn register(mut self, adapter: Arc<dyn RetailerAdapter>) -> Result<Self, RegistryError> {
        self.registry.register(adapter)?;
        Ok(self)
    }

    pub fn expect_retailers(mut self, retailers: &[&str]) -> Self {
        self.expected_retailers = Some(retailers.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn settings(mut self, settings: SupervisorConfig) -> Self {
        self.settings = settings;
        self
    }

    /// `config` の supervisor 設定を取り込み、全グループが使う小売店を期待集合にする
    pub fn config(mut self, config: &StockwatchConfig) -> Self {
        self.settings = config.supervisor.clone();
        let mut retailers: Vec<String> = config.groups.iter().map(|g| g.retailer.clone()).collect();
        retailers.sort();
        retailers.dedup();
        self.expected_retailers = Some(retailers);
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn build(self) -> Result<Supervisor, BuildError> {
        self.settings.validate()?;
        if let Some(expected) = &self.expected_retailers {
            let registered = self.registry.registered_retailers();
            let missing: Vec<String> = expected
                .iter()
                .filter(|r| !registered.contains(r))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingRetailers(missing));
            }
        }
        Ok(Supervisor::new(self.registry, self.settings, self.ids))
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
