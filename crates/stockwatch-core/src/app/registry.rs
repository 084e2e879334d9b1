//! RetailerRegistry - 小売店アダプタの登録と管理
//!
//! # 学習ポイント
//! - HashMap での trait object（`Arc<dyn RetailerAdapter>`）の管理
//! - グローバル registry を持たず、builder から Supervisor に注入する

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::RetailerAdapter;

/// RetailerRegistry は小売店名 → アダプタの対応表
///
/// # 使用例
/// ```ignore
/// let mut registry = RetailerRegistry::new();
/// registry.register(Arc::new(TargetAdapter::new()))?;
///
/// let adapter = registry.get("target")?;
/// ```
#[derive(Default, Clone)]
pub struct RetailerRegistry {
    adapters: HashMap<String, Arc<dyn RetailerAdapter>>,
}

/// RegistryError は RetailerRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Adapter for retailer '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("No adapter registered for retailer '{0}'")]
    NotRegistered(String),
}

impl RetailerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn RetailerAdapter>) -> Result<(), RegistryError> {
        let retailer = adapter.retailer().to_string();
        if self.adapters.contains_key(&retailer) {
            return Err(RegistryError::AlreadyRegistered(retailer));
        }
        self.adapters.insert(retailer, adapter);
        Ok(())
    }

    pub fn get(&self, retailer: &str) -> Result<Arc<dyn RetailerAdapter>, RegistryError> {
        self.adapters
            .get(retailer)
            .cloned()
            .ok_or_else(|| RegistryError::NotRegistered(retailer.to_string()))
    }

    /// 登録済みの小売店名（ソート済み）
    pub fn registered_retailers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}
