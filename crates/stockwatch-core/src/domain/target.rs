//! Watch targets and stock reports.

use serde::{Deserialize, Serialize};

/// How a product can be fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentKind {
    Shipping,
    Pickup,
}

/// Which fulfillment kinds a target accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    #[default]
    Any,
    ShippingOnly,
    PickupOnly,
}

impl TargetMode {
    pub fn accepts(self, kind: FulfillmentKind) -> bool {
        match self {
            TargetMode::Any => true,
            TargetMode::ShippingOnly => kind == FulfillmentKind::Shipping,
            TargetMode::PickupOnly => kind == FulfillmentKind::Pickup,
        }
    }
}

/// One monitored product identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchTarget {
    /// SKU / product id as understood by the retailer adapter.
    pub id: String,

    /// Price ceiling. `None` = any price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,

    #[serde(default)]
    pub mode: TargetMode,
}

impl WatchTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_price: None,
            mode: TargetMode::Any,
        }
    }

    pub fn with_max_price(mut self, max_price: f64) -> Self {
        self.max_price = Some(max_price);
        self
    }

    pub fn with_mode(mut self, mode: TargetMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Availability reported by a `StockSource` for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
}

/// Per-target result of a stock check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReport {
    pub status: StockStatus,
    pub price: f64,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Only meaningful when in stock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<FulfillmentKind>,

    /// Retailer-specific identifiers needed downstream (offer id, variant, ...).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub identifiers: serde_json::Value,
}

impl StockReport {
    pub fn in_stock(name: impl Into<String>, price: f64, fulfillment: FulfillmentKind) -> Self {
        Self {
            status: StockStatus::InStock,
            price,
            name: name.into(),
            image_url: None,
            fulfillment: Some(fulfillment),
            identifiers: serde_json::Value::Null,
        }
    }

    pub fn out_of_stock(name: impl Into<String>) -> Self {
        Self {
            status: StockStatus::OutOfStock,
            price: 0.0,
            name: name.into(),
            image_url: None,
            fulfillment: None,
            identifiers: serde_json::Value::Null,
        }
    }

    pub fn with_identifiers(mut self, identifiers: serde_json::Value) -> Self {
        self.identifiers = identifiers;
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// A detected, actionable product handed to Tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub target_id: String,
    pub name: String,
    pub price: f64,
    pub fulfillment: FulfillmentKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub identifiers: serde_json::Value,
}

/// Result of evaluating one report against its target.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Actionable(Product),
    /// In stock, but filtered (price ceiling or fulfillment mode).
    Filtered,
    OutOfStock,
    /// Report could not be interpreted; no observation this tick.
    Malformed(String),
}

impl WatchTarget {
    /// Applies stock, mode and price-ceiling rules to a report.
    pub fn evaluate(&self, report: &StockReport) -> Evaluation {
        if report.status == StockStatus::OutOfStock {
            return Evaluation::OutOfStock;
        }
        if !report.price.is_finite() || report.price < 0.0 {
            return Evaluation::Malformed(format!("invalid price {}", report.price));
        }
        let Some(fulfillment) = report.fulfillment else {
            return Evaluation::Malformed("in stock without fulfillment kind".to_string());
        };
        if !self.mode.accepts(fulfillment) {
            return Evaluation::Filtered;
        }
        if let Some(max) = self.max_price {
            if report.price > max {
                return Evaluation::Filtered;
            }
        }
        Evaluation::Actionable(Product {
            target_id: self.id.clone(),
            name: report.name.clone(),
            price: report.price,
            fulfillment,
            image_url: report.image_url.clone(),
            identifiers: report.identifiers.clone(),
        })
    }
}
