//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 小売店アダプタは `RetailerAdapter` 経由で `StockSource` / `CheckoutDriver`
//! を提供し、コアは HTTP やスクレイピングの詳細を知りません。
//!
//! # 設計原則
//! - 小売店固有のロジックはすべてアダプタ側
//! - `Clock` / `IdGenerator` で時刻と ID を差し替え可能に（テスト容易性）

pub mod checkout_driver;
pub mod clock;
pub mod id_generator;
pub mod retailer;
pub mod stock_source;

pub use self::checkout_driver::CheckoutDriver;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::retailer::RetailerAdapter;
pub use self::stock_source::StockSource;
