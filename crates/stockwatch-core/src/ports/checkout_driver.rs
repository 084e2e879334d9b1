//! CheckoutDriver port - 小売店ごとのチェックアウト手順

use async_trait::async_trait;

use crate::domain::{CheckoutState, Session, StepOutcome, TaskContext};

/// CheckoutDriver はパイプラインの 1 ステップにつき 1 メソッドを持つ
///
/// # 設計原則
/// - 各ステップは前のステップが書いた `CheckoutState` を読み、自分の欄だけ書く
/// - `Retry` を返すと Task が待ってから同じステップを再実行する
/// - `Terminal` を返すと Task はそこで終了する
#[async_trait]
pub trait CheckoutDriver: Send + Sync {
    /// `ctx.credential` でログイン
    ///
    /// 得られた Session は、同じグループで同じ credential を使う全 Task が共有する。
    async fn login(&self, ctx: &TaskContext) -> StepOutcome<Session>;

    async fn add_to_cart(&self, ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome;

    async fn get_cart_info(&self, ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome;

    async fn set_shipping(&self, ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome;

    async fn set_billing(&self, ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome;

    async fn place_order(&self, ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome;
}
