//! ブレークポイント条件の評価
//!
//! 条件式の真偽でブレークポイントの停止可否を決めます。評価の失敗は
//! 「停止しない」として扱い、デバッガの実行制御を止めません。

use tracing::debug;

use crate::eval::{EvaluationGateway, EvaluationResult};
use crate::frame::DebugThread;

/// ブレークポイントに付けられた条件式
///
/// 条件はテキストとして保持し、停止のたびに評価し直します。条件の
/// 差し替えは構造体ごと置き換えます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointCondition {
    text: String,
}

impl BreakpointCondition {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// 条件式のテキスト
    pub fn text(&self) -> &str {
        &self.text
    }

    /// このスレッドの現在の位置で停止すべきかを判定する
    ///
    /// 条件式が非ゼロに評価された場合のみtrueを返します。フレームが選択されて
    /// いない場合や評価に失敗した場合は、エラーを外に出さずfalseを返します。
    pub fn should_stop(&self, gateway: &EvaluationGateway, thread: &dyn DebugThread) -> bool {
        let frame = match thread.selected_frame() {
            Some(frame) => frame,
            None => {
                debug!(
                    "thread {} has no selected frame; condition '{}' not evaluated",
                    thread.id(),
                    self.text
                );
                return false;
            }
        };

        // 条件は自動で何度も評価されるため、副作用を許可しない入口を使う
        match gateway.evaluate_conservative(frame.as_ref(), &self.text) {
            EvaluationResult {
                value: Some(value),
                error: None,
            } => value.as_unsigned() != 0,
            _ => {
                debug!("breakpoint condition '{}' failed to evaluate", self.text);
                false
            }
        }
    }
}
