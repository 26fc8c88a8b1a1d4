//! Sumire ライブ値インスペクションのコア機能
//!
//! このクレートは、デバッグ対象プロセス内の値を検査するための中核ロジックを提供します。
//! 動的型の解決、リモートメモリからの文字列抽出、副作用ポリシー付きの式評価、
//! ブレークポイント条件の判定を、狭いバックエンドポート越しに統合します。

pub mod condition;
pub mod errors;
pub mod eval;
pub mod frame;
pub mod resolve;
pub mod strings;
pub mod type_info;
pub mod value;

#[cfg(test)]
mod test_support;

pub use condition::BreakpointCondition;
pub use eval::{
    CompileResult, EvalError, EvaluationGateway, EvaluationOptions, EvaluationResult,
    ExpressionEngine,
};
pub use frame::{DebugThread, FrameId, StackFrame, ThreadId};
pub use resolve::resolve_dynamic_type;
pub use strings::{decode_code_units, MemoryReader, StringReadConfig, StringReadError, StringReader};
pub use type_info::{FieldInfo, TypeInfo};
pub use value::{RemoteValue, ValueId, INVALID_ADDRESS};

/// 値インスペクションの結果型
pub type Result<T> = anyhow::Result<T>;
