//! 式評価ゲートウェイ
//!
//! 式エンジンの入口を1カ所に集め、入口ごとの副作用ポリシーの適用と、成功した
//! 結果への動的型解決を保証します。利用側はエンジンを直接呼ばず、必ずここを
//! 通します。

use std::collections::HashMap;

use crate::frame::StackFrame;
use crate::resolve::resolve_dynamic_type;
use crate::type_info::TypeInfo;
use crate::value::RemoteValue;

/// 式評価のエラー
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// 式のパースに失敗した
    #[error("parse error: {0}")]
    Parse(String),
    /// 名前を解決できなかった
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    /// 型が操作に合わない
    #[error("type error: {0}")]
    Type(String),
    /// 副作用が許可されていないコンテキストで代入などを行おうとした
    #[error("side effects are not allowed in this context")]
    SideEffectsNotAllowed,
    /// フレームが選択されていない
    #[error("no frame is selected")]
    NoFrameSelected,
    /// エンジン内部のその他のエラー
    #[error("{0}")]
    Engine(String),
}

/// 式エンジンに渡す評価オプション
///
/// デフォルトは保守的で、副作用を許可しません。対話的な入口だけが
/// [`EvaluationOptions::interactive`]で制限を緩めます。
pub struct EvaluationOptions {
    /// 式がターゲットの状態を変更してよいか（代入や関数呼び出し）
    pub allow_side_effects: bool,
    /// 評価中に踏んだブレークポイントを無視するか
    pub ignore_breakpoints: bool,
    /// 式から名前で参照できる追加の値
    pub context_variables: HashMap<String, Box<dyn RemoteValue>>,
    /// 型のみのコンパイルで名前に束縛する型
    pub context_arguments: HashMap<String, TypeInfo>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            allow_side_effects: false,
            ignore_breakpoints: true,
            context_variables: HashMap::new(),
            context_arguments: HashMap::new(),
        }
    }
}

impl EvaluationOptions {
    /// 対話入力向けの無制限なオプション
    pub fn interactive() -> Self {
        Self {
            allow_side_effects: true,
            ..Self::default()
        }
    }

    pub fn with_context_variables(
        mut self,
        context_variables: HashMap<String, Box<dyn RemoteValue>>,
    ) -> Self {
        self.context_variables = context_variables;
        self
    }

    pub fn with_context_arguments(
        mut self,
        context_arguments: HashMap<String, TypeInfo>,
    ) -> Self {
        self.context_arguments = context_arguments;
        self
    }
}

/// 式評価の結果
///
/// エンジンはエラー時にも診断用の値を併せて返すことがあるため、値とエラーを
/// 別々に保持します。成功は値がありエラーがない状態です。
pub struct EvaluationResult {
    pub value: Option<Box<dyn RemoteValue>>,
    pub error: Option<EvalError>,
}

impl EvaluationResult {
    pub fn success(value: Box<dyn RemoteValue>) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(error: EvalError) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }

    pub fn failure_with_value(value: Box<dyn RemoteValue>, error: EvalError) -> Self {
        Self {
            value: Some(value),
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.value.is_some()
    }
}

/// 型のみのコンパイルの結果
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub compiled_type: Option<TypeInfo>,
    pub error: Option<EvalError>,
}

impl CompileResult {
    pub fn success(compiled_type: TypeInfo) -> Self {
        Self {
            compiled_type: Some(compiled_type),
            error: None,
        }
    }

    pub fn failure(error: EvalError) -> Self {
        Self {
            compiled_type: None,
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.compiled_type.is_some()
    }
}

/// 式エンジンのポート
///
/// バックエンドはこのトレイトを実装します。どのメソッドもパニックせず、
/// 失敗は結果のエラーとして返します。
pub trait ExpressionEngine {
    /// フレームのスコープで式を評価する
    fn evaluate_in_frame(
        &self,
        frame: &dyn StackFrame,
        expression: &str,
        options: &EvaluationOptions,
    ) -> EvaluationResult;

    /// 既存の値を起点（スコープ）として式を評価する
    fn evaluate_on_value(
        &self,
        base: &dyn RemoteValue,
        expression: &str,
        options: &EvaluationOptions,
    ) -> EvaluationResult;

    /// 式を型チェックのみ行い、評価はしない
    fn compile_in_scope(
        &self,
        scope: &TypeInfo,
        expression: &str,
        options: &EvaluationOptions,
    ) -> CompileResult;
}

/// 式評価の唯一の入口
pub struct EvaluationGateway<'a> {
    engine: &'a dyn ExpressionEngine,
}

impl<'a> EvaluationGateway<'a> {
    pub fn new(engine: &'a dyn ExpressionEngine) -> Self {
        Self { engine }
    }

    /// フレームのスコープで式を評価する（対話入力向け）
    ///
    /// ユーザが明示的に入力した式のための入口で、代入などの副作用を許可します。
    pub fn evaluate(&self, frame: &dyn StackFrame, expression: &str) -> EvaluationResult {
        let options = EvaluationOptions::interactive();
        let result = self.engine.evaluate_in_frame(frame, expression, &options);
        self.post_process(result)
    }

    /// フレームのスコープで式を保守的に評価する
    ///
    /// ブレークポイント条件のように自動で繰り返し評価される式のための入口で、
    /// ターゲットの状態を変更する式は失敗します。
    pub fn evaluate_conservative(
        &self,
        frame: &dyn StackFrame,
        expression: &str,
    ) -> EvaluationResult {
        let options = EvaluationOptions::default();
        let result = self.engine.evaluate_in_frame(frame, expression, &options);
        self.post_process(result)
    }

    /// 既存の値を起点に式を評価する
    ///
    /// `context_variables`の値は式から名前で参照できます。副作用は許可しません。
    pub fn evaluate_on_value(
        &self,
        base: &dyn RemoteValue,
        expression: &str,
        context_variables: HashMap<String, Box<dyn RemoteValue>>,
    ) -> EvaluationResult {
        let options = EvaluationOptions::default().with_context_variables(context_variables);
        let result = self.engine.evaluate_on_value(base, expression, &options);
        self.post_process(result)
    }

    /// 式を型チェックのみ行う
    ///
    /// `scope`のフィールドと`context_arguments`の名前が式から見えます。
    /// 評価を行わないため、動的型解決も行いません。
    pub fn compile(
        &self,
        scope: &TypeInfo,
        expression: &str,
        context_arguments: HashMap<String, TypeInfo>,
    ) -> CompileResult {
        let options = EvaluationOptions::default().with_context_arguments(context_arguments);
        self.engine.compile_in_scope(scope, expression, &options)
    }

    /// 成功した結果だけを動的型で見た値に差し替える
    fn post_process(&self, result: EvaluationResult) -> EvaluationResult {
        match result {
            EvaluationResult {
                value: Some(value),
                error: None,
            } => EvaluationResult::success(resolve_dynamic_type(value)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedEngine, TestFrame, TestValue};

    fn int_type() -> TypeInfo {
        TypeInfo::Primitive {
            name: "int".to_string(),
            size: 4,
        }
    }

    fn int_value(name: &str, value: u64) -> TestValue {
        TestValue::new(name, int_type()).with_unsigned(value)
    }

    fn shape_pointer_with_dynamic() -> TestValue {
        let polymorphic = |name: &str| TypeInfo::Class {
            name: name.to_string(),
            size: 16,
            polymorphic: true,
            fields: Vec::new(),
        };
        let derived = TestValue::new(
            "sp",
            TypeInfo::Pointer {
                pointee: Some(Box::new(polymorphic("Circle"))),
                size: 8,
            },
        )
        .with_unsigned(0x2000);
        TestValue::new(
            "sp",
            TypeInfo::Pointer {
                pointee: Some(Box::new(polymorphic("Shape"))),
                size: 8,
            },
        )
        .with_unsigned(0x2000)
        .with_dynamic(derived)
    }

    #[test]
    fn test_evaluate_allows_side_effects() {
        let engine = ScriptedEngine::new();
        engine.script("x = 5", || {
            EvaluationResult::success(int_value("x", 5).boxed())
        });
        let gateway = EvaluationGateway::new(&engine);
        let frame = TestFrame::new(0, "main");

        let result = gateway.evaluate(&frame, "x = 5");
        assert!(result.succeeded());

        let call = engine.last_call();
        assert_eq!(call.entry, "frame");
        assert_eq!(call.expression, "x = 5");
        assert!(call.allow_side_effects);
        assert!(call.ignore_breakpoints);
    }

    #[test]
    fn test_evaluate_conservative_forbids_side_effects() {
        let engine = ScriptedEngine::new();
        engine.script("x == 5", || {
            EvaluationResult::success(int_value("", 1).boxed())
        });
        let gateway = EvaluationGateway::new(&engine);
        let frame = TestFrame::new(0, "main");

        let result = gateway.evaluate_conservative(&frame, "x == 5");
        assert!(result.succeeded());

        let call = engine.last_call();
        assert_eq!(call.entry, "frame");
        assert!(!call.allow_side_effects);
        assert!(call.ignore_breakpoints);
    }

    #[test]
    fn test_evaluate_on_value_forbids_side_effects_and_forwards_context() {
        let engine = ScriptedEngine::new();
        engine.script("field + a", || {
            EvaluationResult::success(int_value("", 8).boxed())
        });
        let gateway = EvaluationGateway::new(&engine);

        let base = int_value("base", 3);
        let mut context = HashMap::new();
        context.insert("a".to_string(), int_value("a", 5).boxed());

        let result = gateway.evaluate_on_value(&base, "field + a", context);
        assert!(result.succeeded());

        let call = engine.last_call();
        assert_eq!(call.entry, "value");
        assert!(!call.allow_side_effects);
        assert_eq!(call.context_variables, vec!["a".to_string()]);
    }

    #[test]
    fn test_compile_forwards_context_arguments() {
        let engine = ScriptedEngine::new();
        engine.script_compile("arg == count", CompileResult::success(int_type()));
        let gateway = EvaluationGateway::new(&engine);

        let scope = TypeInfo::Class {
            name: "Counter".to_string(),
            size: 8,
            polymorphic: false,
            fields: Vec::new(),
        };
        let mut arguments = HashMap::new();
        arguments.insert("arg".to_string(), int_type());

        let result = gateway.compile(&scope, "arg == count", arguments);
        assert!(result.succeeded());
        assert_eq!(result.compiled_type, Some(int_type()));

        let call = engine.last_call();
        assert_eq!(call.entry, "compile");
        assert!(!call.allow_side_effects);
        assert_eq!(call.context_arguments, vec!["arg".to_string()]);
    }

    #[test]
    fn test_success_resolves_dynamic_type() {
        let engine = ScriptedEngine::new();
        engine.script("sp", || {
            EvaluationResult::success(shape_pointer_with_dynamic().boxed())
        });
        let gateway = EvaluationGateway::new(&engine);
        let frame = TestFrame::new(0, "main");

        let result = gateway.evaluate(&frame, "sp");
        assert!(result.succeeded());
        let value = result.value.unwrap();
        assert_eq!(value.type_info().name(), "Circle *");
    }

    #[test]
    fn test_failure_passes_through_without_resolution() {
        let engine = ScriptedEngine::new();
        engine.script("sp", || {
            EvaluationResult::failure_with_value(
                shape_pointer_with_dynamic().boxed(),
                EvalError::Type("incomplete".to_string()),
            )
        });
        let gateway = EvaluationGateway::new(&engine);
        let frame = TestFrame::new(0, "main");

        let result = gateway.evaluate(&frame, "sp");
        assert!(!result.succeeded());
        assert_eq!(result.error, Some(EvalError::Type("incomplete".to_string())));
        // エラー時は値があっても動的型解決を行わない
        let value = result.value.unwrap();
        assert_eq!(value.type_info().name(), "Shape *");
    }

    #[test]
    fn test_unscripted_expression_fails_without_panic() {
        let engine = ScriptedEngine::new();
        let gateway = EvaluationGateway::new(&engine);
        let frame = TestFrame::new(0, "main");

        let result = gateway.evaluate(&frame, "no_such");
        assert!(!result.succeeded());
        assert_eq!(
            result.error,
            Some(EvalError::UnknownIdentifier("no_such".to_string()))
        );
        assert!(result.value.is_none());
    }

    #[test]
    fn test_result_constructors() {
        let ok = EvaluationResult::success(int_value("x", 1).boxed());
        assert!(ok.succeeded());

        let failed = EvaluationResult::failure(EvalError::NoFrameSelected);
        assert!(!failed.succeeded());
        assert!(failed.value.is_none());

        let partial = EvaluationResult::failure_with_value(
            int_value("x", 1).boxed(),
            EvalError::Engine("partial".to_string()),
        );
        assert!(!partial.succeeded());
        assert!(partial.value.is_some());
    }
}
