//! テスト用の共有フィクスチャ
//!
//! ターゲットプロセスなしでポートの振る舞いを再現する最小限の実装群です。

use std::cell::RefCell;
use std::collections::HashMap;

use crate::eval::{
    CompileResult, EvalError, EvaluationOptions, EvaluationResult, ExpressionEngine,
};
use crate::frame::{DebugThread, FrameId, StackFrame, ThreadId};
use crate::strings::MemoryReader;
use crate::type_info::TypeInfo;
use crate::value::RemoteValue;
use crate::Result;

/// 接続をあらかじめ配線しておけるテスト用の値
///
/// `with_*`で組み立て、`RemoteValue`としてそのまま渡します。配線していない
/// 接続は失敗（None）として振る舞います。
#[derive(Debug, Clone)]
pub struct TestValue {
    name: String,
    type_info: TypeInfo,
    unsigned: u64,
    load_address: Option<u64>,
    children: Vec<TestValue>,
    address_of: Option<Box<TestValue>>,
    dereference: Option<Box<TestValue>>,
    dynamic: Option<Box<TestValue>>,
    error: Option<String>,
}

impl TestValue {
    pub fn new(name: &str, type_info: TypeInfo) -> Self {
        Self {
            name: name.to_string(),
            type_info,
            unsigned: 0,
            load_address: None,
            children: Vec::new(),
            address_of: None,
            dereference: None,
            dynamic: None,
            error: None,
        }
    }

    pub fn with_unsigned(mut self, value: u64) -> Self {
        self.unsigned = value;
        self
    }

    pub fn with_load_address(mut self, address: u64) -> Self {
        self.load_address = Some(address);
        self
    }

    pub fn clear_load_address(mut self) -> Self {
        self.load_address = None;
        self
    }

    pub fn with_children(mut self, children: Vec<TestValue>) -> Self {
        self.children = children;
        self
    }

    pub fn with_address_of(mut self, value: TestValue) -> Self {
        self.address_of = Some(Box::new(value));
        self
    }

    pub fn with_dereference(mut self, value: TestValue) -> Self {
        self.dereference = Some(Box::new(value));
        self
    }

    pub fn with_dynamic(mut self, value: TestValue) -> Self {
        self.dynamic = Some(Box::new(value));
        self
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    pub fn boxed(self) -> Box<dyn RemoteValue> {
        Box::new(self)
    }
}

impl RemoteValue for TestValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    fn num_children(&self) -> usize {
        self.children.len()
    }

    fn child_at(&self, index: usize) -> Option<Box<dyn RemoteValue>> {
        self.children
            .get(index)
            .map(|child| child.clone().boxed())
    }

    fn as_unsigned(&self) -> u64 {
        self.unsigned
    }

    fn load_address(&self) -> Option<u64> {
        self.load_address
    }

    fn address_of(&self) -> Option<Box<dyn RemoteValue>> {
        self.address_of.as_ref().map(|v| (**v).clone().boxed())
    }

    fn dereference(&self) -> Option<Box<dyn RemoteValue>> {
        self.dereference.as_ref().map(|v| (**v).clone().boxed())
    }

    fn dynamic_value(&self) -> Option<Box<dyn RemoteValue>> {
        self.dynamic.as_ref().map(|v| (**v).clone().boxed())
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// 1つの連続領域を持つテスト用メモリ
///
/// 領域の末尾では要求より短いデータを返し、領域外の開始アドレスはエラーに
/// します。読み取り要求の長さを記録するため、チャンクの成長を検証できます。
pub struct MockMemory {
    base: u64,
    data: Vec<u8>,
    requests: RefCell<Vec<usize>>,
}

impl MockMemory {
    pub fn new(base: u64, data: Vec<u8>) -> Self {
        Self {
            base,
            data,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// これまでの読み取り要求の長さ（バイト）の列
    pub fn requests(&self) -> Vec<usize> {
        self.requests.borrow().clone()
    }
}

impl MemoryReader for MockMemory {
    fn read(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        self.requests.borrow_mut().push(length);

        let end = self.base + self.data.len() as u64;
        if address < self.base || address >= end {
            return Err(anyhow::anyhow!("unmapped address 0x{:x}", address));
        }
        let offset = (address - self.base) as usize;
        let available = self.data.len() - offset;
        Ok(self.data[offset..offset + length.min(available)].to_vec())
    }
}

/// テスト用のスタックフレーム
#[derive(Debug, Clone)]
pub struct TestFrame {
    pub id: FrameId,
    pub function: String,
}

impl TestFrame {
    pub fn new(id: FrameId, function: &str) -> Self {
        Self {
            id,
            function: function.to_string(),
        }
    }
}

impl StackFrame for TestFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn function_name(&self) -> &str {
        &self.function
    }
}

/// テスト用のスレッド
pub struct TestThread {
    pub id: ThreadId,
    pub frame: Option<TestFrame>,
}

impl TestThread {
    pub fn new(id: ThreadId, frame: Option<TestFrame>) -> Self {
        Self { id, frame }
    }
}

impl DebugThread for TestThread {
    fn id(&self) -> ThreadId {
        self.id
    }

    fn selected_frame(&self) -> Option<Box<dyn StackFrame>> {
        self.frame
            .clone()
            .map(|frame| Box::new(frame) as Box<dyn StackFrame>)
    }
}

/// エンジンが受け取った1回分の呼び出しの記録
#[derive(Debug, Clone)]
pub struct SeenCall {
    pub entry: &'static str,
    pub expression: String,
    pub allow_side_effects: bool,
    pub ignore_breakpoints: bool,
    pub context_variables: Vec<String>,
    pub context_arguments: Vec<String>,
}

/// 台本どおりに応答する式エンジン
///
/// 受け取ったオプションをすべて記録するため、ゲートウェイが各入口で正しい
/// ポリシーを渡しているかを検証できます。
pub struct ScriptedEngine {
    responses: RefCell<HashMap<String, Box<dyn Fn() -> EvaluationResult>>>,
    compile_responses: RefCell<HashMap<String, CompileResult>>,
    calls: RefCell<Vec<SeenCall>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            responses: RefCell::new(HashMap::new()),
            compile_responses: RefCell::new(HashMap::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// 式に対する評価応答を登録する
    pub fn script(&self, expression: &str, factory: impl Fn() -> EvaluationResult + 'static) {
        self.responses
            .borrow_mut()
            .insert(expression.to_string(), Box::new(factory));
    }

    /// 式に対するコンパイル応答を登録する
    pub fn script_compile(&self, expression: &str, result: CompileResult) {
        self.compile_responses
            .borrow_mut()
            .insert(expression.to_string(), result);
    }

    /// 直近の呼び出しの記録
    pub fn last_call(&self) -> SeenCall {
        self.calls
            .borrow()
            .last()
            .cloned()
            .expect("engine was never called")
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    fn record(&self, entry: &'static str, expression: &str, options: &EvaluationOptions) {
        let mut context_variables: Vec<String> =
            options.context_variables.keys().cloned().collect();
        context_variables.sort();
        let mut context_arguments: Vec<String> =
            options.context_arguments.keys().cloned().collect();
        context_arguments.sort();

        self.calls.borrow_mut().push(SeenCall {
            entry,
            expression: expression.to_string(),
            allow_side_effects: options.allow_side_effects,
            ignore_breakpoints: options.ignore_breakpoints,
            context_variables,
            context_arguments,
        });
    }

    fn respond(&self, expression: &str) -> EvaluationResult {
        let responses = self.responses.borrow();
        match responses.get(expression) {
            Some(factory) => factory(),
            None => EvaluationResult::failure(EvalError::UnknownIdentifier(
                expression.to_string(),
            )),
        }
    }
}

impl ExpressionEngine for ScriptedEngine {
    fn evaluate_in_frame(
        &self,
        _frame: &dyn StackFrame,
        expression: &str,
        options: &EvaluationOptions,
    ) -> EvaluationResult {
        self.record("frame", expression, options);
        self.respond(expression)
    }

    fn evaluate_on_value(
        &self,
        _base: &dyn RemoteValue,
        expression: &str,
        options: &EvaluationOptions,
    ) -> EvaluationResult {
        self.record("value", expression, options);
        self.respond(expression)
    }

    fn compile_in_scope(
        &self,
        _scope: &TypeInfo,
        expression: &str,
        options: &EvaluationOptions,
    ) -> CompileResult {
        self.record("compile", expression, options);
        let responses = self.compile_responses.borrow();
        responses.get(expression).cloned().unwrap_or_else(|| {
            CompileResult::failure(EvalError::UnknownIdentifier(expression.to_string()))
        })
    }
}
