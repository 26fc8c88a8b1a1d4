//! シミュレートターゲットの式エンジン
//!
//! フレームの変数表とマップ済みメモリの上で、小さなC風の式を評価します。
//! 対応するのは整数リテラル、識別子、`*`と`&`、フィールドアクセス、
//! `==`と`!=`、代入です。

use std::cell::RefCell;
use std::collections::HashMap;

use sumire_core::{
    CompileResult, EvalError, EvaluationOptions, EvaluationResult, ExpressionEngine, FrameId,
    RemoteValue, StackFrame, TypeInfo,
};
use tracing::debug;

use crate::memory::TargetMemory;
use crate::value::SimValue;

/// フレームから見える変数の束縛
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub address: u64,
    pub type_info: TypeInfo,
}

/// 式の評価の起点
enum Scope<'a> {
    Frame(FrameId),
    Value(&'a dyn RemoteValue),
}

/// パース済みの式
#[derive(Debug, Clone, PartialEq)]
enum Expression {
    Number(u64),
    Identifier(String),
    Deref(Box<Expression>),
    AddressOf(Box<Expression>),
    FieldAccess {
        base: Box<Expression>,
        field: String,
    },
    Equals(Box<Expression>, Box<Expression>),
    NotEquals(Box<Expression>, Box<Expression>),
    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
    },
}

/// シミュレートされたデバッグターゲット
///
/// マップ済みメモリ、フレームごとの変数表、オブジェクトの実行時型の表を
/// 持ちます。評価中の代入がメモリを書き換えられるよう、メモリは内部可変に
/// しています。
pub struct SimTarget {
    memory: RefCell<TargetMemory>,
    variables: HashMap<FrameId, Vec<Variable>>,
    dynamic_types: HashMap<u64, TypeInfo>,
}

impl SimTarget {
    pub fn new(memory: TargetMemory) -> Self {
        Self {
            memory: RefCell::new(memory),
            variables: HashMap::new(),
            dynamic_types: HashMap::new(),
        }
    }

    /// フレームに変数を追加する
    pub fn add_variable(&mut self, frame: FrameId, name: &str, address: u64, type_info: TypeInfo) {
        self.variables.entry(frame).or_default().push(Variable {
            name: name.to_string(),
            address,
            type_info,
        });
    }

    /// オブジェクトの実行時型を登録する
    ///
    /// `address`にあるオブジェクトが、静的型ではなく`type_info`として
    /// 構築されていることを表します。
    pub fn set_dynamic_type(&mut self, address: u64, type_info: TypeInfo) {
        self.dynamic_types.insert(address, type_info);
    }

    /// フレームから見える変数の一覧
    pub fn variables_in_frame(&self, frame: FrameId) -> &[Variable] {
        self.variables
            .get(&frame)
            .map(|variables| variables.as_slice())
            .unwrap_or(&[])
    }

    /// 生のメモリを読み取る
    pub fn read_memory(&self, address: u64, length: usize) -> crate::Result<Vec<u8>> {
        self.memory.borrow().read(address, length)
    }

    fn lookup_variable(&self, frame: FrameId, name: &str) -> Option<Variable> {
        self.variables
            .get(&frame)
            .and_then(|variables| variables.iter().find(|v| v.name == name))
            .cloned()
    }

    fn materialize(&self, name: &str, type_info: TypeInfo, address: u64) -> SimValue {
        SimValue::from_memory(
            name,
            type_info,
            address,
            &self.memory.borrow(),
            &self.dynamic_types,
        )
    }

    /// ポート越しに渡された値をこのターゲットの値として取り込む
    ///
    /// アドレスを持つ値はメモリから読み直して完全な配線を持たせ、アドレスの
    /// ない値はスカラとして写し取ります。
    fn import_value(&self, name: &str, value: &dyn RemoteValue) -> Box<dyn RemoteValue> {
        if let Some(address) = value.load_address() {
            self.materialize(name, value.type_info().clone(), address).boxed()
        } else {
            let size = value.byte_size().clamp(1, 8);
            SimValue::new(
                name,
                value.type_info().clone(),
                value.as_unsigned().to_le_bytes()[..size].to_vec(),
            )
            .boxed()
        }
    }

    fn eval(
        &self,
        expression: &Expression,
        scope: &Scope,
        options: &EvaluationOptions,
    ) -> Result<Box<dyn RemoteValue>, EvalError> {
        match expression {
            Expression::Number(number) => Ok(SimValue::new(
                &number.to_string(),
                TypeInfo::Primitive {
                    name: "unsigned long".to_string(),
                    size: 8,
                },
                number.to_le_bytes().to_vec(),
            )
            .boxed()),

            Expression::Identifier(name) => self.lookup_identifier(name, scope, options),

            Expression::Deref(inner) => {
                let value = self.eval(inner, scope, options)?;
                if let Some(target) = value.dereference() {
                    return Ok(self.import_value(target.name(), target.as_ref()));
                }
                // 配線のない合成ポインタでも、指す先をメモリから読み直して応える
                let pointee = value.type_info().pointee().cloned();
                match pointee {
                    Some(pointee) if value.as_unsigned() != 0 => Ok(self
                        .materialize(&format!("*{}", value.name()), pointee, value.as_unsigned())
                        .boxed()),
                    _ => Err(EvalError::Type(format!(
                        "cannot dereference '{}'",
                        value.name()
                    ))),
                }
            }

            Expression::AddressOf(inner) => {
                let value = self.eval(inner, scope, options)?;
                value.address_of().ok_or_else(|| {
                    EvalError::Type(format!("cannot take the address of '{}'", value.name()))
                })
            }

            Expression::FieldAccess { base, field } => {
                let base_value = self.eval(base, scope, options)?;
                let child = base_value.child_by_name(field).ok_or_else(|| {
                    EvalError::Type(format!(
                        "'{}' has no field named '{}'",
                        base_value.name(),
                        field
                    ))
                })?;
                Ok(self.import_value(child.name(), child.as_ref()))
            }

            Expression::Equals(left, right) => {
                let left = self.eval(left, scope, options)?;
                let right = self.eval(right, scope, options)?;
                Ok(bool_value(left.as_unsigned() == right.as_unsigned()).boxed())
            }

            Expression::NotEquals(left, right) => {
                let left = self.eval(left, scope, options)?;
                let right = self.eval(right, scope, options)?;
                Ok(bool_value(left.as_unsigned() != right.as_unsigned()).boxed())
            }

            Expression::Assign { target, value } => {
                if !options.allow_side_effects {
                    return Err(EvalError::SideEffectsNotAllowed);
                }
                let new_value = self.eval(value, scope, options)?;
                let target_value = self.eval(target, scope, options)?;
                let address = target_value.load_address().ok_or_else(|| {
                    EvalError::Type(format!("cannot assign to '{}'", target_value.name()))
                })?;
                let size = target_value.byte_size();
                self.memory
                    .borrow_mut()
                    .write_unsigned(address, new_value.as_unsigned(), size)
                    .map_err(|e| EvalError::Engine(e.to_string()))?;
                // 代入後の状態を読み直した値を返す
                self.eval(target, scope, options)
            }
        }
    }

    fn lookup_identifier(
        &self,
        name: &str,
        scope: &Scope,
        options: &EvaluationOptions,
    ) -> Result<Box<dyn RemoteValue>, EvalError> {
        // コンテキスト変数は同名のスコープ変数より優先される
        if let Some(value) = options.context_variables.get(name) {
            return Ok(self.import_value(name, value.as_ref()));
        }
        match scope {
            Scope::Frame(frame) => {
                let variable = self
                    .lookup_variable(*frame, name)
                    .ok_or_else(|| EvalError::UnknownIdentifier(name.to_string()))?;
                Ok(self
                    .materialize(&variable.name, variable.type_info.clone(), variable.address)
                    .boxed())
            }
            Scope::Value(base) => base
                .child_by_name(name)
                .map(|child| self.import_value(name, child.as_ref()))
                .ok_or_else(|| EvalError::UnknownIdentifier(name.to_string())),
        }
    }

    /// 式の型だけを求める。評価は行わない
    fn check(
        &self,
        expression: &Expression,
        scope: &TypeInfo,
        options: &EvaluationOptions,
    ) -> Result<TypeInfo, EvalError> {
        match expression {
            Expression::Number(_) => Ok(TypeInfo::Primitive {
                name: "unsigned long".to_string(),
                size: 8,
            }),

            Expression::Identifier(name) => {
                if let Some(argument) = options.context_arguments.get(name) {
                    return Ok(argument.clone());
                }
                // スコープ型のフィールドは暗黙のthis経由で見える
                if let TypeInfo::Class { fields, .. } = scope {
                    if let Some(field) = fields.iter().find(|f| f.name == *name) {
                        return Ok(field.type_info.clone());
                    }
                }
                Err(EvalError::UnknownIdentifier(name.to_string()))
            }

            Expression::Deref(inner) => {
                let inner_type = self.check(inner, scope, options)?;
                inner_type.pointee().cloned().ok_or_else(|| {
                    EvalError::Type(format!(
                        "cannot dereference a value of type {}",
                        inner_type.name()
                    ))
                })
            }

            Expression::AddressOf(inner) => {
                let inner_type = self.check(inner, scope, options)?;
                Ok(TypeInfo::Pointer {
                    pointee: Some(Box::new(inner_type)),
                    size: 8,
                })
            }

            Expression::FieldAccess { base, field } => {
                let base_type = self.check(base, scope, options)?;
                if let TypeInfo::Class { fields, name, .. } = &base_type {
                    fields
                        .iter()
                        .find(|f| f.name == *field)
                        .map(|f| f.type_info.clone())
                        .ok_or_else(|| {
                            EvalError::Type(format!("type {} has no field '{}'", name, field))
                        })
                } else {
                    Err(EvalError::Type(format!(
                        "type {} has no fields",
                        base_type.name()
                    )))
                }
            }

            Expression::Equals(left, right) | Expression::NotEquals(left, right) => {
                self.check(left, scope, options)?;
                self.check(right, scope, options)?;
                Ok(TypeInfo::Primitive {
                    name: "bool".to_string(),
                    size: 1,
                })
            }

            Expression::Assign { .. } => Err(EvalError::SideEffectsNotAllowed),
        }
    }
}

impl ExpressionEngine for SimTarget {
    fn evaluate_in_frame(
        &self,
        frame: &dyn StackFrame,
        expression: &str,
        options: &EvaluationOptions,
    ) -> EvaluationResult {
        debug!("evaluating '{}' in frame {}", expression, frame.id());
        let parsed = match parse_expression(expression) {
            Ok(parsed) => parsed,
            Err(error) => return EvaluationResult::failure(error),
        };
        match self.eval(&parsed, &Scope::Frame(frame.id()), options) {
            Ok(value) => EvaluationResult::success(value),
            Err(error) => EvaluationResult::failure(error),
        }
    }

    fn evaluate_on_value(
        &self,
        base: &dyn RemoteValue,
        expression: &str,
        options: &EvaluationOptions,
    ) -> EvaluationResult {
        let parsed = match parse_expression(expression) {
            Ok(parsed) => parsed,
            Err(error) => return EvaluationResult::failure(error),
        };
        match self.eval(&parsed, &Scope::Value(base), options) {
            Ok(value) => EvaluationResult::success(value),
            Err(error) => EvaluationResult::failure(error),
        }
    }

    fn compile_in_scope(
        &self,
        scope: &TypeInfo,
        expression: &str,
        options: &EvaluationOptions,
    ) -> CompileResult {
        let parsed = match parse_expression(expression) {
            Ok(parsed) => parsed,
            Err(error) => return CompileResult::failure(error),
        };
        match self.check(&parsed, scope, options) {
            Ok(compiled_type) => CompileResult::success(compiled_type),
            Err(error) => CompileResult::failure(error),
        }
    }
}

impl sumire_core::MemoryReader for SimTarget {
    fn read(&self, address: u64, length: usize) -> sumire_core::Result<Vec<u8>> {
        self.memory.borrow().read(address, length)
    }
}

fn bool_value(value: bool) -> SimValue {
    SimValue::new(
        "",
        TypeInfo::Primitive {
            name: "bool".to_string(),
            size: 1,
        },
        vec![value as u8],
    )
}

/// 二項演算子で式を2つに割る
fn split_binary(text: &str, operator: &str) -> Option<(String, String)> {
    text.find(operator).map(|position| {
        (
            text[..position].trim().to_string(),
            text[position + operator.len()..].trim().to_string(),
        )
    })
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_expression(text: &str) -> Result<Expression, EvalError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EvalError::Parse("empty expression".to_string()));
    }

    // 二項演算子を先に切る。`=`は`==`と`!=`を除外してから代入として扱う
    if let Some((left, right)) = split_binary(text, "==") {
        return Ok(Expression::Equals(
            Box::new(parse_expression(&left)?),
            Box::new(parse_expression(&right)?),
        ));
    }
    if let Some((left, right)) = split_binary(text, "!=") {
        return Ok(Expression::NotEquals(
            Box::new(parse_expression(&left)?),
            Box::new(parse_expression(&right)?),
        ));
    }
    if let Some((left, right)) = split_binary(text, "=") {
        return Ok(Expression::Assign {
            target: Box::new(parse_expression(&left)?),
            value: Box::new(parse_expression(&right)?),
        });
    }

    if let Some(rest) = text.strip_prefix('*') {
        return Ok(Expression::Deref(Box::new(parse_expression(rest)?)));
    }
    if let Some(rest) = text.strip_prefix('&') {
        return Ok(Expression::AddressOf(Box::new(parse_expression(rest)?)));
    }

    // フィールドアクセスは最後のドットで切る
    if let Some(position) = text.rfind('.') {
        let field = text[position + 1..].trim();
        if !is_identifier(field) {
            return Err(EvalError::Parse(format!(
                "invalid field name in '{}'",
                text
            )));
        }
        return Ok(Expression::FieldAccess {
            base: Box::new(parse_expression(&text[..position])?),
            field: field.to_string(),
        });
    }

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(Expression::Number)
            .map_err(|_| EvalError::Parse(format!("invalid hex literal '{}'", text)));
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text
            .parse::<u64>()
            .map(Expression::Number)
            .map_err(|_| EvalError::Parse(format!("invalid number literal '{}'", text)));
    }

    if is_identifier(text) {
        return Ok(Expression::Identifier(text.to_string()));
    }
    Err(EvalError::Parse(format!(
        "cannot parse expression '{}'",
        text
    )))
}
