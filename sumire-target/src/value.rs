//! シミュレートされたリモート値

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use sumire_core::{RemoteValue, TypeInfo, ValueId};

use crate::memory::TargetMemory;

static NEXT_VALUE_ID: AtomicU64 = AtomicU64::new(1);

/// 新しい値IDを採番する
///
/// IDは単調増加で、破棄された値のIDを再利用しません。ハンドルのアドレスを
/// 識別子として使い回すと、解放と再確保で別の値が同じ識別子を持ってしまう
/// ためです。
fn next_value_id() -> ValueId {
    NEXT_VALUE_ID.fetch_add(1, Ordering::Relaxed)
}

/// 子やポインタ経由の値をどこまで先読みして配線するか
const MAX_WIRE_DEPTH: usize = 3;

/// 作成時点のメモリ内容を写し取った不変の値
///
/// ターゲットの状態が後から変わっても、既存の値は変化しません。最新の
/// 状態が必要な場合は式を評価し直して新しい値を得ます。
#[derive(Debug, Clone)]
pub struct SimValue {
    id: ValueId,
    name: String,
    type_info: TypeInfo,
    bytes: Vec<u8>,
    address: Option<u64>,
    children: Vec<SimValue>,
    address_of: Option<Box<SimValue>>,
    dereference: Option<Box<SimValue>>,
    dynamic: Option<Box<SimValue>>,
    error: Option<String>,
}

impl SimValue {
    /// メモリ上にない値（リテラルや計算結果）を作る
    pub fn new(name: &str, type_info: TypeInfo, bytes: Vec<u8>) -> Self {
        Self {
            id: next_value_id(),
            name: name.to_string(),
            type_info,
            bytes,
            address: None,
            children: Vec::new(),
            address_of: None,
            dereference: None,
            dynamic: None,
            error: None,
        }
    }

    /// メモリ上のアドレスから値を構築する
    ///
    /// 作成時点のメモリ内容をスナップショットし、型に応じて子・デリファレンス
    /// 結果・動的型で見た値をあらかじめ配線します。`dynamic_types`はオブジェクトの
    /// 先頭アドレスから実行時型への表です。
    pub fn from_memory(
        name: &str,
        type_info: TypeInfo,
        address: u64,
        memory: &TargetMemory,
        dynamic_types: &HashMap<u64, TypeInfo>,
    ) -> Self {
        Self::materialize(name, type_info, address, memory, dynamic_types, MAX_WIRE_DEPTH)
    }

    fn materialize(
        name: &str,
        type_info: TypeInfo,
        address: u64,
        memory: &TargetMemory,
        dynamic_types: &HashMap<u64, TypeInfo>,
        depth: usize,
    ) -> Self {
        let size = type_info.byte_size();
        let bytes = match memory.read(address, size) {
            Ok(bytes) if bytes.len() == size => bytes,
            Ok(_) | Err(_) => {
                let mut value = Self::new(name, type_info, Vec::new());
                value.address = Some(address);
                value.error = Some(format!("failed to read {} bytes at 0x{:x}", size, address));
                return value;
            }
        };

        let mut value = Self::new(name, type_info, bytes);
        value.address = Some(address);
        if depth == 0 {
            return value;
        }

        match value.type_info.clone() {
            TypeInfo::Class { fields, .. } => {
                for field in &fields {
                    value.children.push(Self::materialize(
                        &field.name,
                        field.type_info.clone(),
                        address + field.offset as u64,
                        memory,
                        dynamic_types,
                        depth - 1,
                    ));
                }
            }
            TypeInfo::Array {
                element: Some(element),
                length: Some(length),
            } => {
                let element_size = element.byte_size();
                for index in 0..length {
                    value.children.push(Self::materialize(
                        &format!("[{}]", index),
                        (*element).clone(),
                        address + (index * element_size) as u64,
                        memory,
                        dynamic_types,
                        depth - 1,
                    ));
                }
            }
            TypeInfo::Pointer {
                pointee: Some(pointee),
                ..
            } => {
                let target = value.as_unsigned();
                if target != 0 {
                    value.dereference = Some(Box::new(Self::materialize(
                        &format!("*{}", name),
                        (*pointee).clone(),
                        target,
                        memory,
                        dynamic_types,
                        depth - 1,
                    )));
                    if pointee.is_polymorphic_class() {
                        if let Some(derived) = dynamic_types.get(&target) {
                            value.dynamic = Some(Box::new(Self::as_derived_pointer(
                                name,
                                derived,
                                &value,
                                target,
                                memory,
                                dynamic_types,
                                depth - 1,
                            )));
                        }
                    }
                }
            }
            _ => {}
        }

        // 「アドレスを取る」操作に応える合成ポインタ。ポインタ自体はメモリ上に
        // 存在しないため、アドレスは持たない
        let mut address_of = Self::new(
            &format!("&{}", name),
            TypeInfo::Pointer {
                pointee: Some(Box::new(value.type_info.clone())),
                size: 8,
            },
            address.to_le_bytes().to_vec(),
        );
        if value.type_info.is_polymorphic_class() {
            if let Some(derived) = dynamic_types.get(&address) {
                address_of.dynamic = Some(Box::new(Self::as_derived_pointer(
                    &format!("&{}", name),
                    derived,
                    &address_of,
                    address,
                    memory,
                    dynamic_types,
                    depth - 1,
                )));
            }
        }
        value.address_of = Some(Box::new(address_of));

        value
    }

    /// ポインタ値を、指す先の実行時型で見たポインタに読み替える
    fn as_derived_pointer(
        name: &str,
        derived: &TypeInfo,
        pointer: &SimValue,
        target: u64,
        memory: &TargetMemory,
        dynamic_types: &HashMap<u64, TypeInfo>,
        depth: usize,
    ) -> Self {
        let mut dynamic = Self::new(
            name,
            TypeInfo::Pointer {
                pointee: Some(Box::new(derived.clone())),
                size: 8,
            },
            pointer.bytes.clone(),
        );
        dynamic.address = pointer.address;
        dynamic.dereference = Some(Box::new(Self::materialize(
            &format!("*{}", name),
            derived.clone(),
            target,
            memory,
            dynamic_types,
            depth,
        )));
        dynamic
    }

    /// この値のID
    pub fn id(&self) -> ValueId {
        self.id
    }

    /// スナップショットされた生のバイト列
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    pub fn boxed(self) -> Box<dyn RemoteValue> {
        Box::new(self)
    }
}

impl RemoteValue for SimValue {
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
        self.children.get(index).map(|child| child.clone().boxed())
    }

    fn as_unsigned(&self) -> u64 {
        let mut buf = [0u8; 8];
        let len = self.bytes.len().min(8);
        buf[..len].copy_from_slice(&self.bytes[..len]);
        u64::from_le_bytes(buf)
    }

    fn load_address(&self) -> Option<u64> {
        self.address
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
