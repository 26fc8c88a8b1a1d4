//! 型情報
//!
//! バックエンドから受け取る値の型を、言語非依存のプレーンなデータとして表現します。

/// 構造体・クラスのフィールド情報
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    /// フィールド名
    pub name: String,
    /// 先頭からのオフセット（バイト）
    pub offset: usize,
    /// フィールドの型
    pub type_info: TypeInfo,
}

/// 型情報
#[derive(Debug, Clone, PartialEq)]
pub enum TypeInfo {
    /// 組み込み型
    Primitive {
        name: String,
        size: usize,
    },
    /// ポインタ型
    Pointer {
        /// 指し先の型（不完全型の場合はNone）
        pointee: Option<Box<TypeInfo>>,
        size: usize,
    },
    /// 固定長配列型
    Array {
        /// 要素の型（不明な場合はNone）
        element: Option<Box<TypeInfo>>,
        /// 要素数（不明な場合はNone）
        length: Option<usize>,
    },
    /// クラス・構造体型
    Class {
        name: String,
        size: usize,
        /// 実行時型が静的な型と異なりうるか（仮想関数を持つか）
        polymorphic: bool,
        fields: Vec<FieldInfo>,
    },
    /// 不明な型
    Unknown,
}

impl TypeInfo {
    /// 表示用の型名を取得する
    pub fn name(&self) -> String {
        match self {
            TypeInfo::Primitive { name, .. } => name.clone(),
            TypeInfo::Pointer { pointee, .. } => match pointee {
                Some(p) => format!("{} *", p.name()),
                None => "? *".to_string(),
            },
            TypeInfo::Array { element, length } => {
                let elem = element.as_ref().map(|e| e.name()).unwrap_or_else(|| "?".to_string());
                match length {
                    Some(len) => format!("{} [{}]", elem, len),
                    None => format!("{} []", elem),
                }
            }
            TypeInfo::Class { name, .. } => name.clone(),
            TypeInfo::Unknown => "?".to_string(),
        }
    }

    /// 型のサイズを取得する（バイト数、不明な場合は0）
    pub fn byte_size(&self) -> usize {
        match self {
            TypeInfo::Primitive { size, .. } => *size,
            TypeInfo::Pointer { size, .. } => *size,
            TypeInfo::Array { element, length } => {
                match (element, length) {
                    (Some(elem), Some(len)) => elem.byte_size() * len,
                    _ => 0,
                }
            }
            TypeInfo::Class { size, .. } => *size,
            TypeInfo::Unknown => 0,
        }
    }

    /// ポインタ型かどうか
    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeInfo::Pointer { .. })
    }

    /// 配列型かどうか
    pub fn is_array(&self) -> bool {
        matches!(self, TypeInfo::Array { .. })
    }

    /// ポリモーフィックなクラス型かどうか
    pub fn is_polymorphic_class(&self) -> bool {
        matches!(self, TypeInfo::Class { polymorphic: true, .. })
    }

    /// 指し先の型を取得する（ポインタと配列のみSome）
    pub fn pointee(&self) -> Option<&TypeInfo> {
        match self {
            TypeInfo::Pointer { pointee, .. } => pointee.as_deref(),
            TypeInfo::Array { element, .. } => element.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_type() -> TypeInfo {
        TypeInfo::Primitive {
            name: "char".to_string(),
            size: 1,
        }
    }

    #[test]
    fn test_pointer_classification() {
        let ptr = TypeInfo::Pointer {
            pointee: Some(Box::new(char_type())),
            size: 8,
        };

        assert!(ptr.is_pointer());
        assert!(!ptr.is_array());
        assert_eq!(ptr.name(), "char *");
        assert_eq!(ptr.byte_size(), 8);
        assert_eq!(ptr.pointee(), Some(&char_type()));
    }

    #[test]
    fn test_array_byte_size() {
        let arr = TypeInfo::Array {
            element: Some(Box::new(char_type())),
            length: Some(16),
        };

        assert!(arr.is_array());
        assert_eq!(arr.byte_size(), 16);
        assert_eq!(arr.name(), "char [16]");

        // 要素数が不明な場合はサイズも不明
        let unknown_len = TypeInfo::Array {
            element: Some(Box::new(char_type())),
            length: None,
        };
        assert_eq!(unknown_len.byte_size(), 0);
    }

    #[test]
    fn test_polymorphic_class() {
        let base = TypeInfo::Class {
            name: "Base".to_string(),
            size: 8,
            polymorphic: true,
            fields: Vec::new(),
        };
        assert!(base.is_polymorphic_class());
        assert!(!base.is_pointer());

        let plain = TypeInfo::Class {
            name: "Plain".to_string(),
            size: 4,
            polymorphic: false,
            fields: Vec::new(),
        };
        assert!(!plain.is_polymorphic_class());
    }

    #[test]
    fn test_pointee_only_for_indirect_types() {
        assert_eq!(char_type().pointee(), None);
        assert_eq!(TypeInfo::Unknown.pointee(), None);
    }
}
