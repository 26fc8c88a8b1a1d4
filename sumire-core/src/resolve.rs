//! 動的型の解決
//!
//! ポリモーフィックなクラスの値を、静的型ではなく実行時の最派生型で見た
//! 値に差し替えます。解決はベストエフォートで、失敗した場合は必ず入力の
//! 値をそのまま返します。

use crate::value::RemoteValue;

/// 解決の進行状態
///
/// 状態は前進のみで、各ステップは成功して次の状態に進むか、入力を返して
/// 打ち切るかのどちらかです。
enum ResolveState {
    /// 入力をそのまま保持している
    Original,
    /// 具象ポリモーフィック値のアドレスを取得した（最後にデリファレンスで戻す）
    AddressTaken(Box<dyn RemoteValue>),
    /// 動的型で見た値に到達した
    Resolved(Box<dyn RemoteValue>),
}

/// 値を実行時の最派生型で見た値に解決する
///
/// ポインタ・参照はポインタのまま派生型のポインタになり、具象値は派生型の
/// 具象値になります。対象外の型や解決に失敗した場合は入力を返します。
/// 部分的に解決された値を返すことはありません。
pub fn resolve_dynamic_type(value: Box<dyn RemoteValue>) -> Box<dyn RemoteValue> {
    // 具象のポリモーフィック値は、いったんアドレスを取ってポインタの形にして
    // から動的型を問い合わせる。式評価の結果は慣例としてデリファレンス済みの
    // 形で返るため、この迂回が必要になる
    let state = if value.type_info().is_polymorphic_class() {
        match value.address_of() {
            Some(pointer) => ResolveState::AddressTaken(pointer),
            None => return value,
        }
    } else {
        ResolveState::Original
    };

    let resolved = {
        let shaped = match &state {
            ResolveState::Original => value.as_ref(),
            ResolveState::AddressTaken(pointer) => pointer.as_ref(),
            ResolveState::Resolved(_) => return value,
        };
        let points_to_polymorphic = shaped
            .type_info()
            .pointee()
            .map(|pointee| pointee.is_polymorphic_class())
            .unwrap_or(false);
        if shaped.type_info().is_pointer() && points_to_polymorphic {
            // ターゲットのコードは実行せず、デバッグ情報から最派生型を引く
            shaped.dynamic_value()
        } else {
            None
        }
    };

    let resolved = match resolved {
        Some(resolved) => resolved,
        None => return value,
    };

    let state = match state {
        ResolveState::Original => ResolveState::Resolved(resolved),
        // アドレス経由で来た場合は、デリファレンスして元の具象の形に戻す
        ResolveState::AddressTaken(_) => match resolved.dereference() {
            Some(object) => ResolveState::Resolved(object),
            None => return value,
        },
        ResolveState::Resolved(_) => return value,
    };

    if let ResolveState::Resolved(resolved) = state {
        resolved
    } else {
        value
    }
}
