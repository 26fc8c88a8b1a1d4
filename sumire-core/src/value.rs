//! 値ポート
//!
//! デバッグ対象プロセス内に位置づけられた、型付きの値へのハンドルを定義します。
//! 具体的な実装はバックエンドクレートが提供します。

use crate::type_info::TypeInfo;

/// 値ID
///
/// バックエンドが値の生成時に単調増加カウンタから払い出す不透明なIDです。
/// ハンドルのアドレスから導出してはいけません（解放後の再利用で衝突するため）。
pub type ValueId = u64;

/// 「有効なアドレスなし」を表す番兵値。0（ヌル）とは区別されます。
pub const INVALID_ADDRESS: u64 = u64::MAX;

/// デバッグ対象プロセス内の値へのハンドル
///
/// 値は生成時点のスナップショットとして不変に扱います。解決やデリファレンスは
/// 既存の値を書き換えるのではなく、新しい値を生成します。
pub trait RemoteValue {
    /// 変数名・式名を取得する
    fn name(&self) -> &str;

    /// 型情報を取得する
    fn type_info(&self) -> &TypeInfo;

    /// 値のバイトサイズを取得する
    fn byte_size(&self) -> usize {
        self.type_info().byte_size()
    }

    /// 子の数を取得する（構造体メンバ、配列要素）
    fn num_children(&self) -> usize;

    /// 子を取得する
    fn child_at(&self, index: usize) -> Option<Box<dyn RemoteValue>>;

    /// 名前で子を検索する
    fn child_by_name(&self, name: &str) -> Option<Box<dyn RemoteValue>> {
        (0..self.num_children())
            .filter_map(|i| self.child_at(i))
            .find(|child| child.name() == name)
    }

    /// 値を符号なし整数として解釈する（ポインタならアドレス）
    fn as_unsigned(&self) -> u64;

    /// 値がメモリ上に存在する場合、そのロードアドレスを取得する
    fn load_address(&self) -> Option<u64>;

    /// この値を指すポインタ形の値を生成する。失敗（無効な結果）はNone
    fn address_of(&self) -> Option<Box<dyn RemoteValue>>;

    /// ポインタの指し先の値を生成する。失敗（無効な結果）はNone
    fn dereference(&self) -> Option<Box<dyn RemoteValue>>;

    /// 実行時型（最派生型）で見た値を生成する。失敗（無効な結果）はNone
    ///
    /// ターゲットのコードを実行せずに解決しなければなりません。
    fn dynamic_value(&self) -> Option<Box<dyn RemoteValue>>;

    /// 値に関連づけられたエラーを取得する
    fn error(&self) -> Option<&str>;
}
