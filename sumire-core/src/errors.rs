//! エラーメッセージ定数
//!
//! 可視化レイヤがそのまま表示する、ソフト失敗の診断文字列です。

/// アドレスが0（ヌル）だった場合の表示
pub const ERR_NULL_ADDRESS: &str = "<NULL>";

/// アドレスが無効値だった場合の表示
pub const ERR_INVALID_ADDRESS: &str = "<invalid>";

/// 文字列として読める型でなかった場合の表示
pub const ERR_NOT_STRING_LIKE: &str = "<type must be pointer or array>";
