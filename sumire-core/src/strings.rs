//! リモート文字列読み取り機能
//!
//! ポインタまたは固定幅文字の配列として解釈した値から、ゼロのコードユニットで
//! 終端される最短のバイト列を、呼び出し側の上限までリモートメモリから抽出します。

use crate::value::{RemoteValue, INVALID_ADDRESS};
use crate::Result;
use tracing::debug;

/// リモートプロセスメモリ読み取りポート
pub trait MemoryReader {
    /// 指定アドレスから最大lengthバイトを読み取る
    ///
    /// マップ境界などで、要求より短いデータが返ることがあります。
    /// 要求を超える長さを返してはいけません。
    fn read(&self, address: u64, length: usize) -> Result<Vec<u8>>;
}

/// 文字列読み取りのチャンクポリシー
///
/// リモートプロセスへの往復回数を抑えるための設定です。転送のレイテンシに
/// 応じて調整できます。
#[derive(Debug, Clone)]
pub struct StringReadConfig {
    /// 最初のチャンクサイズ（バイト）
    pub initial_chunk: usize,
    /// チャンクサイズの上限（バイト）
    pub max_chunk: usize,
    /// 終端が見つからなかった場合のチャンクの成長倍率
    pub growth_factor: usize,
}

impl Default for StringReadConfig {
    fn default() -> Self {
        Self {
            initial_chunk: 64,
            max_chunk: 64 * 1024,
            growth_factor: 2,
        }
    }
}

/// 文字列読み取りのソフト失敗
///
/// 表示文字列は、そのまま可視化レイヤに診断テキストとして渡せる形式です。
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringReadError {
    /// アドレスが0（ヌル）だった
    #[error("{}", crate::errors::ERR_NULL_ADDRESS)]
    NullAddress,
    /// アドレスが無効値だった（配列がメモリ上にない場合を含む）
    #[error("{}", crate::errors::ERR_INVALID_ADDRESS)]
    InvalidAddress,
    /// ポインタでも配列でもない型だった
    #[error("{}", crate::errors::ERR_NOT_STRING_LIKE)]
    NotStringLike,
}

/// リモート文字列リーダー
pub struct StringReader<'a> {
    memory: &'a dyn MemoryReader,
    config: StringReadConfig,
}

impl<'a> StringReader<'a> {
    /// デフォルトのチャンクポリシーでリーダーを作成する
    pub fn new(memory: &'a dyn MemoryReader) -> Self {
        Self {
            memory,
            config: StringReadConfig::default(),
        }
    }

    /// チャンクポリシーを指定してリーダーを作成する
    pub fn with_config(memory: &'a dyn MemoryReader, config: StringReadConfig) -> Self {
        Self { memory, config }
    }

    /// 値が指す文字列をバイト列として読み取る
    ///
    /// `char_width`は1コードユニットのバイト数（1、2、4のいずれか）で、それ以外は
    /// 呼び出し側のバグとしてパニックします。`max_chars`は読み取るコードユニット数の
    /// 上限です。終端のゼロユニットは結果に含まれません。
    ///
    /// 読み取りが途中で失敗した場合はエラーにせず、そこまでのデータを返します。
    pub fn read_string(
        &self,
        value: &dyn RemoteValue,
        char_width: usize,
        max_chars: u32,
    ) -> std::result::Result<Vec<u8>, StringReadError> {
        assert!(
            char_width == 1 || char_width == 2 || char_width == 4,
            "char width must be 1, 2, or 4 (got {})",
            char_width
        );

        // 文字列の先頭アドレスの決め方はポインタと配列で異なる
        let type_info = value.type_info();
        let (address, cap) = if type_info.is_pointer() {
            (value.as_unsigned(), max_chars as usize)
        } else if type_info.is_array() {
            if value.num_children() == 0 {
                // 長さ0の文字配列。静的なバイトサイズは0にならないため、子の数で判定する
                return Ok(Vec::new());
            }
            let address = match value.load_address() {
                Some(address) => address,
                None => return Err(StringReadError::InvalidAddress),
            };
            // 配列はヌル終端を持つとは限らないため、読み取り量を配列のサイズで抑える
            (address, (max_chars as usize).min(value.byte_size()))
        } else {
            return Err(StringReadError::NotStringLike);
        };

        if address == 0 {
            return Err(StringReadError::NullAddress);
        }
        if address == INVALID_ADDRESS {
            return Err(StringReadError::InvalidAddress);
        }

        // 短い文字列は1回の小さな読み取りで済ませつつ、長い文字列でも往復回数が
        // 嵩まないよう、チャンクサイズを上限まで成長させながら読み進める
        let mut data = Vec::new();
        let mut address = address;
        let mut remaining = cap * char_width;
        let mut chunk = self.config.initial_chunk;

        while remaining > 0 {
            let to_read = chunk.min(remaining);
            debug!("reading {} bytes at 0x{:x}", to_read, address);

            let received = match self.memory.read(address, to_read) {
                Ok(bytes) => bytes,
                // 読み取り失敗は部分読み取りと同じ扱いで打ち切り、ここまでのデータを返す
                Err(_) => Vec::new(),
            };

            let prev_len = data.len();
            data.extend_from_slice(&received);
            address += received.len() as u64;
            remaining -= received.len();

            // 新しく読んだ分だけをコードユニット単位で走査する
            let scanned = scan_terminator(&data[prev_len..], char_width);
            if scanned < to_read {
                // 終端が見つかったか、読み取りが部分的だった。どちらもここで打ち切る
                data.truncate(prev_len + scanned);
                break;
            }

            chunk = (chunk * self.config.growth_factor).min(self.config.max_chunk);
        }

        Ok(data)
    }
}

/// バイト列の先頭から、最初の全ゼロのコードユニットまでのバイト数を返す
///
/// 終端が見つからない場合は、走査できた完全なユニット分のバイト数を返します。
fn scan_terminator(bytes: &[u8], char_width: usize) -> usize {
    let mut offset = 0;
    while offset + char_width <= bytes.len() {
        if bytes[offset..offset + char_width].iter().all(|b| *b == 0) {
            return offset;
        }
        offset += char_width;
    }
    offset
}

/// 読み取ったバイト列を、コードユニット幅に従って表示用の文字列に変換する
///
/// 不正なシーケンスはU+FFFDに置き換えます。
pub fn decode_code_units(bytes: &[u8], char_width: usize) -> String {
    assert!(
        char_width == 1 || char_width == 2 || char_width == 4,
        "char width must be 1, 2, or 4 (got {})",
        char_width
    );

    match char_width {
        1 => String::from_utf8_lossy(bytes).into_owned(),
        2 => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            char::decode_utf16(units)
                .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        _ => bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .map(|u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect(),
    }
}
