//! REPLコマンド

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 式を評価して表示
    Print(String),
    /// 既存の値を起点に式を評価して表示
    View { base: String, expression: String },
    /// 式を型チェックのみ行う
    Compile { base: String, expression: String },
    /// 値を文字列として読み取る
    Str {
        expression: String,
        char_width: usize,
        max_chars: u32,
    },
    /// 選択中のフレームの変数一覧
    Vars,
    /// フレーム一覧
    Frames,
    /// フレームを選択
    Frame(usize),
    /// ブレークポイントサイトを設置
    Break(String),
    /// サイトの条件を設定または解除
    Condition {
        site: usize,
        expression: Option<String>,
    },
    /// サイト一覧
    Sites,
    /// サイト到達を模擬して停止判定を表示
    Hit(usize),
    /// メモリをダンプ
    Memory { address: String, length: usize },
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.trim().split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        match parts[0] {
            "print" | "p" => {
                if parts.len() > 1 {
                    Some(Command::Print(parts[1..].join(" ")))
                } else {
                    None
                }
            }
            "view" | "v" => {
                if parts.len() > 2 {
                    Some(Command::View {
                        base: parts[1].to_string(),
                        expression: parts[2..].join(" "),
                    })
                } else {
                    None
                }
            }
            "compile" => {
                if parts.len() > 2 {
                    Some(Command::Compile {
                        base: parts[1].to_string(),
                        expression: parts[2..].join(" "),
                    })
                } else {
                    None
                }
            }
            "str" => {
                if parts.len() < 2 {
                    return None;
                }
                let char_width = if parts.len() > 2 {
                    parts[2].parse().ok()?
                } else {
                    1
                };
                let max_chars = if parts.len() > 3 {
                    parts[3].parse().ok()?
                } else {
                    256
                };
                Some(Command::Str {
                    expression: parts[1].to_string(),
                    char_width,
                    max_chars,
                })
            }
            "vars" | "locals" => Some(Command::Vars),
            "frames" | "bt" => Some(Command::Frames),
            "frame" | "f" => {
                if parts.len() == 2 {
                    parts[1].parse().ok().map(Command::Frame)
                } else {
                    None
                }
            }
            "break" | "b" => {
                if parts.len() == 2 {
                    Some(Command::Break(parts[1].to_string()))
                } else {
                    None
                }
            }
            "cond" => {
                if parts.len() < 2 {
                    return None;
                }
                let site = parts[1].parse().ok()?;
                let expression = if parts.len() > 2 {
                    Some(parts[2..].join(" "))
                } else {
                    None
                };
                Some(Command::Condition { site, expression })
            }
            "sites" => Some(Command::Sites),
            "hit" => {
                if parts.len() == 2 {
                    parts[1].parse().ok().map(Command::Hit)
                } else {
                    None
                }
            }
            "mem" | "x" => {
                if parts.len() < 2 {
                    return None;
                }
                let length = if parts.len() > 2 {
                    parts[2].parse().ok()?
                } else {
                    16
                };
                Some(Command::Memory {
                    address: parts[1].to_string(),
                    length,
                })
            }
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}
