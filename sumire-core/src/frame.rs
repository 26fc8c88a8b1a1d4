//! フレーム・スレッドポート

/// フレームID
pub type FrameId = u64;

/// スレッドID
pub type ThreadId = u64;

/// スタックフレームへのハンドル
pub trait StackFrame {
    /// フレームIDを取得する
    fn id(&self) -> FrameId;

    /// フレームの関数名を取得する
    fn function_name(&self) -> &str;
}

/// デバッグ対象のスレッドへのハンドル
pub trait DebugThread {
    /// スレッドIDを取得する
    fn id(&self) -> ThreadId;

    /// 現在選択中のフレームを取得する
    fn selected_frame(&self) -> Option<Box<dyn StackFrame>>;
}
