//! シミュレートされたスレッドとスタックフレーム

use sumire_core::{DebugThread, FrameId, StackFrame, ThreadId};

use crate::Result;

/// スタックフレーム
#[derive(Debug, Clone)]
pub struct SimFrame {
    id: FrameId,
    function: String,
}

impl SimFrame {
    pub fn new(id: FrameId, function: &str) -> Self {
        Self {
            id,
            function: function.to_string(),
        }
    }
}

impl StackFrame for SimFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn function_name(&self) -> &str {
        &self.function
    }
}

/// 停止中のスレッド
///
/// フレームの選択状態を持ちます。先頭のフレームが最初から選択されています。
pub struct SimThread {
    id: ThreadId,
    frames: Vec<SimFrame>,
    selected: Option<usize>,
}

impl SimThread {
    pub fn new(id: ThreadId, frames: Vec<SimFrame>) -> Self {
        let selected = if frames.is_empty() { None } else { Some(0) };
        Self {
            id,
            frames,
            selected,
        }
    }

    /// スタック上のフレーム一覧（呼び出され側が先頭）
    pub fn frames(&self) -> &[SimFrame] {
        &self.frames
    }

    /// フレームを選択する
    pub fn select_frame(&mut self, index: usize) -> Result<()> {
        if index >= self.frames.len() {
            return Err(anyhow::anyhow!(
                "no frame with index {} (thread has {} frames)",
                index,
                self.frames.len()
            ));
        }
        self.selected = Some(index);
        Ok(())
    }

    /// 選択中のフレームのインデックス
    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }
}

impl DebugThread for SimThread {
    fn id(&self) -> ThreadId {
        self.id
    }

    fn selected_frame(&self) -> Option<Box<dyn StackFrame>> {
        self.selected
            .and_then(|index| self.frames.get(index))
            .cloned()
            .map(|frame| Box::new(frame) as Box<dyn StackFrame>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_is_selected_by_default() {
        let thread = SimThread::new(
            1,
            vec![SimFrame::new(0, "helper"), SimFrame::new(1, "main")],
        );
        let frame = thread.selected_frame().expect("selected frame");
        assert_eq!(frame.function_name(), "helper");
    }

    #[test]
    fn test_select_frame() {
        let mut thread = SimThread::new(
            1,
            vec![SimFrame::new(0, "helper"), SimFrame::new(1, "main")],
        );
        thread.select_frame(1).unwrap();
        let frame = thread.selected_frame().expect("selected frame");
        assert_eq!(frame.function_name(), "main");
        assert_eq!(frame.id(), 1);

        assert!(thread.select_frame(2).is_err());
        // 失敗した選択は状態を変えない
        assert_eq!(thread.selected_index(), Some(1));
    }

    #[test]
    fn test_thread_without_frames_has_no_selection() {
        let thread = SimThread::new(7, Vec::new());
        assert!(thread.selected_frame().is_none());
        assert_eq!(thread.id(), 7);
    }
}
