//! Sumire シミュレートターゲット
//!
//! このクレートは、実プロセスなしで値インスペクションを動かすための参照
//! バックエンドを提供します。マップ式のメモリ、スナップショット型の値、
//! スレッドとフレーム、小さな式エンジン、ブレークポイントサイトを備え、
//! sumire-coreのポート群を実装します。

pub mod breakpoint;
pub mod engine;
pub mod memory;
pub mod thread;
pub mod value;

pub use breakpoint::{BreakpointSite, SiteId, SiteTable};
pub use engine::{SimTarget, Variable};
pub use memory::TargetMemory;
pub use thread::{SimFrame, SimThread};
pub use value::SimValue;

/// ターゲットシミュレーションの結果型
pub type Result<T> = anyhow::Result<T>;
