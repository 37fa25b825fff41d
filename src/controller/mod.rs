pub mod enhanced;
pub mod item;
pub mod menu;

pub use enhanced::{can_move, has_error, reorder_chain, ChainView, LogEntry, RuntimeLogs};
pub use item::{EditorKind, ItemEvent, ItemState, ProfileItemController};
pub use menu::{menu_for, MenuAction};
