//! 二手市场即时会话核心领域模型
//!
//! 包含会话、消息两个核心实体，以及撤回/已读状态机、领域事件和
//! 对外部协作方（用户、商品）的只读契约。

pub mod conversation;
pub mod directory;
pub mod errors;
pub mod events;
pub mod message;
pub mod value_objects;

// 重新导出常用类型
pub use conversation::*;
pub use directory::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use value_objects::*;
