//! 领域模型定义

mod enums;
mod milestone;
mod progress;
mod purchase;
mod ranked;
mod wallet;

pub use enums::*;
pub use milestone::*;
pub use progress::*;
pub use purchase::*;
pub use ranked::*;
pub use wallet::*;
