//! 凭证租赁池（Lease Pool）模块。
//!
//! 每个 service 维护一份“当前可出借凭证 → 配额状态”的表：
//! 借出时移除条目，调用方用完后带着最新的 remaining/reset 归还，条目重新入池。
//! 没有过期清理：窗口已过的条目仍留在池中，只是重新满足可借条件。

mod manager;
mod selector;
mod types;

pub use manager::{LeasePool, ReleaseError};
pub use types::ServiceStats;
