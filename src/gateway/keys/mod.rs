//! 凭证租赁 HTTP 接口。
//!
//! - `GET /get?service=...`：借出一个可用凭证（无可用凭证时 204）
//! - `POST /set?service=...`：归还凭证并回报 remaining/reset
//! - `GET /stats`：各 service 的池状态

pub mod handler;

pub use handler::*;
