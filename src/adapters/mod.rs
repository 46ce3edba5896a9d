// 外部系統的實作：oracle 的 HTTP 用戶端
pub mod http;

pub use http::{HttpCleanupOracle, HttpPlacesOracle};
