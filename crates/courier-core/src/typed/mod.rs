//! Typed - 型付きリクエスト API
//!
//! このモジュールは event_type の取り違えを型で排除し、
//! リクエスト型・成果物型・レスポンス型の対応を静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `GenerationRequest` trait, `RequestHandler<R>` - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod handler;
pub mod lazy;
pub mod registry;
pub mod request;

// 主要な trait/型 を再エクスポート
pub use self::handler::{DynHandler, Handled, HandlerContext, RequestHandler};
pub use self::lazy::LazyGenerator;
pub use self::registry::{HandlerRegistry, RegistryError};
pub use self::request::GenerationRequest;
