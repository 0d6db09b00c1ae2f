//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryBus**: パーティション付きのインメモリバス
//! - **InMemoryLedger**: プロセス内の冪等性台帳
//!
//! 本番用のバス（Kafka など）は `MessageBus` を実装した別クレートに置きます。

pub mod inmem_bus;
pub mod ledger;

// 主要な型を再エクスポート
pub use self::inmem_bus::InMemoryBus;
pub use self::ledger::InMemoryLedger;
