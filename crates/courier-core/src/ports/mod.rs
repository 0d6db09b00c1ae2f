//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（メッセージバス、言語モデル、冪等性ストア）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod bus;
pub mod clock;
pub mod generator;
pub mod id_generator;
pub mod ledger;

// 主要な trait を再エクスポート
pub use self::bus::{Ack, BusRecord, MessageBus, Subscription};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::generator::{Generator, GeneratorFactory, Prebuilt};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::ledger::{Ledger, LedgerError};
