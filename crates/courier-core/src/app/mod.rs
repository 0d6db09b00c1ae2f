//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Submitter**: リクエストの受付（検証して request topic へ publish）
//! - **ConsumerHandle**: request topic ごとのポーリングループ（poll→dispatch→commit）
//! - **Dispatcher**: レコード 1 件を検証してハンドラへ渡す
//! - **Correlator**: response topic を request_id で突き合わせる

pub mod builder;
pub mod config;
pub mod consumer;
pub mod correlate;
pub mod dispatch;
pub mod envelope_factory;
pub mod producer;
pub mod router;
pub mod service;
pub mod submit;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::config::{Config, ConfigError, RouteConfig};
pub use self::consumer::{ConsumerHandle, ConsumerSettings, ConsumerState};
pub use self::correlate::{CorrelateError, Correlator, DEFAULT_UNCLAIMED_CAPACITY};
pub use self::dispatch::{Dispatched, Dispatcher};
pub use self::envelope_factory::EnvelopeFactory;
pub use self::producer::Producer;
pub use self::router::TopicRouter;
pub use self::service::{ConsumerInfo, ServiceHandle};
pub use self::submit::{Accepted, SubmitError, Submitter};
