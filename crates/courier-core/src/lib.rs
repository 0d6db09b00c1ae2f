//! courier-core
//!
//! Core building blocks for the Courier generation service.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, event_type, envelope, schema, question, learning_path, errors）
//! - **ports**: 抽象化レイヤー（MessageBus, Subscription, Generator, Ledger, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, consumer, dispatch, submit, correlate, など）
//! - **typed**: 型付きリクエスト API（GenerationRequest, RequestHandler, HandlerRegistry, LazyGenerator）
//! - **impls**: 実装（InMemoryBus, InMemoryLedger など開発用）
//! - **observability**: tracing の初期化とコンシューマ統計

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;
