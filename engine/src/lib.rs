//! Engine orchestration for the Strata ledger core.
//!
//! Wires the block DAG, mempool, conflict DAG, ledgers, attestations and
//! notarization into one pipeline, and manages the tree of commitment chains
//! observed from the network.

pub mod booker;
pub mod causal_order;
pub mod chain;
pub mod chain_manager;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod notarization;
pub mod worker_pool;

pub use booker::{BookOutcome, Booker};
pub use chain::Chain;
pub use chain_manager::{ChainAction, ChainManager};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, ErrorKind, HealthStatus};
pub use events::{EngineEvent, EventBus};
pub use logging::init_tracing;
pub use notarization::NotarizationManager;
pub use worker_pool::{WorkerPool, WorkerPools};
