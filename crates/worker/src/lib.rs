pub mod context;
pub mod handler;
pub mod manager;
pub mod provider;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod test_utils;

pub use context::{Reporter, SinkReporter, TaskContext};
pub use handler::{Closeable, Handler, HandlerRegistry, Plugin, PluginRegistry, Probe};
pub use manager::WorkerManager;
pub use provider::WorkerProvider;
pub use strategy::Strategy;
pub use worker::{PeriodicWorker, Worker};
