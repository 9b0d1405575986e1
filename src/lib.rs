//! # Data-Flow Graph Compiler Core
//!
//! Compiles a Horn-clause-based declarative module into an optimized
//! data-flow graph (DFG): arenas of typed views connected by column-level
//! use edges, ready for a downstream execution engine to schedule.
//!
//! ## Pipeline
//!
//! ```text
//! Module (AST)
//!     │
//! [builder]        one clause at a time → per-clause view chain
//!     │
//! [connector]      wires relation/io SELECTs to their INSERT producers
//!     │
//! [canonicalize]   ┐
//! [optimize::cse]  │ fixpoint (§2 stage 4)
//! [optimize::dead_flow] ┘
//!     │
//! [induction]      classifies inductive MERGE sets
//!     │
//! [differential]   classifies can_receive/produce_deletions
//!     │
//! [finalize]       relabels column ids, freezes into a FinalizedDfg
//! ```
//!
//! [`pipeline::compile_module`] drives the whole sequence; most callers
//! should start there rather than calling individual stages.

pub mod arena;
pub mod ast;
pub mod builder;
pub mod canonicalize;
pub mod column;
pub mod condition;
pub mod config;
pub mod connector;
pub mod differential;
pub mod dfg;
pub mod error;
pub mod finalize;
pub mod induction;
pub mod optimize;
pub mod pipeline;
pub mod relation;
pub mod view;

pub use config::CompilerConfig;
pub use dfg::Dfg;
pub use error::{CoreError, CoreResult, Diagnostic, Diagnostics};
pub use finalize::FinalizedDfg;
pub use pipeline::compile_module;
