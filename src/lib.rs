//! cis-QTL mapping across subgroups: per-subgroup linear regressions,
//! Bayesian meta-analysis of the standardized effects with approximate Bayes
//! factors, and feature-level permutation p-values.

pub mod abf;
pub mod association;
pub mod cis;
pub mod config;
pub mod configs;
pub mod error;
pub mod grid;
pub mod input;
pub mod model;
pub mod output;
pub mod permutation;
pub mod pipeline;
pub mod qnorm;
pub mod regression;
pub mod standardize;

pub use error::{BmaError, Result};
