//! # eCRF: Clinical-Trial CRF Builder Backend
//!
//! Study administrators design case report forms as a tree of visits
//! (forms) → sections → fields. The editor submits whole subtrees; this crate
//! reconciles them against PostgreSQL atomically.
//!
//! ## Modules
//!
//! - [`identity`], [`differ`]: node identity resolution and per-parent plans
//! - [`normalize`], [`settings`], [`ordering`]: field normalization, typed
//!   settings, fractional sibling order
//! - [`structure`]: payload types and validation
//! - [`db`]: storage, including the transactional structure synchronizer
//! - [`audit`]: study edit diffing
//! - [`dashboard`]: HTTP API
//! - [`config`], [`error`], [`model`], [`prom_metrics`]

pub mod audit;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod differ;
pub mod error;
pub mod identity;
pub mod model;
pub mod normalize;
pub mod ordering;
pub mod prom_metrics;
pub mod settings;
pub mod structure;
