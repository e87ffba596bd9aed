//! # crowdq
//!
//! Lifecycle engine for crowdsourcing jobs hosted on a remote task
//! marketplace.
//!
//! A job is posted as a remote task; workers' responses arrive as
//! assignments. Two transition tables (jobs, assignments) govern every state
//! change, a progress evaluator decides when a job needs more slots or is
//! done, and every side effect is a queued task run by a [`engine::TaskWorker`].
//! Records live in Postgres (sqlx) with tasks on pgmq, or in memory.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod event;
pub mod job_type;
pub mod machine;
pub mod marketplace;
pub mod model;
pub mod progress;
pub mod queue;
pub mod store;
pub mod telemetry;
