//! # vocalis-entity
//!
//! Domain entity models for Vocalis. Every struct in this crate represents
//! a database table row or a domain value object. Row types derive
//! `sqlx::FromRow` and carry the `version` token used for
//! compare-and-swap writes.

pub mod audio;
pub mod conversion;
pub mod webhook;
