//! Census tracts around a point of interest, annotated with an ACS table.
//!
//! The selection stage loads tract boundaries through a [`getter::Getter`],
//! keeps the tracts within a radius of a reference point
//! ([`selector::select_tracts`]) and writes them out. The annotation stage
//! reads that file back, fetches the table with [`annotator::AcsClient`] and
//! joins it on GEOID.

pub mod annotator;
pub mod cli;
pub mod config;
pub mod error;
pub mod getter;
pub mod map;
pub mod output;
pub mod selector;
pub mod tiger;
pub mod tract;

pub use error::{Error, Result};
