//! wikinorm: wikilink normalization for Markdown vaults
//!
//! This crate keeps `[[wikilinks]]` pointing at the exact casing of the
//! documents they name, and can add display text while typing or for links
//! to notes that do not exist yet.
//!
//! # Overview
//!
//! - **Filename index**: case-insensitive basename lookup, rebuilt lazily
//!   after documents are created, deleted or renamed
//! - **Normalizer**: computes bottom-to-top link replacements and applies
//!   them to a live buffer or to a text snapshot
//! - **Display text writer**: turns a `|` typed before `]]` into `|display`
//!
//! # Architecture
//!
//! - [`vault`]: documents on disk, their link cache and the [`vault::DocumentStore`] seam
//! - [`normalizer`]: per-link decisions, replacement application and the vault pass
//! - [`workspace`]: an open document, commands and change notifications
//! - [`config`]: settings
//!
//! # Usage
//!
//! ```ignore
//! use wikinorm::config::Settings;
//! use wikinorm::normalizer::Normalizer;
//! use wikinorm::vault::Vault;
//!
//! let settings = Settings::new(&vault_path)?;
//! let vault = Vault::construct_vault(&vault_path)?;
//! let summary = Normalizer::new().normalize_all(&vault, &settings).await;
//! ```

// Core modules
pub mod index;
pub mod normalizer;
pub mod vault;

// Editing
pub mod commands;
pub mod display_text;
pub mod editor;
pub mod workspace;

// Configuration and utilities
pub mod config;
pub mod offsets;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
