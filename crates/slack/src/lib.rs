//! Slash-command dispatcher for the good-point ledger.
//!
//! This crate owns everything between an already-decoded Slack slash command
//! and the ledger service behind it:
//! - **Commands** (`commands`) - payload normalization, mention/reason
//!   extraction, routing over the closed set of point commands
//! - **Messages** (`messages`) - the textual replies posted back in channel
//!
//! The ledger itself is reached through the [`commands::PointCommandService`]
//! trait; the server crate provides the production implementation.

pub mod commands;
pub mod messages;
