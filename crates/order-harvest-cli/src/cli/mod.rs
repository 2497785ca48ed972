// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Subcommand implementations.

pub mod doctor;
pub mod merge_cmd;
pub mod output;
pub mod run_cmd;
