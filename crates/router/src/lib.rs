// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rosey-router: Dispatch of platform commands to plugin subjects.
//!
//! The router sits between the platform connectors and the plugins. Inbound
//! envelopes on `rosey.platform.<p>.{message,command}` are normalized into a
//! command invocation, matched against explicit route rules (by priority,
//! then insertion order) and the registry's command index, and re-published
//! on the winning destination subject. Unmatched commands produce exactly
//! one `command.unhandled` event.

mod command;
mod rule;
mod router;

pub use command::CommandInvocation;
pub use router::{CommandResolver, CommandRouter, DispatchOutcome, RouterError};
pub use rule::{MatchType, RouteRule};
