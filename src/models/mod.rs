// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod identity;
pub mod profile;
pub mod session;

pub use identity::Identity;
pub use profile::{NewProfile, Profile, Role};
pub use session::{Session, SessionEvent, SessionEventKind};
