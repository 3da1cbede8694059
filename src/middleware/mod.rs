// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (session pre-filter).

pub mod auth;

pub use auth::require_session;
