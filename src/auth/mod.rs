// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Caller Identity
//!
//! The wallet service sits behind the session layer of the main backend,
//! which authenticates users and forwards their identity in headers:
//!
//! - `X-User-Id`: integer user id (required on every `/v1` route)
//! - `X-User-Role`: `admin` for operators (optional, defaults to `user`)
//!
//! Missing or malformed identity is rejected with 401; admin routes reject
//! other roles with 403.

pub mod error;
pub mod extractor;
pub mod roles;

pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, Caller, USER_ID_HEADER, USER_ROLE_HEADER};
pub use roles::Role;
