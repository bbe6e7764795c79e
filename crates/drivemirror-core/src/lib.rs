//! drivemirror core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Principal`, `RemoteEntry`, `SyncStatus` and their newtypes
//! - **Use cases** - `AuthManager`, `StatusQuery`
//! - **Port definitions** - `ICredentialStore`, `IMetadataStore`, `IRemoteStore`,
//!   `IIdentityProvider`, `ILocalMirror`
//! - **Configuration** - YAML-backed [`config::Config`]
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! Use cases orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
