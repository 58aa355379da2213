//! Azure Resource Manager interaction module
//!
//! This module provides authentication, the HTTP client and the ARM client
//! that backs the resource discovery engine.
//!
//! # Module Structure
//!
//! - [`auth`] - Token providers (static token, `azure_identity` default chain) with caching
//! - [`client`] - Main ARM client implementing [`crate::resource::ResourceBackend`]
//! - [`cloud`] - Sovereign cloud endpoints
//! - [`http`] - HTTP utilities for REST API calls
//!
//! # Example
//!
//! ```ignore
//! use azlist::azure::{auth::AzureCredentials, client::ArmClient, cloud::CloudEnvironment};
//!
//! fn example() -> anyhow::Result<()> {
//!     let cloud = CloudEnvironment::Public;
//!     let credentials = AzureCredentials::from_env(cloud)?;
//!     let client = ArmClient::new("00000000-0000-0000-0000-000000000000", credentials, cloud)?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod cloud;
pub mod http;
