//! Federated (OIDC/SAML) login against a tenant-routed identity service and the
//! first call to the downstream accounts API.

pub mod accounts;
pub mod auth;
pub mod config;
