//! Resources managed by the provider.

pub mod cloud_account;
