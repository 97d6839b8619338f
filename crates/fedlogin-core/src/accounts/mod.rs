mod client;

pub use client::{Account, AccountsClient};
