use crate::accounts::Account;

/// Notification sink for the front-end: progress lines and the final result set.
pub trait AuthObserver: Send + Sync {
    fn log(&self, line: &str);

    fn display_accounts(&self, accounts: &[Account]);
}
