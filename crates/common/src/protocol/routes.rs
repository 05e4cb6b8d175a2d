// HTTP route constants for the gitseal daemon.

pub const PREFIX: &str = "/git-lock-sign";

// ── Lifecycle ──────────────────────────────────────────────────────
pub const LOCK_NOTEBOOK: &str = "/git-lock-sign/lock-notebook";
pub const UNLOCK_NOTEBOOK: &str = "/git-lock-sign/unlock-notebook";
pub const COMMIT_NOTEBOOK: &str = "/git-lock-sign/commit-notebook";
pub const REMOVE_SIGNATURE: &str = "/git-lock-sign/remove-signature";

// ── Inspection ─────────────────────────────────────────────────────
pub const NOTEBOOK_STATUS: &str = "/git-lock-sign/notebook-status";
pub const REPOSITORY_STATUS: &str = "/git-lock-sign/repository-status";
pub const USER_INFO: &str = "/git-lock-sign/user-info";

pub const HEALTHZ: &str = "/healthz";

/// Every route the daemon serves.
pub const ALL_ROUTES: &[&str] = &[
    LOCK_NOTEBOOK,
    UNLOCK_NOTEBOOK,
    COMMIT_NOTEBOOK,
    REMOVE_SIGNATURE,
    NOTEBOOK_STATUS,
    REPOSITORY_STATUS,
    USER_INFO,
    HEALTHZ,
];
