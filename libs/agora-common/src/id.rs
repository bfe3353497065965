use ulid::Ulid;

/// Mint a `<prefix>_<ULID>` identifier.
///
/// Prefixed string IDs are used for the low-volume entities someone might
/// paste into a support ticket; high-volume rows use snowflakes instead.
///
/// # Examples
/// ```
/// let id = agora_common::id::prefixed_ulid(agora_common::id::prefix::USER);
/// assert!(id.starts_with("usr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{prefix}_{}", Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const COMMUNITY: &str = "com";
    pub const ROOM: &str = "room";
    pub const CONNECTION: &str = "conn";
}
