use ulid::Ulid;

/// Mint a fresh identifier of the form `<prefix>_<ULID>`.
///
/// ULIDs sort by creation time, so ids minted later compare greater.
///
/// # Examples
/// ```
/// let id = woods_common::id::prefixed_ulid(woods_common::id::prefix::LOBBY);
/// assert!(id.starts_with("lobby_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{prefix}_{}", Ulid::new())
}

/// Identifier prefixes, one per entity kind.
pub mod prefix {
    /// Connected client session; doubles as the player id.
    pub const PLAYER: &str = "player";
    pub const LOBBY: &str = "lobby";
    pub const GAME: &str = "game";
}
