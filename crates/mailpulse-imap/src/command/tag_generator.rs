//! Fixed cyclic command tags.
//!
//! A monitor connection only ever issues five kinds of command, so each kind
//! owns one position on a fixed tag cycle. A tagged completion is matched to
//! the command that produced it by its position alone, with no queue of
//! pending commands.

/// Role of a command on the monitor connection, in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTag {
    /// T1: `SELECT INBOX` or `CLOSE`, issued with the startup batch.
    Prepare,
    /// T2: `NOTIFY SET`.
    Notify,
    /// T3: `NOOP` keepalive.
    Keepalive,
    /// T4: `SELECT INBOX` before falling back to IDLE.
    Select,
    /// T5: `IDLE`.
    Idle,
}

impl CommandTag {
    /// All roles in cycle order.
    pub const ALL: [Self; 5] = [
        Self::Prepare,
        Self::Notify,
        Self::Keepalive,
        Self::Select,
        Self::Idle,
    ];

    /// Position of this role on the cycle (1-based).
    #[must_use]
    pub const fn position(self) -> u32 {
        match self {
            Self::Prepare => 1,
            Self::Notify => 2,
            Self::Keepalive => 3,
            Self::Select => 4,
            Self::Idle => 5,
        }
    }

    fn from_position(position: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.position() == position)
    }
}

/// Tag issuer for one monitor connection.
///
/// Generates tags in the format "N0001" … "N0005" and remembers which one
/// was issued last.
#[derive(Debug, Clone)]
pub struct TagCycle {
    prefix: char,
    current: Option<CommandTag>,
}

impl TagCycle {
    /// Creates a tag cycle with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            prefix,
            current: None,
        }
    }

    /// Renders the wire tag for a role without issuing it.
    #[must_use]
    pub fn tag(&self, role: CommandTag) -> String {
        format!("{}{:04}", self.prefix, role.position())
    }

    /// Issues the tag for a role, making it the current one.
    pub fn issue(&mut self, role: CommandTag) -> String {
        self.current = Some(role);
        self.tag(role)
    }

    /// The most recently issued role.
    #[must_use]
    pub const fn current(&self) -> Option<CommandTag> {
        self.current
    }

    /// Resolves a wire tag back to its role.
    ///
    /// Returns `None` for tags that do not belong to this cycle.
    #[must_use]
    pub fn parse(&self, tag: &str) -> Option<CommandTag> {
        let digits = tag.strip_prefix(self.prefix)?;
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        CommandTag::from_position(digits.parse().ok()?)
    }
}

impl Default for TagCycle {
    fn default() -> Self {
        Self::new('N')
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_format() {
        let cycle = TagCycle::default();
        assert_eq!(cycle.tag(CommandTag::Prepare), "N0001");
        assert_eq!(cycle.tag(CommandTag::Notify), "N0002");
        assert_eq!(cycle.tag(CommandTag::Idle), "N0005");
    }

    #[test]
    fn test_custom_prefix() {
        let cycle = TagCycle::new('X');
        assert_eq!(cycle.tag(CommandTag::Keepalive), "X0003");
    }

    #[test]
    fn test_positions_cycle_in_order() {
        let positions: Vec<u32> = CommandTag::ALL.iter().map(|t| t.position()).collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_issue_tracks_current() {
        let mut cycle = TagCycle::default();
        assert_eq!(cycle.current(), None);

        assert_eq!(cycle.issue(CommandTag::Prepare), "N0001");
        assert_eq!(cycle.issue(CommandTag::Notify), "N0002");
        assert_eq!(cycle.current(), Some(CommandTag::Notify));
    }

    #[test]
    fn test_parse_round_trip() {
        let cycle = TagCycle::default();
        for role in CommandTag::ALL {
            assert_eq!(cycle.parse(&cycle.tag(role)), Some(role));
        }
    }

    #[test]
    fn test_parse_rejects_foreign_tags() {
        let cycle = TagCycle::default();
        assert_eq!(cycle.parse("A0001"), None);
        assert_eq!(cycle.parse("N0006"), None);
        assert_eq!(cycle.parse("N0000"), None);
        assert_eq!(cycle.parse("N1"), None);
        assert_eq!(cycle.parse("N00x1"), None);
        assert_eq!(cycle.parse("*"), None);
    }
}
