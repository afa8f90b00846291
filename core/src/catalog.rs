//! The fixed catalogs of action identifiers and typed command names.

use crate::ids::CategoryKey;
use std::fmt;

const CLOSE_TICKET: &str = "closeTicket";
const CLAIM: &str = "ticketclaim";
const UNCLAIM: &str = "ticketunclaim";
const REOPEN: &str = "reOpen";
const DELETE_TICKET: &str = "deleteTicket";
const TRANSCRIPT: &str = "createTranscript";
const CATEGORY_MENU: &str = "categoryMenu";
const RATING_MENU: &str = "ratingMenu";

const FORM_SUFFIX: &str = "-modal";
const RATING_FORM_SUFFIX: &str = "-ratingModal";
const STAR_SUFFIX: &str = "-star";

/// Ids that category keys may not shadow.
const RESERVED: [&str; 8] = [
    CLOSE_TICKET,
    CLAIM,
    UNCLAIM,
    REOPEN,
    DELETE_TICKET,
    TRANSCRIPT,
    CATEGORY_MENU,
    RATING_MENU,
];

/// Whether `raw` is one of the fixed action ids.
#[must_use]
pub fn is_reserved(raw: &str) -> bool {
    RESERVED.contains(&raw) || raw.ends_with(FORM_SUFFIX) || raw.ends_with(RATING_FORM_SUFFIX)
}

/// A star rating between 1 and 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stars(u8);

impl Stars {
    /// Highest rating.
    pub const MAX: u8 = 5;

    /// `Some` when `value` is in `1..=5`.
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value >= 1 && value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Parse a rating menu value such as `3-star`.
    #[must_use]
    pub fn from_menu_value(raw: &str) -> Option<Self> {
        raw.strip_suffix(STAR_SUFFIX)
            .and_then(|digits| digits.parse().ok())
            .and_then(Self::new)
    }

    /// Numeric value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Menu value for this rating.
    #[must_use]
    pub fn menu_value(self) -> String {
        format!("{}{STAR_SUFFIX}", self.0)
    }

    /// `★★★☆☆`-style rendering.
    #[must_use]
    pub fn render(self) -> String {
        let filled = usize::from(self.0);
        let empty = usize::from(Self::MAX) - filled;
        format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
    }
}

impl fmt::Display for Stars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier carried by a button, menu or form submission.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionId {
    /// Close button on the intake message.
    CloseTicket,
    /// Claim button.
    Claim,
    /// Unclaim button.
    Unclaim,
    /// Reopen button on the close notice.
    Reopen,
    /// Delete button on the close notice.
    Delete,
    /// Transcript button on the close notice.
    Transcript,
    /// The category picker menu; the selected value is a category key.
    CategoryMenu,
    /// The star rating menu sent with the delete DM; the value is `N-star`.
    RatingMenu,
    /// A category picker button.
    CategoryButton(CategoryKey),
    /// Submission of a category's intake form.
    CategoryForm(CategoryKey),
    /// Submission of the feedback form for a rating.
    RatingForm(Stars),
}

impl ActionId {
    /// Classify a raw id. Anything that is not a fixed id is taken to be a category key.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            CLOSE_TICKET => Self::CloseTicket,
            CLAIM => Self::Claim,
            UNCLAIM => Self::Unclaim,
            REOPEN => Self::Reopen,
            DELETE_TICKET => Self::Delete,
            TRANSCRIPT => Self::Transcript,
            CATEGORY_MENU => Self::CategoryMenu,
            RATING_MENU => Self::RatingMenu,
            _ => {
                if let Some(stars) = raw
                    .strip_suffix(RATING_FORM_SUFFIX)
                    .and_then(|digits| digits.parse().ok())
                    .and_then(Stars::new)
                {
                    Self::RatingForm(stars)
                } else if let Some(key) = raw.strip_suffix(FORM_SUFFIX) {
                    Self::CategoryForm(CategoryKey::new(key))
                } else {
                    Self::CategoryButton(CategoryKey::new(raw))
                }
            }
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloseTicket => f.write_str(CLOSE_TICKET),
            Self::Claim => f.write_str(CLAIM),
            Self::Unclaim => f.write_str(UNCLAIM),
            Self::Reopen => f.write_str(REOPEN),
            Self::Delete => f.write_str(DELETE_TICKET),
            Self::Transcript => f.write_str(TRANSCRIPT),
            Self::CategoryMenu => f.write_str(CATEGORY_MENU),
            Self::RatingMenu => f.write_str(RATING_MENU),
            Self::CategoryButton(key) => write!(f, "{key}"),
            Self::CategoryForm(key) => write!(f, "{key}{FORM_SUFFIX}"),
            Self::RatingForm(stars) => write!(f, "{stars}{RATING_FORM_SUFFIX}"),
        }
    }
}

/// The typed command catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandName {
    /// `/claim`
    Claim,
    /// `/unclaim`
    Unclaim,
    /// `/close`
    Close,
    /// `/reopen`
    Reopen,
    /// `/delete`
    Delete,
    /// `/move`
    Move,
    /// `/remove`
    Remove,
    /// `/rename`
    Rename,
    /// `/transfer`
    Transfer,
    /// `/ping`
    Ping,
}

impl CommandName {
    /// Every command, in registration order.
    pub const ALL: [Self; 10] = [
        Self::Claim,
        Self::Unclaim,
        Self::Close,
        Self::Reopen,
        Self::Delete,
        Self::Move,
        Self::Remove,
        Self::Rename,
        Self::Transfer,
        Self::Ping,
    ];

    /// Name as typed by users.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Unclaim => "unclaim",
            Self::Close => "close",
            Self::Reopen => "reopen",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Remove => "remove",
            Self::Rename => "rename",
            Self::Transfer => "transfer",
            Self::Ping => "ping",
        }
    }

    /// Look a command up by name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == raw)
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_ids_parse_to_their_variants() {
        assert_eq!(ActionId::parse("closeTicket"), ActionId::CloseTicket);
        assert_eq!(ActionId::parse("ticketclaim"), ActionId::Claim);
        assert_eq!(ActionId::parse("reOpen"), ActionId::Reopen);
        assert_eq!(ActionId::parse("createTranscript"), ActionId::Transcript);
    }

    #[test]
    fn form_and_rating_ids() {
        assert_eq!(
            ActionId::parse("support-modal"),
            ActionId::CategoryForm(CategoryKey::new("support"))
        );
        assert_eq!(
            ActionId::parse("4-ratingModal"),
            ActionId::RatingForm(Stars(4))
        );
        // Out-of-range ratings are not rating forms.
        assert_eq!(
            ActionId::parse("9-ratingModal"),
            ActionId::CategoryButton(CategoryKey::new("9-ratingModal"))
        );
        assert_eq!(
            ActionId::parse("billing"),
            ActionId::CategoryButton(CategoryKey::new("billing"))
        );
    }

    #[test]
    fn display_is_the_wire_form() {
        for raw in ["closeTicket", "ticketunclaim", "deleteTicket", "support-modal", "2-ratingModal"] {
            assert_eq!(ActionId::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn stars_menu_values() {
        assert_eq!(Stars::from_menu_value("5-star"), Stars::new(5));
        assert_eq!(Stars::from_menu_value("0-star"), None);
        assert_eq!(Stars::from_menu_value("five-star"), None);
        assert_eq!(Stars::new(3).map(Stars::render).as_deref(), Some("★★★☆☆"));
    }

    #[test]
    fn command_names_round_trip() {
        for command in CommandName::ALL {
            assert_eq!(CommandName::parse(command.as_str()), Some(command));
        }
        assert_eq!(CommandName::parse("ban"), None);
    }
}
