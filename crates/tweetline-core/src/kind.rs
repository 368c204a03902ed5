//! Record kinds and their per-kind identity field and rename map

/// Identity field used by kinds without a profile
pub const DEFAULT_IDENTITY_FIELD: &str = "id";

/// Name prefix for kinds without a profile; keeps them apart from known kinds
pub const OTHER_PREFIX: &str = "other-";

/// A record category found in search responses.
///
/// Known kinds are resolved through [`KIND_PROFILES`]; any other list-valued
/// response group becomes `Other`, built with [`RecordKind::other`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    /// Primary entity; the only kind counted against the batch size
    Tweets,
    Users,
    Places,
    /// Holds the namespaced name, `other-<sanitized key>`
    Other(String),
}

/// Static description of a known kind
#[derive(Debug)]
pub struct KindProfile {
    /// Top-level (or nested) response key holding this kind
    pub key: &'static str,
    /// Directory and ledger file name
    pub name: &'static str,
    pub identity_field: &'static str,
    /// Raw API field → normalized column name
    pub renames: &'static [(&'static str, &'static str)],
}

/// Lookup table for the known kinds
pub static KIND_PROFILES: [(RecordKind, KindProfile); 3] = [
    (
        RecordKind::Tweets,
        KindProfile {
            key: "data",
            name: "tweets",
            identity_field: "id",
            renames: &[
                ("text", "text_orig"),
                ("author_id", "user_id"),
                ("geo.place_id", "place_id"),
                ("public_metrics.retweet_count", "retweet_count"),
                ("public_metrics.reply_count", "reply_count"),
                ("public_metrics.like_count", "like_count"),
                ("public_metrics.quote_count", "quote_count"),
            ],
        },
    ),
    (
        RecordKind::Users,
        KindProfile {
            key: "users",
            name: "users",
            identity_field: "id",
            renames: &[
                ("username", "handle"),
                ("public_metrics.followers_count", "followers_count"),
                ("public_metrics.following_count", "following_count"),
                ("public_metrics.tweet_count", "tweet_count"),
            ],
        },
    ),
    (
        RecordKind::Places,
        KindProfile {
            key: "places",
            name: "places",
            identity_field: "id",
            renames: &[
                ("full_name", "place_full_name"),
                ("geo.bbox", "bbox"),
                ("geo.type", "geo_type"),
            ],
        },
    ),
];

/// Kinds that carry a persisted id ledger
pub static LEDGER_KINDS: [RecordKind; 3] =
    [RecordKind::Tweets, RecordKind::Users, RecordKind::Places];

impl RecordKind {
    /// Resolve a response key (`data`, `users`, `places`) to a known kind
    pub fn from_key(key: &str) -> Option<Self> {
        KIND_PROFILES
            .iter()
            .find(|(_, p)| p.key == key)
            .map(|(k, _)| k.clone())
    }

    /// Kind for an unrecognized response group.
    ///
    /// The name is prefixed and reduced to `[A-Za-z0-9_]`, so it can never
    /// shadow a known kind's directory or ledger nor escape the session
    /// directory.
    pub fn other(key: &str) -> Self {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        Self::Other(format!("{OTHER_PREFIX}{sanitized}"))
    }

    /// Parse a kind name as used on the CLI and in directory names
    pub fn from_name(name: &str) -> Option<Self> {
        KIND_PROFILES
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(k, _)| k.clone())
    }

    pub fn profile(&self) -> Option<&'static KindProfile> {
        KIND_PROFILES
            .iter()
            .find(|(k, _)| k == self)
            .map(|(_, p)| p)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Other(name) => name,
            known => known.profile().map_or("", |p| p.name),
        }
    }

    pub fn identity_field(&self) -> &'static str {
        self.profile()
            .map_or(DEFAULT_IDENTITY_FIELD, |p| p.identity_field)
    }

    pub fn renames(&self) -> &'static [(&'static str, &'static str)] {
        match self.profile() {
            Some(p) => p.renames,
            None => &[],
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Tweets)
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_key_known() {
        assert_eq!(RecordKind::from_key("data"), Some(RecordKind::Tweets));
        assert_eq!(RecordKind::from_key("users"), Some(RecordKind::Users));
        assert_eq!(RecordKind::from_key("places"), Some(RecordKind::Places));
    }

    #[test]
    fn from_key_unknown() {
        assert_eq!(RecordKind::from_key("meta"), None);
        assert_eq!(RecordKind::from_key("tweets"), None);
        assert_eq!(RecordKind::from_key(""), None);
    }

    #[test]
    fn from_name_matches_display() {
        for kind in &LEDGER_KINDS {
            assert_eq!(RecordKind::from_name(&kind.to_string()).as_ref(), Some(kind));
        }
        assert_eq!(RecordKind::from_name("data"), None);
    }

    #[test]
    fn other_kind_uses_key_and_default_identity() {
        let kind = RecordKind::other("errors");
        assert_eq!(kind.name(), "other-errors");
        assert_eq!(kind.identity_field(), "id");
        assert!(kind.renames().is_empty());
        assert!(!kind.is_primary());
    }

    #[test]
    fn other_kind_never_collides_with_known_names() {
        for (_, profile) in &KIND_PROFILES {
            let other = RecordKind::other(profile.name);
            assert_ne!(other.name(), profile.name);
            assert_eq!(RecordKind::from_name(other.name()), None);
        }
    }

    #[test]
    fn other_kind_name_has_no_path_separators() {
        let kind = RecordKind::other("../x/y");
        assert_eq!(kind.name(), "other-___x_y");
    }

    #[test]
    fn identity_field_never_renamed() {
        for (kind, profile) in &KIND_PROFILES {
            assert!(
                profile
                    .renames
                    .iter()
                    .all(|(from, _)| *from != profile.identity_field),
                "{kind} renames its identity field"
            );
        }
    }

    #[test]
    fn only_tweets_is_primary() {
        assert!(RecordKind::Tweets.is_primary());
        assert!(!RecordKind::Users.is_primary());
        assert!(!RecordKind::Places.is_primary());
    }
}
