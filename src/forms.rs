//! Flat key-value form submissions.
//!
//! Relationship pickers post repeated keys (one value per selected id), so the
//! form keeps every pair in submission order instead of collapsing to a map.

/// Declares a rendered relationship slot: `<type>` or `<type>:<maxItems>`.
pub const RELATION_SLOT_KEY: &str = "_relations";
/// Prefix of the repeated id keys of a slot: `relation:<type>`.
pub const RELATION_KEY_PREFIX: &str = "relation:";
/// Entity type of the source context a draft was opened from.
pub const SOURCE_TYPE_KEY: &str = "_sourceType";
/// Entity id of the source context a draft was opened from.
pub const SOURCE_ID_KEY: &str = "_sourceId";
/// Post-save navigation target.
pub const RETURN_URL_KEY: &str = "_returnUrl";

/// Submitted form fields in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pairs: Vec<(String, String)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` body.
    pub fn parse_urlencoded(body: &[u8]) -> Self {
        url::form_urlencoded::parse(body).into_owned().collect()
    }

    /// Builder-style append, mostly for tests and programmatic callers.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// First value submitted for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value submitted for `key`, in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `_returnUrl` when it is a local path. Absolute and protocol-relative
    /// URLs are ignored so a form cannot redirect off-site.
    pub fn return_url(&self) -> Option<&str> {
        self.get(RETURN_URL_KEY)
            .map(str::trim)
            .filter(|url| url.starts_with('/') && !url.starts_with("//") && !url.contains('\\'))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
