//! Permission vocabulary and the acting identity.
//!
//! Permission strings are `${domain}:${action}` or `${domain}:${action}-self`,
//! where the domain may itself contain colons (`treasury:budgets:update`).
//! `*` grants everything. Strings are parsed once per request into a typed
//! [`PermissionSet`] carried by the [`Actor`].

mod gate;
mod resolve;

pub use gate::{can_access, require_entity_action, require_permission, require_permission_or_self};
pub use resolve::resolve_actor;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{PortalError, Result};

const SELF_SUFFIX: &str = "-self";
const WILDCARD: &str = "*";

/// Verb part of a permission string.
///
/// Link operations only ever check `read`, `create`, `update` and `write`.
/// `delete`, `export`, `import` and `manage` appear on role rows for other
/// portal areas; they are parsed so those rows resolve instead of being
/// skipped as malformed, and they never stand in for one of the checked verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Write,
    Export,
    Import,
    Manage,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Write => "write",
            Action::Export => "export",
            Action::Import => "import",
            Action::Manage => "manage",
        }
    }
}

impl FromStr for Action {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Action::Read),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "write" => Ok(Action::Write),
            "export" => Ok(Action::Export),
            "import" => Ok(Action::Import),
            "manage" => Ok(Action::Manage),
            other => Err(PortalError::InvalidInput(format!("unknown permission action '{}'", other))),
        }
    }
}

/// Whether a permission covers every resource or only the actor's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    All,
    Own,
}

/// A single grant such as `treasury:budgets:update-self`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    domain: String,
    action: Action,
    scope: Scope,
}

impl Permission {
    pub fn new(domain: impl Into<String>, action: Action) -> Self {
        Self {
            domain: domain.into(),
            action,
            scope: Scope::All,
        }
    }

    /// The `-self` variant of this permission.
    pub fn own(mut self) -> Self {
        self.scope = Scope::Own;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Scope::All => write!(f, "{}:{}", self.domain, self.action.as_str()),
            Scope::Own => write!(f, "{}:{}{}", self.domain, self.action.as_str(), SELF_SUFFIX),
        }
    }
}

impl FromStr for Permission {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (domain, action) = s
            .rsplit_once(':')
            .filter(|(domain, _)| !domain.is_empty())
            .ok_or_else(|| PortalError::InvalidInput(format!("malformed permission '{}'", s)))?;

        let (action, scope) = match action.strip_suffix(SELF_SUFFIX) {
            Some(base) => (base, Scope::Own),
            None => (action, Scope::All),
        };

        Ok(Self {
            domain: domain.to_string(),
            action: action.parse()?,
            scope,
        })
    }
}

/// Typed permission set resolved for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    wildcard: bool,
    grants: HashSet<Permission>,
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Everything (`*`).
    pub fn all() -> Self {
        Self {
            wildcard: true,
            grants: HashSet::new(),
        }
    }

    /// Parse a list of permission strings; any malformed entry is an error.
    pub fn parse_all<S: AsRef<str>>(strings: &[S]) -> Result<Self> {
        let mut set = Self::empty();
        for s in strings {
            set.insert_str(s.as_ref())?;
        }
        Ok(set)
    }

    /// Parse one string (including `*`) into the set.
    pub fn insert_str(&mut self, s: &str) -> Result<()> {
        if s.trim() == WILDCARD {
            self.wildcard = true;
        } else {
            self.grants.insert(s.parse()?);
        }
        Ok(())
    }

    pub fn insert(&mut self, permission: Permission) {
        self.grants.insert(permission);
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn is_empty(&self) -> bool {
        !self.wildcard && self.grants.is_empty()
    }

    /// True when the set holds `permission`. A general grant also satisfies
    /// its `-self` variant.
    pub fn grants(&self, permission: &Permission) -> bool {
        if self.wildcard || self.grants.contains(permission) {
            return true;
        }
        permission.scope == Scope::Own
            && self.grants.contains(&Permission {
                scope: Scope::All,
                ..permission.clone()
            })
    }

    /// Sorted string form, for logging and API output.
    pub fn to_strings(&self) -> Vec<String> {
        let mut out: Vec<String> = self.grants.iter().map(|p| p.to_string()).collect();
        if self.wildcard {
            out.push(WILDCARD.to_string());
        }
        out.sort();
        out
    }
}

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Unauthenticated visitor with the guest permission set.
    Guest,
    /// Authenticated user.
    User(String),
}

/// The acting identity plus its permissions for the current request.
#[derive(Debug, Clone)]
pub struct Actor {
    identity: Identity,
    permissions: PermissionSet,
}

impl Actor {
    pub fn guest(permissions: PermissionSet) -> Self {
        Self {
            identity: Identity::Guest,
            permissions,
        }
    }

    pub fn user(id: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            identity: Identity::User(id.into()),
            permissions,
        }
    }

    /// User id, `None` for guests.
    pub fn id(&self) -> Option<&str> {
        match &self.identity {
            Identity::User(id) => Some(id),
            Identity::Guest => None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_guest(&self) -> bool {
        self.identity == Identity::Guest
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn can(&self, permission: &Permission) -> bool {
        self.permissions.grants(permission)
    }

    /// Label for log lines.
    pub fn label(&self) -> &str {
        self.id().unwrap_or("guest")
    }
}
