//! Access control entries attached to created nodes

use shardlead_config::AclConfig;

/// Permission bits, combined with `|`
pub struct Perms;

impl Perms {
    pub const READ: u32 = 1 << 0;
    pub const WRITE: u32 = 1 << 1;
    pub const CREATE: u32 = 1 << 2;
    pub const DELETE: u32 = 1 << 3;
    pub const ADMIN: u32 = 1 << 4;
    pub const ALL: u32 = Self::READ | Self::WRITE | Self::CREATE | Self::DELETE | Self::ADMIN;
}

/// One access control entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub perms: u32,
    /// Authentication scheme, e.g. `world` or `digest`
    pub scheme: String,
    pub id: String,
}

impl Acl {
    pub fn new(perms: u32, scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            perms,
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// Everyone may do everything
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl::new(Perms::ALL, "world", "anyone")]
    }

    pub fn allows(&self, perm: u32) -> bool {
        self.perms & perm == perm
    }
}

/// Resolves the ACLs to attach when creating a node
pub trait AclProvider: Send + Sync {
    fn acls_to_add(&self, path: &str) -> Vec<Acl>;
}

/// Open ACLs for every node
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAclProvider;

impl AclProvider for OpenAclProvider {
    fn acls_to_add(&self, _path: &str) -> Vec<Acl> {
        Acl::open_unsafe()
    }
}

/// Digest-authenticated ACLs
///
/// Grants all permissions to one digest user and read permission to an
/// optional second one. Without any user configured, nodes get open ACLs.
#[derive(Debug, Clone, Default)]
pub struct DigestAclProvider {
    /// `user:digest` granted all permissions
    all: Option<String>,
    /// `user:digest` granted read permission
    readonly: Option<String>,
}

impl DigestAclProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_all_user(mut self, user: &str, digest: &str) -> Self {
        self.all = Some(Self::id(user, digest));
        self
    }

    pub fn with_readonly_user(mut self, user: &str, digest: &str) -> Self {
        self.readonly = Some(Self::id(user, digest));
        self
    }

    /// Provider described by a configuration section
    pub fn from_config(config: &AclConfig) -> Self {
        let mut provider = Self::new();
        if let (Some(user), Some(digest)) = (&config.all_user, &config.all_digest) {
            provider = provider.with_all_user(user, digest);
        }
        if let (Some(user), Some(digest)) = (&config.readonly_user, &config.readonly_digest) {
            provider = provider.with_readonly_user(user, digest);
        }
        provider
    }

    fn id(user: &str, digest: &str) -> String {
        // Accept digests given either bare or already prefixed with the user
        match digest.split_once(':') {
            Some((prefix, _)) if prefix == user => digest.to_string(),
            _ => format!("{user}:{digest}"),
        }
    }
}

impl AclProvider for DigestAclProvider {
    fn acls_to_add(&self, _path: &str) -> Vec<Acl> {
        let mut acls = Vec::new();
        if let Some(id) = &self.all {
            acls.push(Acl::new(Perms::ALL, "digest", id.clone()));
        }
        if let Some(id) = &self.readonly {
            acls.push(Acl::new(Perms::READ, "digest", id.clone()));
        }
        if acls.is_empty() {
            return Acl::open_unsafe();
        }
        acls
    }
}
