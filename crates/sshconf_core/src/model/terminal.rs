//! Terminal entity models: keys, identities, snippets, configs, tags,
//! groups, hosts, port-forwarding rules and host-tag links.

use crate::record::Record;
use crate::schema::{Relation, SetSchema};

/// SSH key pairs.
pub static SSH_KEY: SetSchema = SetSchema::new("ssh_key", &[]);

/// Login identities, optionally bound to a key.
pub static SSH_IDENTITY: SetSchema =
    SetSchema::new("ssh_identity", &[Relation::one("ssh_key", &SSH_KEY)]);

/// Saved shell snippets.
pub static SNIPPET: SetSchema = SetSchema::new("snippet", &[]);

/// Connection settings shared by groups and hosts.
pub static SSH_CONFIG: SetSchema = SetSchema::new(
    "ssh_config",
    &[
        Relation::one("ssh_identity", &SSH_IDENTITY),
        Relation::one("startup_snippet", &SNIPPET),
    ],
);

/// Host tags.
pub static TAG: SetSchema = SetSchema::new("tag", &[]);

/// Host groups, nestable.
pub static GROUP: SetSchema = SetSchema::new(
    "group",
    &[
        Relation::one("parent_group", &GROUP),
        Relation::one("ssh_config", &SSH_CONFIG),
    ],
);

/// Hosts.
pub static HOST: SetSchema = SetSchema::new(
    "host",
    &[
        Relation::one("group", &GROUP),
        Relation::one("ssh_config", &SSH_CONFIG),
    ],
);

/// Port-forwarding rules.
pub static PF_RULE: SetSchema = SetSchema::new("pf_rule", &[Relation::one("host", &HOST)]);

/// Host-tag associations.
pub static TAG_HOST: SetSchema = SetSchema::new(
    "tag_host",
    &[Relation::one("host", &HOST), Relation::one("tag", &TAG)],
);

/// Every terminal set, in full-clean deletion order.
pub static TERMINAL_SCHEMAS: [&SetSchema; 9] = [
    &SSH_KEY,
    &SSH_IDENTITY,
    &SNIPPET,
    &SSH_CONFIG,
    &TAG,
    &GROUP,
    &HOST,
    &PF_RULE,
    &TAG_HOST,
];

model! {
    /// An SSH key pair.
    SshKey => SSH_KEY
}

impl SshKey {
    /// Creates an unsaved key.
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self(Record::new(&SSH_KEY).with("label", label))
    }

    /// Sets the private key material.
    #[must_use]
    pub fn with_private_key(mut self, private_key: &str) -> Self {
        self.0.set("private_key", private_key);
        self
    }

    /// Sets the public key material.
    #[must_use]
    pub fn with_public_key(mut self, public_key: &str) -> Self {
        self.0.set("public_key", public_key);
        self
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.0.text("label")
    }

    /// Returns the public key material.
    #[must_use]
    pub fn public_key(&self) -> Option<&str> {
        self.0.text("public_key")
    }
}

model! {
    /// A login identity.
    SshIdentity => SSH_IDENTITY
}

impl SshIdentity {
    /// Creates an unsaved identity.
    #[must_use]
    pub fn new(label: &str, username: &str) -> Self {
        Self(
            Record::new(&SSH_IDENTITY)
                .with("label", label)
                .with("username", username),
        )
    }

    /// Binds the identity to a key.
    #[must_use]
    pub fn with_ssh_key(mut self, key: SshKey) -> Self {
        self.0.attach_one("ssh_key", key.0);
        self
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.0.text("username")
    }

    /// Returns the resolved key, if loaded.
    #[must_use]
    pub fn ssh_key(&self) -> Option<&Record> {
        self.0.related("ssh_key")
    }
}

model! {
    /// A saved shell snippet.
    Snippet => SNIPPET
}

impl Snippet {
    /// Creates an unsaved snippet.
    #[must_use]
    pub fn new(label: &str, script: &str) -> Self {
        Self(
            Record::new(&SNIPPET)
                .with("label", label)
                .with("script", script),
        )
    }

    /// Returns the script body.
    #[must_use]
    pub fn script(&self) -> Option<&str> {
        self.0.text("script")
    }
}

model! {
    /// Connection settings.
    SshConfig => SSH_CONFIG
}

impl SshConfig {
    /// Creates unsaved settings with no fields set.
    #[must_use]
    pub fn new() -> Self {
        Self(Record::new(&SSH_CONFIG))
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.0.set("port", port);
        self
    }

    /// Sets the login identity.
    #[must_use]
    pub fn with_identity(mut self, identity: SshIdentity) -> Self {
        self.0.attach_one("ssh_identity", identity.0);
        self
    }

    /// Sets the snippet run after login.
    #[must_use]
    pub fn with_startup_snippet(mut self, snippet: Snippet) -> Self {
        self.0.attach_one("startup_snippet", snippet.0);
        self
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.0
            .integer("port")
            .and_then(|port| u16::try_from(port).ok())
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self::new()
    }
}

model! {
    /// A host tag.
    Tag => TAG
}

impl Tag {
    /// Creates an unsaved tag.
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self(Record::new(&TAG).with("label", label))
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.0.text("label")
    }
}

model! {
    /// A host group.
    Group => GROUP
}

impl Group {
    /// Creates an unsaved group.
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self(Record::new(&GROUP).with("label", label))
    }

    /// Nests the group under `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: Group) -> Self {
        self.0.attach_one("parent_group", parent.0);
        self
    }

    /// Sets the group's connection settings.
    #[must_use]
    pub fn with_ssh_config(mut self, config: SshConfig) -> Self {
        self.0.attach_one("ssh_config", config.0);
        self
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.0.text("label")
    }
}

model! {
    /// A remote host.
    Host => HOST
}

impl Host {
    /// Creates an unsaved host.
    #[must_use]
    pub fn new(label: &str, address: &str) -> Self {
        Self(
            Record::new(&HOST)
                .with("label", label)
                .with("address", address),
        )
    }

    /// Places the host in a group.
    #[must_use]
    pub fn with_group(mut self, group: Group) -> Self {
        self.0.attach_one("group", group.0);
        self
    }

    /// Sets the host's connection settings.
    #[must_use]
    pub fn with_ssh_config(mut self, config: SshConfig) -> Self {
        self.0.attach_one("ssh_config", config.0);
        self
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.0.text("label")
    }

    /// Returns the address.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.0.text("address")
    }

    /// Returns the resolved group, if loaded.
    #[must_use]
    pub fn group(&self) -> Option<&Record> {
        self.0.related("group")
    }
}

model! {
    /// A port-forwarding rule.
    PfRule => PF_RULE
}

impl PfRule {
    /// Creates an unsaved rule of the given type (`L`, `R` or `D`).
    #[must_use]
    pub fn new(host: Host, pf_type: &str, local_port: u16) -> Self {
        let mut record = Record::new(&PF_RULE)
            .with("pf_type", pf_type)
            .with("local_port", local_port);
        record.attach_one("host", host.0);
        Self(record)
    }

    /// Sets the forwarding destination.
    #[must_use]
    pub fn with_destination(mut self, hostname: &str, remote_port: u16) -> Self {
        self.0.set("hostname", hostname);
        self.0.set("remote_port", remote_port);
        self
    }
}

model! {
    /// Links a host to a tag.
    TagHost => TAG_HOST
}

impl TagHost {
    /// Creates an unsaved link.
    #[must_use]
    pub fn new(host: Host, tag: Tag) -> Self {
        let mut record = Record::new(&TAG_HOST);
        record.attach_one("host", host.0);
        record.attach_one("tag", tag.0);
        Self(record)
    }
}
