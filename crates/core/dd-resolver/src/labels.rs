//! Container labels read by the resolver.

pub const DISABLE: &str = "dockdash.disable";
pub const GROUP: &str = "dockdash.group";
pub const NAME: &str = "dockdash.name";
pub const URL: &str = "dockdash.url";
pub const ICON: &str = "dockdash.icon";
/// Port appended to the internal network address.
pub const PORT: &str = "dockdash.port";

pub const COMPOSE_SERVICE: &str = "com.docker.compose.service";

/// Network whose address is used when no port is published.
pub const NETWORK: &str = "dockdash";

pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}
