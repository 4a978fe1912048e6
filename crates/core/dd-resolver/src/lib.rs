//! Turns raw upstream records and static bookmarks into display entries.
//! Everything here is a pure function of its inputs.

pub mod bookmarks;
pub mod group;
pub mod icon;
pub mod labels;
pub mod resolve;

pub use bookmarks::parse_bookmarks;
pub use group::group_entries;
pub use icon::{icon_url, sanitize_icon_name};
pub use resolve::{network_address, reachable_ports, resolve, resolve_url};
