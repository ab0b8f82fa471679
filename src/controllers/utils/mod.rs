mod hostname_match_filter;
mod label_selector;
mod reference_grants;
mod route_listener_matcher;

pub use hostname_match_filter::HostnameMatchFilter;
pub use label_selector::LabelSelectorMatcher;
pub use reference_grants::{check_reference_grant, FromResourceKey, ToResourceKey};
pub use route_listener_matcher::{ListenerMatch, RouteListenerMatcher};
