use eater_domainmatcher::DomainPattern;
use tracing::{debug, warn};

use crate::common::DEFAULT_ROUTE_HOSTNAME;

/// Decides whether a listener hostname intersects any of a route's hostnames.
pub struct HostnameMatchFilter<'a> {
    listener_hostname: &'a str,
    route_hostnames: &'a [String],
}

impl<'a> HostnameMatchFilter<'a> {
    pub fn new(listener_hostname: &'a str, route_hostnames: &'a [String]) -> Self {
        Self { listener_hostname, route_hostnames }
    }

    pub fn filter(&self) -> bool {
        if self.listener_hostname.is_empty() || self.route_hostnames.is_empty() {
            return true;
        }

        if self.route_hostnames.iter().any(|hostname| hostname == DEFAULT_ROUTE_HOSTNAME) {
            return true;
        }

        let pattern = match self.listener_hostname.strip_prefix("*.") {
            Some(stripped) => format!("**+.{stripped}"),
            None => self.listener_hostname.to_owned(),
        };

        let Ok(pattern) = DomainPattern::<'_, '.'>::try_from(pattern.as_str()) else {
            warn!("Hostname is not a valid domain {}", self.listener_hostname);
            return false;
        };

        if self.route_hostnames.iter().any(|route_hostname| {
            let matched = pattern.matches(route_hostname);
            debug!("Comparing hostnames {} {route_hostname} {matched}", self.listener_hostname);
            matched
        }) {
            return true;
        }

        self.route_hostnames
            .iter()
            .filter_map(|route_hostname| route_hostname.strip_prefix("*.").map(|stripped| format!("**+.{stripped}")))
            .filter_map(|wildcard| DomainPattern::<'_, '.'>::try_from(wildcard.as_str()).ok().map(|pattern| pattern.matches(self.listener_hostname)))
            .any(|matched| matched)
    }
}
