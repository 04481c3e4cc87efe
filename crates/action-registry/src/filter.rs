//! Page-dependent availability of actions.

use std::fmt;
use std::sync::Arc;

use perceiver_structural::Observation;
use webpilot_core_types::TabInfo;

/// What a filter may look at when deciding availability.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub url: &'a str,
    pub title: &'a str,
    pub tabs: &'a [TabInfo],
}

impl<'a> From<&'a Observation> for PageContext<'a> {
    fn from(observation: &'a Observation) -> Self {
        Self {
            url: &observation.url,
            title: &observation.title,
            tabs: &observation.tabs,
        }
    }
}

/// Host pattern: `example.com` matches exactly, `*.example.com` matches the
/// apex and every subdomain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPattern {
    host: String,
    subdomains: bool,
}

impl DomainPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(rest) => Self {
                host: rest.to_string(),
                subdomains: true,
            },
            None => Self {
                host: pattern,
                subdomains: false,
            },
        }
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if host == self.host {
            return true;
        }
        self.subdomains
            && host
                .strip_suffix(self.host.as_str())
                .map(|prefix| prefix.ends_with('.'))
                .unwrap_or(false)
    }
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subdomains {
            write!(f, "*.{}", self.host)
        } else {
            f.write_str(&self.host)
        }
    }
}

type Predicate = Arc<dyn Fn(&PageContext<'_>) -> bool + Send + Sync>;

/// Restricts an action to some pages. An empty filter allows every page.
#[derive(Clone, Default)]
pub struct PageFilter {
    domains: Vec<DomainPattern>,
    predicate: Option<Predicate>,
}

impl PageFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn domains<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: patterns
                .into_iter()
                .map(|p| DomainPattern::parse(p.as_ref()))
                .collect(),
            predicate: None,
        }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PageContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.domains.is_empty() && self.predicate.is_none()
    }

    /// Both the domain list and the predicate must agree. A page without a
    /// parsable host never matches a domain list.
    pub fn allows(&self, page: &PageContext<'_>) -> bool {
        if !self.domains.is_empty() {
            let host = url::Url::parse(page.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string));
            let Some(host) = host else {
                return false;
            };
            if !self.domains.iter().any(|d| d.matches(&host)) {
                return false;
            }
        }
        self.predicate.as_ref().map(|p| p(page)).unwrap_or(true)
    }
}

impl fmt::Debug for PageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFilter")
            .field("domains", &self.domains)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
