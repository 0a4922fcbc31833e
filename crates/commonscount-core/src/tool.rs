//! CC legal tool URL classification and priority ordering
//!
//! Tool URLs look like `//creativecommons.org/<category>/<unit>[/<version>[/<jurisdiction>]]`.
//! Parsing is total: anything that doesn't fit lands in the lowest priority
//! tier instead of failing.

use std::fmt;

/// Scheme-relative prefix prepended to bare legal tool paths
pub const TOOL_URL_PREFIX: &str = "//creativecommons.org/";

/// Higher versions produce smaller keys so they sort first
const VERSION_SORT_BASE: u16 = 999;

/// Display sentinel for "no jurisdiction", preceding any lowercase code
const GLOBAL_JURISDICTION: &str = "A";

/// Lowest priority tier, also used for unclassifiable input
pub const MISC_PRIORITY: u8 = 7;

/// A parsed CC legal tool URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalTool {
    pub url: String,
    /// `licenses` or `publicdomain`
    pub category: String,
    /// `by`, `by-sa`, `zero`, `mark`, ...
    pub unit: String,
    pub version: Option<String>,
    /// Ported jurisdiction code (`ar`, `de`, ...)
    pub jurisdiction: Option<String>,
    /// Human-readable identifier, e.g. `CC BY-SA 2.5 AR`
    pub identifier: String,
}

impl LegalTool {
    /// Build from a bare path like `licenses/by/4.0/`
    pub fn from_path(path: &str) -> Self {
        let path = path.trim().trim_start_matches('/');
        Self::parse(&format!("{TOOL_URL_PREFIX}{path}"))
    }

    pub fn parse(url: &str) -> Self {
        let url = url.trim();
        let without_scheme = url
            .strip_prefix("https:")
            .or_else(|| url.strip_prefix("http:"))
            .unwrap_or(url);
        // First non-empty segment is the host
        let dirs: Vec<&str> = without_scheme
            .split('/')
            .filter(|s| !s.is_empty())
            .skip(1)
            .collect();

        let category = dirs.first().copied().unwrap_or_default().to_string();
        let unit = dirs.get(1).copied().unwrap_or_default().to_string();
        let version = dirs.get(2).map(|s| s.to_string());
        let jurisdiction = if dirs.len() == 4 {
            Some(dirs[3].to_string())
        } else {
            None
        };

        let identifier = build_identifier(
            url,
            &category,
            &unit,
            version.as_deref(),
            jurisdiction.as_deref(),
        );

        Self {
            url: url.to_string(),
            category,
            unit,
            version,
            jurisdiction,
            identifier,
        }
    }

    fn version_number(&self) -> Option<f64> {
        self.version.as_deref().and_then(|v| v.parse::<f64>().ok())
    }

    /// `999 - round(version * 10)`; unversioned or unparsable tools get 999
    pub fn version_sort(&self) -> u16 {
        match self.version_number() {
            Some(v) if v.is_finite() && v >= 0.0 => {
                let scaled = (v * 10.0).round().min(f64::from(VERSION_SORT_BASE)) as u16;
                VERSION_SORT_BASE - scaled
            }
            _ => VERSION_SORT_BASE,
        }
    }

    /// Semantic tier, 1 (most important) to 7 (miscellaneous)
    pub fn priority(&self) -> u8 {
        let is_license = self.category == "licenses";
        let versioned = self.version_number().is_some();
        let ported = self.jurisdiction.is_some();
        let by = self.unit.starts_with("by");

        if is_license && self.version.as_deref() == Some("4.0") {
            1
        } else if self.category == "publicdomain" && matches!(self.unit.as_str(), "mark" | "zero")
        {
            2
        } else if is_license && versioned {
            match (by, ported) {
                (true, false) => 3,
                (true, true) => 4,
                (false, false) => 5,
                (false, true) => 6,
            }
        } else {
            MISC_PRIORITY
        }
    }

    /// 4.0 licenses, CC0 and PDM: the tools crossed with countries/languages
    pub fn is_primary(&self) -> bool {
        (self.category == "licenses" && self.version.as_deref() == Some("4.0"))
            || matches!(self.unit.as_str(), "mark" | "zero")
    }

    pub fn sort_key(&self) -> SortKey {
        SortKey {
            priority: self.priority(),
            version_sort: self.version_sort(),
            jurisdiction: self.jurisdiction.clone(),
            unit: self.unit.clone(),
            url: self.url.clone(),
        }
    }
}

fn build_identifier(
    url: &str,
    category: &str,
    unit: &str,
    version: Option<&str>,
    jurisdiction: Option<&str>,
) -> String {
    if unit.is_empty() {
        return url
            .trim_start_matches(TOOL_URL_PREFIX)
            .trim_matches('/')
            .to_uppercase();
    }

    let mut id = match (unit, version) {
        ("mark", Some(v)) => format!("PDM {v}"),
        ("mark", None) => "PDM".to_string(),
        ("zero", Some(v)) => format!("CC0 {v}"),
        ("zero", None) => "CC0".to_string(),
        (u, Some(v)) => format!("{u} {v}"),
        (u, None) => u.to_string(),
    };
    if category == "licenses" && !matches!(unit, "mark" | "zero") {
        id = format!("CC {id}");
    }
    if let Some(j) = jurisdiction {
        id = format!("{id} {j}");
    }
    id.to_uppercase()
}

/// Total order over tools: tier, then newest version, then global before
/// ported, then unit, then URL as a final tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    pub priority: u8,
    pub version_sort: u16,
    /// `None` (global) orders before any code
    pub jurisdiction: Option<String>,
    pub unit: String,
    pub url: String,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.priority,
            self.version_sort,
            self.jurisdiction.as_deref().unwrap_or(GLOBAL_JURISDICTION),
            self.unit
        )
    }
}

/// Sort tool URLs into priority order, dropping duplicates (first wins).
pub fn prioritize(urls: &[String]) -> Vec<LegalTool> {
    let mut seen = std::collections::HashSet::new();
    let mut tools: Vec<LegalTool> = urls
        .iter()
        .map(|u| LegalTool::parse(u))
        .filter(|t| seen.insert(t.identifier.clone()))
        .collect();
    tools.sort_by_cached_key(LegalTool::sort_key);
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_versioned_license() {
        let t = LegalTool::from_path("licenses/by-sa/4.0/");
        assert_eq!(t.url, "//creativecommons.org/licenses/by-sa/4.0/");
        assert_eq!(t.category, "licenses");
        assert_eq!(t.unit, "by-sa");
        assert_eq!(t.version.as_deref(), Some("4.0"));
        assert_eq!(t.jurisdiction, None);
        assert_eq!(t.identifier, "CC BY-SA 4.0");
    }

    #[test]
    fn parse_ported_license() {
        let t = LegalTool::from_path("licenses/by-nc/2.5/ar/");
        assert_eq!(t.jurisdiction.as_deref(), Some("ar"));
        assert_eq!(t.identifier, "CC BY-NC 2.5 AR");
        assert_eq!(t.priority(), 4);
    }

    #[test]
    fn public_domain_identifiers() {
        assert_eq!(
            LegalTool::from_path("publicdomain/zero/1.0/").identifier,
            "CC0 1.0"
        );
        assert_eq!(
            LegalTool::from_path("publicdomain/mark/1.0/").identifier,
            "PDM 1.0"
        );
    }

    #[test]
    fn priority_tiers() {
        let tier = |p: &str| LegalTool::from_path(p).priority();
        assert_eq!(tier("licenses/by/4.0/"), 1);
        assert_eq!(tier("publicdomain/zero/1.0/"), 2);
        assert_eq!(tier("publicdomain/mark/1.0/"), 2);
        assert_eq!(tier("licenses/by/3.0/"), 3);
        assert_eq!(tier("licenses/by/3.0/de/"), 4);
        assert_eq!(tier("licenses/nc-sa/1.0/"), 5);
        assert_eq!(tier("licenses/nc-sa/1.0/fi/"), 6);
        assert_eq!(tier("licenses/sampling/1.0/"), 5);
        assert_eq!(tier("publicdomain/certification/1.0/us/"), 7);
    }

    #[test]
    fn malformed_input_is_lowest_priority() {
        for raw in ["", "//creativecommons.org/", "not a url", "//x/licenses/by/abc/"] {
            let t = LegalTool::parse(raw);
            assert_eq!(t.priority(), MISC_PRIORITY, "{raw:?}");
        }
    }

    #[test]
    fn version_sort_orders_newer_first() {
        let v30 = LegalTool::from_path("licenses/by/3.0/").version_sort();
        let v25 = LegalTool::from_path("licenses/by/2.5/").version_sort();
        let v10 = LegalTool::from_path("licenses/by/1.0/").version_sort();
        assert_eq!(v30, 969);
        assert_eq!(v25, 974);
        assert!(v30 < v25 && v25 < v10);
        assert_eq!(LegalTool::from_path("licenses/by/").version_sort(), 999);
    }

    #[test]
    fn sort_key_display_matches_string_form() {
        let t = LegalTool::from_path("licenses/by/3.0/");
        assert_eq!(t.sort_key().to_string(), "3-969-A-by");
        let t = LegalTool::from_path("licenses/by/3.0/de/");
        assert_eq!(t.sort_key().to_string(), "4-969-de-by");
    }

    #[test]
    fn global_sorts_before_ported() {
        let global = LegalTool::from_path("licenses/by/2.0/").sort_key();
        let ported = LegalTool::from_path("licenses/by/2.0/at/").sort_key();
        // Same version; ported lands in a later tier anyway, but the
        // jurisdiction component alone must also order global first
        assert!(global.jurisdiction < ported.jurisdiction);
        assert!(global < ported);
    }

    #[test]
    fn prioritize_orders_and_dedups() {
        let urls: Vec<String> = [
            "licenses/by/2.0/",
            "publicdomain/zero/1.0/",
            "licenses/by/4.0/",
            "licenses/by/3.0/",
            "licenses/by/4.0/",
        ]
        .iter()
        .map(|p| format!("{TOOL_URL_PREFIX}{p}"))
        .collect();

        let ids: Vec<String> = prioritize(&urls).into_iter().map(|t| t.identifier).collect();
        assert_eq!(ids, ["CC BY 4.0", "CC0 1.0", "CC BY 3.0", "CC BY 2.0"]);
    }

    #[test]
    fn primary_tools() {
        assert!(LegalTool::from_path("licenses/by-nd/4.0/").is_primary());
        assert!(LegalTool::from_path("publicdomain/mark/1.0/").is_primary());
        assert!(!LegalTool::from_path("licenses/by/3.0/").is_primary());
    }
}
