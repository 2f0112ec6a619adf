//! dns-safe node name sanitisation.
//!
//! reported hostnames are arbitrary strings; the name a node is given in
//! the overlay must be a valid dns label.

/// maximum length of a node name (dns label limit).
pub const MAX_NODE_NAME_LEN: usize = 63;

/// a sanitised, dns-safe node name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeName(String);

impl NodeName {
    /// sanitise a raw hostname into a dns label.
    ///
    /// lowercases, maps disallowed characters to hyphens, collapses runs of
    /// hyphens, trims leading/trailing hyphens and truncates to 63 chars.
    /// returns `None` when nothing usable remains.
    pub fn sanitise(raw: &str) -> Option<Self> {
        let mut out = String::with_capacity(raw.len());
        let mut last_hyphen = true; // swallow leading hyphens
        for c in raw.chars() {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                out.push(c);
                last_hyphen = false;
            } else if !last_hyphen {
                out.push('-');
                last_hyphen = true;
            }
        }
        while out.ends_with('-') {
            out.pop();
        }
        out.truncate(MAX_NODE_NAME_LEN);
        while out.ends_with('-') {
            out.pop();
        }
        if out.is_empty() { None } else { Some(Self(out)) }
    }

    /// the sanitised name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_hostname_unchanged() {
        assert_eq!(NodeName::sanitise("laptop").unwrap().as_str(), "laptop");
    }

    #[test]
    fn test_uppercase_lowered() {
        assert_eq!(NodeName::sanitise("MyLaptop").unwrap().as_str(), "mylaptop");
    }

    #[test]
    fn test_spaces_and_symbols_become_hyphens() {
        assert_eq!(
            NodeName::sanitise("Alice's MacBook Pro").unwrap().as_str(),
            "alice-s-macbook-pro"
        );
    }

    #[test]
    fn test_hyphen_runs_collapse() {
        assert_eq!(NodeName::sanitise("a---b").unwrap().as_str(), "a-b");
        assert_eq!(NodeName::sanitise("a _ b").unwrap().as_str(), "a-b");
    }

    #[test]
    fn test_leading_trailing_trimmed() {
        assert_eq!(NodeName::sanitise("--web--").unwrap().as_str(), "web");
    }

    #[test]
    fn test_truncation() {
        let long = "x".repeat(100);
        assert_eq!(NodeName::sanitise(&long).unwrap().as_str().len(), 63);
    }

    #[test]
    fn test_unusable_input() {
        assert!(NodeName::sanitise("").is_none());
        assert!(NodeName::sanitise("---").is_none());
        assert!(NodeName::sanitise("!!!").is_none());
    }
}
