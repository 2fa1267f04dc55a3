//! Sync/system conversation bypass.
//!
//! Decrypts from system, broadcast and history-sync conversations skip the
//! coordinator and recovery: one attempt, straight against the store. This
//! is a heuristic on the peer jid; the rule list is injectable.

/// Match rule on the peer jid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassRule {
    /// Jid contains the text
    Contains(String),
    /// Jid equals the text
    Equals(String),
}

impl BypassRule {
    fn matches(&self, jid: &str) -> bool {
        match self {
            Self::Contains(pattern) => jid.contains(pattern.as_str()),
            Self::Equals(value) => jid == value,
        }
    }
}

/// Predicate selecting jids that bypass transactions and recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBypass {
    rules: Vec<BypassRule>,
}

impl SyncBypass {
    /// Bypass with exactly `rules`.
    pub fn new(rules: Vec<BypassRule>) -> Self {
        Self { rules }
    }

    /// Bypass nothing.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    /// Configured rules.
    pub fn rules(&self) -> &[BypassRule] {
        &self.rules
    }

    /// True if decrypts from `jid` should bypass.
    pub fn applies(&self, jid: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(jid))
    }
}

impl Default for SyncBypass {
    fn default() -> Self {
        let contains = |s: &str| BypassRule::Contains(s.to_string());

        Self::new(vec![
            contains("@lid.whatsapp.net"),
            contains("@broadcast"),
            contains("@newsletter"),
            BypassRule::Equals("status@broadcast".to_string()),
            contains("@g.us.history"),
            contains(".whatsapp.net.history"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_jids_bypass() {
        let bypass = SyncBypass::default();

        assert!(bypass.applies("status@broadcast"));
        assert!(bypass.applies("12345@broadcast"));
        assert!(bypass.applies("120363@newsletter"));
        assert!(bypass.applies("98765@lid.whatsapp.net"));
        assert!(bypass.applies("123@g.us.history"));
        assert!(bypass.applies("123@s.whatsapp.net.history"));
    }

    #[test]
    fn regular_contacts_do_not_bypass() {
        let bypass = SyncBypass::default();

        assert!(!bypass.applies("5511999999999@s.whatsapp.net"));
        assert!(!bypass.applies("5511999999999:3@s.whatsapp.net"));
        assert!(!bypass.applies("123456@g.us"));
    }

    #[test]
    fn empty_rule_list_bypasses_nothing() {
        assert!(!SyncBypass::none().applies("status@broadcast"));
    }
}
