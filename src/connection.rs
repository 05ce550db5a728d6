//! Connection aliases
//!
//! The `[connections]` table of the configuration maps a short host name to
//! either one endpoint or a list of endpoints:
//!
//! ```toml
//! [connections]
//! home = "scgi://192.168.1.5:5000"
//! seedbox = ["10.0.0.1:80", "10.0.0.2:80"]
//! cluster = ["home", "seedbox-3:5000"]
//! ```
//!
//! Single-host tools use [`ConnectionResolver::resolve_one`]; tools that fan
//! out over several daemons iterate [`ConnectionResolver::resolve_many`].

use std::collections::BTreeMap;
use std::iter::FusedIterator;
use std::slice;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Value stored under an alias name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasTarget {
    Single(String),
    Many(Vec<String>),
}

impl From<&str> for AliasTarget {
    fn from(value: &str) -> Self {
        AliasTarget::Single(value.to_string())
    }
}

impl From<Vec<&str>> for AliasTarget {
    fn from(values: Vec<&str>) -> Self {
        AliasTarget::Many(values.into_iter().map(String::from).collect())
    }
}

/// Alias name → target(s).
pub type AliasTable = BTreeMap<String, AliasTarget>;

/// Resolves host tokens against a borrowed alias table.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionResolver<'a> {
    aliases: &'a AliasTable,
}

impl<'a> ConnectionResolver<'a> {
    pub fn new(aliases: &'a AliasTable) -> Self {
        Self { aliases }
    }

    /// Resolve a token to a single endpoint.
    ///
    /// Only single-valued aliases are substituted. Unknown tokens and
    /// list-valued aliases come back unchanged; this never fails.
    pub fn resolve_one(&self, token: &str) -> String {
        match self.aliases.get(token) {
            Some(AliasTarget::Single(endpoint)) => {
                trace!("resolve_one: {} -> {}", token, endpoint);
                endpoint.clone()
            }
            _ => token.to_string(),
        }
    }

    /// Resolve a token to all endpoints it stands for.
    ///
    /// List entries are passed through [`resolve_one`](Self::resolve_one),
    /// so an entry may name another single-valued alias. Lists nested via
    /// list-valued aliases are not flattened. An empty list yields nothing.
    pub fn resolve_many(&self, token: &str) -> Endpoints<'a> {
        let pending = match self.aliases.get(token) {
            Some(AliasTarget::Many(entries)) => Pending::List(entries.iter()),
            _ => Pending::Token(Some(token.to_string())),
        };
        Endpoints {
            resolver: *self,
            pending,
        }
    }
}

#[derive(Debug, Clone)]
enum Pending<'a> {
    Token(Option<String>),
    List(slice::Iter<'a, String>),
}

/// Lazy sequence of endpoints produced by [`ConnectionResolver::resolve_many`].
///
/// Clone it to restart from the current position.
#[derive(Debug, Clone)]
pub struct Endpoints<'a> {
    resolver: ConnectionResolver<'a>,
    pending: Pending<'a>,
}

impl Iterator for Endpoints<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match &mut self.pending {
            Pending::Token(token) => token.take().map(|t| self.resolver.resolve_one(&t)),
            Pending::List(entries) => entries.next().map(|e| self.resolver.resolve_one(e)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = match &self.pending {
            Pending::Token(token) => usize::from(token.is_some()),
            Pending::List(entries) => entries.len(),
        };
        (len, Some(len))
    }
}

impl ExactSizeIterator for Endpoints<'_> {}

impl FusedIterator for Endpoints<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn table() -> AliasTable {
        let mut aliases = AliasTable::new();
        aliases.insert("home".into(), "192.168.1.5:80".into());
        aliases.insert(
            "seedbox".into(),
            vec!["10.0.0.1:80", "10.0.0.2:80"].into(),
        );
        aliases.insert("mixed".into(), vec!["home", "10.0.0.9:80"].into());
        aliases.insert("nested".into(), vec!["seedbox", "home"].into());
        aliases.insert("empty".into(), AliasTarget::Many(vec![]));
        aliases
    }

    #[rstest]
    #[case("home", "192.168.1.5:80")]
    #[case("office", "office")]
    #[case("seedbox", "seedbox")]
    #[case("scgi://localhost:5000", "scgi://localhost:5000")]
    fn given_token_when_resolve_one_then_substitutes_single_values_only(
        #[case] token: &str,
        #[case] expected: &str,
    ) {
        let aliases = table();
        let resolver = ConnectionResolver::new(&aliases);
        assert_eq!(resolver.resolve_one(token), expected);
    }

    #[test]
    fn given_list_alias_when_resolve_many_then_yields_entries_in_order() {
        let aliases = table();
        let resolver = ConnectionResolver::new(&aliases);
        let endpoints: Vec<_> = resolver.resolve_many("seedbox").collect();
        assert_eq!(endpoints, vec!["10.0.0.1:80", "10.0.0.2:80"]);
    }

    #[test]
    fn given_list_with_alias_entry_when_resolve_many_then_resolves_one_hop() {
        let aliases = table();
        let resolver = ConnectionResolver::new(&aliases);

        let mixed: Vec<_> = resolver.resolve_many("mixed").collect();
        assert_eq!(mixed, vec!["192.168.1.5:80", "10.0.0.9:80"]);

        // list-valued entries are not flattened
        let nested: Vec<_> = resolver.resolve_many("nested").collect();
        assert_eq!(nested, vec!["seedbox", "192.168.1.5:80"]);
    }

    #[test]
    fn given_empty_list_when_resolve_many_then_yields_nothing() {
        let aliases = table();
        let resolver = ConnectionResolver::new(&aliases);
        assert_eq!(resolver.resolve_many("empty").count(), 0);
    }

    #[test]
    fn given_partially_consumed_sequence_when_cloned_then_restarts_from_position() {
        let aliases = table();
        let resolver = ConnectionResolver::new(&aliases);
        let mut endpoints = resolver.resolve_many("seedbox");
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints.next().as_deref(), Some("10.0.0.1:80"));

        let rest = endpoints.clone();
        assert_eq!(rest.collect::<Vec<_>>(), vec!["10.0.0.2:80"]);
        assert_eq!(endpoints.next().as_deref(), Some("10.0.0.2:80"));
        assert_eq!(endpoints.next(), None);
        assert_eq!(endpoints.next(), None);
    }

    #[test]
    fn given_toml_table_when_deserialized_then_distinguishes_single_and_list() {
        let aliases: AliasTable = toml::from_str(
            r#"
home = "192.168.1.5:80"
seedbox = ["10.0.0.1:80", "10.0.0.2:80"]
"#,
        )
        .unwrap();
        assert_eq!(aliases["home"], AliasTarget::Single("192.168.1.5:80".into()));
        assert_eq!(
            aliases["seedbox"],
            AliasTarget::Many(vec!["10.0.0.1:80".into(), "10.0.0.2:80".into()])
        );
    }
}
