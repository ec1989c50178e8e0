// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevant path information for the files Mync manages, and
//! expand the route tokens that settings use in place of absolute paths.
//!
//! # Route Tokens
//!
//! Paths stored in the configuration file may reference three kinds of
//! symbolic tokens:
//!
//! - `:name` for any route declared in the `[routes]` table.
//! - `:user` for the name of the invoking user.
//! - A leading `~` for the invoking user's home directory.
//!
//! Routes are substituted first, then the user token, and the home directory
//! shorthand last. Thus route values may themselves start with `~`.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Token that expands to the invoking user's name.
pub const USER_TOKEN: &str = ":user";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/mync/config.toml` as the
/// default. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("mync").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Expand and collapse route tokens.
///
/// Pure string transformation. Never touches the file system, and never
/// fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    routes: BTreeMap<String, String>,
    user: String,
    home: PathBuf,
}

impl PathResolver {
    /// Construct new path resolver.
    pub fn new(
        routes: BTreeMap<String, String>,
        user: impl Into<String>,
        home: impl Into<PathBuf>,
    ) -> Self {
        Self {
            routes,
            user: user.into(),
            home: home.into(),
        }
    }

    /// Expand all tokens in path into an absolute path.
    ///
    /// Duplicate and trailing path separators are dropped.
    pub fn merge(&self, path: impl AsRef<str>) -> PathBuf {
        let mut merged = path.as_ref().to_string();

        // INVARIANT: Longest route names first, so ":dropbox" never eats ":dropbox_work".
        for (route, value) in self.routes_by_name_len() {
            merged = merged.replace(&format!(":{route}"), value);
        }
        merged = merged.replace(USER_TOKEN, &self.user);
        let merged = collapse_separators(&merged);

        let expanded = self.expand_tilde(&merged);

        PathBuf::from(trim_trailing_separator(&expanded))
    }

    /// Merge `relative` onto `base`, then expand tokens of the result.
    pub fn join(&self, base: impl AsRef<Path>, relative: impl AsRef<str>) -> PathBuf {
        self.merge(format!(
            "{}/{}",
            base.as_ref().to_string_lossy(),
            relative.as_ref()
        ))
    }

    /// Collapse absolute path back into token form.
    ///
    /// Best effort inverse of [`merge`](Self::merge): a prefix equal to a
    /// route's expanded value becomes that route's token, otherwise a prefix
    /// equal to the home directory becomes `~`. Round trips are not
    /// guaranteed.
    pub fn unmerge(&self, path: impl AsRef<Path>) -> String {
        let path = collapse_separators(&path.as_ref().to_string_lossy());

        let mut routes = self
            .routes
            .iter()
            .map(|(route, value)| (route, self.merge(value)))
            .collect::<Vec<_>>();
        routes.sort_by_key(|(_, value)| std::cmp::Reverse(value.as_os_str().len()));

        for (route, value) in routes {
            if let Some(rest) = strip_path_prefix(&path, &value.to_string_lossy()) {
                return format!(":{route}{rest}");
            }
        }

        if let Some(rest) = strip_path_prefix(&path, &self.home.to_string_lossy()) {
            return format!("~{rest}");
        }

        path
    }

    fn routes_by_name_len(&self) -> Vec<(&String, &String)> {
        let mut routes = self.routes.iter().collect::<Vec<_>>();
        routes.sort_by_key(|(route, _)| std::cmp::Reverse(route.len()));
        routes
    }

    fn expand_tilde<'a>(&self, path: &'a str) -> Cow<'a, str> {
        shellexpand::tilde_with_context(path, || Some(self.home.to_string_lossy().into_owned()))
    }
}

fn collapse_separators(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(ch);
    }

    collapsed
}

// "/a/b/" becomes "/a/b", while "/" stays as is.
fn trim_trailing_separator(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" if path.starts_with('/') => "/",
        trimmed => trimmed,
    }
}

// Only strip on a component boundary, so "/home/al" is not a prefix of "/home/alice".
fn strip_path_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return None;
    }

    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    fn resolver() -> PathResolver {
        let routes = BTreeMap::from([
            ("dropbox".to_string(), "~/Dropbox".to_string()),
            ("dropbox_work".to_string(), "/mnt/work/Dropbox".to_string()),
            ("shared".to_string(), "/mnt/shared".to_string()),
        ]);
        PathResolver::new(routes, "alice", "/home/alice")
    }

    #[test_case("~/.bashrc", "/home/alice/.bashrc"; "home shorthand")]
    #[test_case(":shared/mync", "/mnt/shared/mync"; "plain route")]
    #[test_case(":dropbox/mync", "/home/alice/Dropbox/mync"; "route with home shorthand")]
    #[test_case(":dropbox_work/x", "/mnt/work/Dropbox/x"; "longest route wins")]
    #[test_case("/Users/:user/Library", "/Users/alice/Library"; "user token")]
    #[test_case("/mnt//shared///mync", "/mnt/shared/mync"; "duplicate separators")]
    #[test_case("~/.vim/", "/home/alice/.vim"; "trailing separator")]
    #[test_case("/", "/"; "root stays root")]
    #[test_case("/etc/hosts", "/etc/hosts"; "nothing to expand")]
    #[test]
    fn merge_expands_tokens(input: &str, expect: &str) {
        assert_eq!(resolver().merge(input).as_os_str(), expect);
    }

    #[test_case("/mnt/shared/mync", ":shared/mync"; "route prefix")]
    #[test_case("/home/alice/Dropbox/mync", ":dropbox/mync"; "route under home")]
    #[test_case("/home/alice/.bashrc", "~/.bashrc"; "home prefix")]
    #[test_case("/home/alicea/.bashrc", "/home/alicea/.bashrc"; "no partial component match")]
    #[test_case("/etc/hosts", "/etc/hosts"; "unknown path")]
    #[test]
    fn unmerge_collapses_known_prefixes(input: &str, expect: &str) {
        assert_eq!(resolver().unmerge(input), expect);
    }

    #[test]
    fn join_merges_relative_onto_base() {
        let result = resolver().join("/mnt/shared/mync/", "/shell/.bashrc");
        assert_eq!(result, PathBuf::from("/mnt/shared/mync/shell/.bashrc"));
    }

    #[test]
    fn join_drops_trailing_separator_of_entry() {
        let result = resolver().join("~", ".vim/");
        assert_eq!(result.as_os_str(), "/home/alice/.vim");
    }
}
