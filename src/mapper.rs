//! Folder name mapping: delimiter rewrite, destination-root prefix,
//! special-use linking, and user redirection, in that precedence
//! order (highest first: redirection, then special-use link, then
//! root-prefixed delimiter-rewrite).

use crate::config::RedirectRule;
use crate::error::{Error, Result};
use crate::manifest::SpecialUse;
use std::collections::HashSet;

/// Resolves a source folder name (plus its special-use attributes)
/// into the destination folder name it should be created/appended
/// under.
pub struct FolderMapper<'a> {
    src_delimiter: char,
    dst_delimiter: char,
    dst_root: Option<&'a str>,
    root_merge: bool,
    redirects: &'a [RedirectRule],
    /// Special-use folder name on the destination side, keyed by the
    /// special-use attribute the destination already advertises.
    dst_special_use: &'a [(SpecialUse, String)],
}

impl<'a> FolderMapper<'a> {
    #[must_use]
    pub fn new(
        src_delimiter: char,
        dst_delimiter: char,
        dst_root: Option<&'a str>,
        root_merge: bool,
        redirects: &'a [RedirectRule],
        dst_special_use: &'a [(SpecialUse, String)],
    ) -> Self {
        Self {
            src_delimiter,
            dst_delimiter,
            dst_root,
            root_merge,
            redirects,
            dst_special_use,
        }
    }

    /// Rewrite `src_name`'s hierarchy delimiter and prefix it with the
    /// destination root, without consulting redirects or special-use
    /// links. This is the fallback path every other rule can override.
    fn rewrite_delimiter_and_root(&self, src_name: &str) -> String {
        let rewritten = if self.src_delimiter == self.dst_delimiter {
            src_name.to_string()
        } else {
            src_name.replace(self.src_delimiter, &self.dst_delimiter.to_string())
        };
        match self.dst_root {
            Some(root) if !root.is_empty() => {
                if self.root_merge
                    && (rewritten == root || rewritten.starts_with(&format!("{root}{}", self.dst_delimiter)))
                {
                    rewritten
                } else {
                    format!("{root}{}{rewritten}", self.dst_delimiter)
                }
            }
            _ => rewritten,
        }
    }

    /// Find a redirect rule matching `src_name`, if any. Wildcard
    /// rules match by prefix and splice the remainder onto the
    /// destination; literal rules match exactly.
    fn find_redirect(&self, src_name: &str) -> Option<&'a RedirectRule> {
        self.redirects.iter().find(|rule| {
            if rule.wildcard {
                src_name.starts_with(&rule.src)
            } else {
                src_name == rule.src
            }
        })
    }

    fn apply_redirect(&self, rule: &RedirectRule, src_name: &str) -> String {
        if rule.wildcard {
            let remainder = src_name[rule.src.len()..].trim_start_matches(self.src_delimiter);
            if remainder.is_empty() {
                rule.dst.clone()
            } else {
                format!("{}{}{remainder}", rule.dst, self.dst_delimiter)
            }
        } else {
            rule.dst.clone()
        }
    }

    /// Resolve the destination name for a single source folder.
    ///
    /// Precedence: an explicit `--redirect` match wins outright; next
    /// a destination special-use link (the source folder carries a
    /// special-use attribute the destination already exposes under a
    /// different name); otherwise the delimiter-rewritten,
    /// root-prefixed name.
    #[must_use]
    pub fn resolve(&self, src_name: &str, src_special_use: &[SpecialUse]) -> String {
        if let Some(rule) = self.find_redirect(src_name) {
            return self.apply_redirect(rule, src_name);
        }
        if !self.ignore_special_use() {
            for su in src_special_use {
                if let Some((_, dst_name)) = self.dst_special_use.iter().find(|(s, _)| s == su) {
                    return dst_name.clone();
                }
            }
        }
        self.rewrite_delimiter_and_root(src_name)
    }

    fn ignore_special_use(&self) -> bool {
        self.dst_special_use.is_empty()
    }

    /// After resolving every source folder, confirm that every
    /// redirect rule's `src` actually matched something. An unmatched
    /// rule almost certainly names a typo'd source folder and aborts
    /// the run rather than silently doing nothing.
    pub fn check_redirects_matched(&self, src_names: &[String]) -> Result<()> {
        let mut unresolved = Vec::new();
        for rule in self.redirects {
            let matched = src_names.iter().any(|name| {
                if rule.wildcard {
                    name.starts_with(&rule.src)
                } else {
                    name == &rule.src
                }
            });
            if !matched {
                unresolved.push(format!("{}:{}", rule.src, rule.dst));
            }
        }
        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(Error::UnresolvedRedirect(unresolved))
        }
    }
}

#[must_use]
pub fn dedupe_special_use(attrs: Vec<SpecialUse>) -> Vec<SpecialUse> {
    let mut seen = HashSet::new();
    attrs.into_iter().filter(|a| seen.insert(*a)).collect()
}
