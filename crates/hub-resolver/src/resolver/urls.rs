use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;
use url::Url;

use hub_normalize::PackageName;

/// The direct references seen so far, by package. A package given two different URLs holds
/// the reason it can't be installed instead.
#[derive(Debug, Default)]
pub(crate) struct DirectUrls(FxHashMap<PackageName, Result<Url, String>>);

impl DirectUrls {
    pub(crate) fn get(&self, package_name: &PackageName) -> Option<&Result<Url, String>> {
        self.0.get(package_name)
    }

    /// Whether `url` for `package_name` is already accounted for.
    pub(crate) fn knows(&self, package_name: &PackageName, url: &Url) -> bool {
        match self.0.get(package_name) {
            Some(Ok(known)) => known == url,
            Some(Err(_)) => true,
            None => false,
        }
    }

    /// Record `url` for `package_name`. Returns `false` if nothing changed.
    pub(crate) fn insert(&mut self, package_name: PackageName, url: Url) -> bool {
        match self.0.entry(package_name) {
            Entry::Vacant(entry) => {
                entry.insert(Ok(url));
                true
            }
            Entry::Occupied(mut entry) => match entry.get() {
                Ok(known) if *known != url => {
                    let reason = format!(
                        "Requirements on `{}` point to different URLs: `{known}` and `{url}`",
                        entry.key()
                    );
                    entry.insert(Err(reason));
                    true
                }
                _ => false,
            },
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}
