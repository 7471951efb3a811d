//! Identity merging.
//!
//! Collapses raw packages that are really one logical app:
//!
//! 1. **Owner-group pass** - packages sharing a platform owner id merge into
//!    the member with a launch entry point, or the first member in key order.
//!    Members the catalog enumerates count even without usage, so a helper
//!    used alone is still reported under its app.
//! 2. **Family-table pass** - an ordered list of [`FamilyRule`]s merges known
//!    aliases into their primary for components the platform assigns to
//!    different owners (phone, dialer, contacts...).
//!
//! Both passes only read the catalog and the rule snapshot, so running
//! [`IdentityMerger::merge`] on its own output changes nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::source::PackageCatalog;
use crate::types::{OwnerGroupId, PackageName};
use crate::usage::{SessionTotals, UsageTotals};

/// Merge `aliases` into `primary` whenever any of them has usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRule {
    pub primary: PackageName,
    pub aliases: Vec<PackageName>,
}

/// An ordered, swappable list of family rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FamilyTable {
    rules: Vec<FamilyRule>,
}

const CONTACTS_FAMILY: &[&str] = &[
    "com.android.phone",
    "com.android.dialer",
    "com.google.android.dialer",
    "com.android.incallui",
    "com.android.server.telecom",
    "com.samsung.android.contacts",
    "com.samsung.android.dialer",
    "com.oneplus.contacts",
    "com.oplus.contacts",
    "com.oplus.aicall",
    "com.miui.contactsphone",
];

impl Default for FamilyTable {
    /// Phone, dialer and in-call screens across vendors fold into Contacts.
    fn default() -> Self {
        let aliases = CONTACTS_FAMILY
            .iter()
            .filter_map(|alias| PackageName::new(*alias).ok())
            .collect();
        let rules = PackageName::new("com.android.contacts")
            .map(|primary| vec![FamilyRule { primary, aliases }])
            .unwrap_or_default();
        Self { rules }
    }
}

impl FamilyTable {
    pub const fn new(rules: Vec<FamilyRule>) -> Self {
        Self { rules }
    }

    pub const fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[FamilyRule] {
        &self.rules
    }

    /// The primary `package` folds into, if it is an alias in any rule.
    pub fn primary_for(&self, package: &PackageName) -> Option<&PackageName> {
        self.rules
            .iter()
            .find(|rule| rule.aliases.contains(package))
            .map(|rule| &rule.primary)
    }
}

/// Applies the owner-group and family-table passes.
#[derive(Debug, Clone, Default)]
pub struct IdentityMerger {
    families: FamilyTable,
}

impl IdentityMerger {
    pub const fn new(families: FamilyTable) -> Self {
        Self { families }
    }

    pub const fn families(&self) -> &FamilyTable {
        &self.families
    }

    pub fn merge(&self, mut totals: UsageTotals, catalog: &dyn PackageCatalog) -> UsageTotals {
        merge_owner_groups(&mut totals, catalog);
        self.merge_families(&mut totals);
        totals
    }

    /// The key `package` ends up under after both passes.
    pub fn logical_key(&self, package: &PackageName, catalog: &dyn PackageCatalog) -> PackageName {
        let mut key = catalog
            .package_info(package)
            .and_then(|info| {
                let group = info.owner_group?;
                let present = vec![(package.clone(), info.launchable)];
                group_primary(&group_candidates(group, present, catalog))
            })
            .unwrap_or_else(|| package.clone());
        for rule in &self.families.rules {
            if rule.primary != key && rule.aliases.contains(&key) {
                key = rule.primary.clone();
            }
        }
        key
    }

    fn merge_families(&self, totals: &mut UsageTotals) {
        for rule in &self.families.rules {
            let mut merged = totals.remove(&rule.primary);
            for alias in &rule.aliases {
                if *alias == rule.primary {
                    continue;
                }
                if let Some(alias_totals) = totals.remove(alias) {
                    tracing::debug!(
                        alias = %alias,
                        primary = %rule.primary,
                        duration_ms = alias_totals.duration_ms,
                        "family merge"
                    );
                    merged
                        .get_or_insert_with(|| SessionTotals {
                            members: std::iter::once(rule.primary.clone()).collect(),
                            ..SessionTotals::default()
                        })
                        .absorb(alias_totals);
                }
            }
            if let Some(merged) = merged {
                totals.insert(rule.primary.clone(), merged);
            }
        }
    }
}

fn merge_owner_groups(totals: &mut UsageTotals, catalog: &dyn PackageCatalog) {
    // (package, launchable) per group, in key order.
    let mut groups: BTreeMap<OwnerGroupId, Vec<(PackageName, bool)>> = BTreeMap::new();
    for package in totals.keys() {
        let Some(info) = catalog.package_info(package) else {
            tracing::trace!(%package, "package not in catalog, not grouped");
            continue;
        };
        if let Some(group) = info.owner_group {
            groups
                .entry(group)
                .or_default()
                .push((package.clone(), info.launchable));
        }
    }

    for (group, present) in groups {
        let members = group_candidates(group, present, catalog);
        let Some(primary) = group_primary(&members) else {
            continue;
        };

        let mut merged = totals.remove(&primary).unwrap_or_default();
        for (package, _) in &members {
            if *package == primary {
                continue;
            }
            if let Some(member_totals) = totals.remove(package) {
                tracing::debug!(
                    owner_group = group,
                    %package,
                    %primary,
                    duration_ms = member_totals.duration_ms,
                    "owner-group merge"
                );
                merged.absorb(member_totals);
            }
        }
        merged.members.insert(primary.clone());
        totals.insert(primary, merged);
    }
}

/// `present` plus every catalog member of `group`, in key order.
fn group_candidates(
    group: OwnerGroupId,
    present: Vec<(PackageName, bool)>,
    catalog: &dyn PackageCatalog,
) -> Vec<(PackageName, bool)> {
    let mut candidates: BTreeMap<PackageName, bool> = present.into_iter().collect();
    for package in catalog.owner_group_members(group) {
        if candidates.contains_key(&package) {
            continue;
        }
        if let Some(info) = catalog.package_info(&package) {
            if info.owner_group == Some(group) {
                candidates.insert(package, info.launchable);
            }
        }
    }
    candidates.into_iter().collect()
}

/// The launchable member, or the first member in key order.
fn group_primary(members: &[(PackageName, bool)]) -> Option<PackageName> {
    members
        .iter()
        .find(|(_, launchable)| *launchable)
        .or_else(|| members.first())
        .map(|(package, _)| package.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::{DateTime, TimeZone, Utc};

    use crate::source::PackageInfo;

    struct Catalog(HashMap<String, PackageInfo>);

    impl PackageCatalog for Catalog {
        fn package_info(&self, package: &PackageName) -> Option<PackageInfo> {
            self.0.get(package.as_str()).cloned()
        }

        fn owner_group_members(&self, group: OwnerGroupId) -> Vec<PackageName> {
            self.0
                .iter()
                .filter(|(_, info)| info.owner_group == Some(group))
                .map(|(name, _)| pkg(name))
                .collect()
        }
    }

    fn pkg(name: &str) -> PackageName {
        PackageName::new(name).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn totals(entries: &[(&str, i64, i64)]) -> UsageTotals {
        entries
            .iter()
            .map(|(name, duration_ms, last_used)| {
                (
                    pkg(name),
                    SessionTotals {
                        duration_ms: *duration_ms,
                        last_used_at: Some(at(*last_used)),
                        members: std::iter::once(pkg(name)).collect(),
                    },
                )
            })
            .collect()
    }

    fn shared_owner_catalog() -> Catalog {
        let mut map = HashMap::new();
        map.insert(
            "com.vendor.app".to_string(),
            PackageInfo::user_app("Vendor").with_owner_group(1001),
        );
        map.insert(
            "com.vendor.helper".to_string(),
            PackageInfo::user_app("Helper")
                .with_owner_group(1001)
                .with_launchable(false),
        );
        map.insert(
            "com.other".to_string(),
            PackageInfo::user_app("Other").with_owner_group(2002),
        );
        Catalog(map)
    }

    #[test]
    fn owner_group_merges_into_launchable_member() {
        let input = totals(&[
            ("com.vendor.helper", 500, 10),
            ("com.vendor.app", 1000, 5),
            ("com.other", 200, 1),
        ]);
        let merged =
            IdentityMerger::new(FamilyTable::empty()).merge(input, &shared_owner_catalog());

        assert_eq!(merged.len(), 2);
        let vendor = &merged[&pkg("com.vendor.app")];
        assert_eq!(vendor.duration_ms, 1500);
        assert_eq!(vendor.last_used_at, Some(at(10)));
        assert!(vendor.members.contains(&pkg("com.vendor.helper")));
        assert!(!merged.contains_key(&pkg("com.vendor.helper")));
    }

    #[test]
    fn owner_group_without_launcher_uses_first_in_key_order() {
        let mut map = HashMap::new();
        for name in ["com.b.service", "com.a.service"] {
            map.insert(
                name.to_string(),
                PackageInfo::user_app(name)
                    .with_owner_group(7)
                    .with_launchable(false),
            );
        }
        let input = totals(&[("com.b.service", 300, 0), ("com.a.service", 100, 0)]);
        let merged = IdentityMerger::new(FamilyTable::empty()).merge(input, &Catalog(map));
        assert_eq!(merged[&pkg("com.a.service")].duration_ms, 400);
    }

    #[test]
    fn unknown_packages_are_left_alone() {
        let input = totals(&[("com.unknown.a", 100, 0), ("com.unknown.b", 100, 0)]);
        let merged =
            IdentityMerger::new(FamilyTable::empty()).merge(input, &Catalog(HashMap::new()));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn family_table_merges_aliases_into_primary() {
        let input = totals(&[
            ("com.android.dialer", 2000, 30),
            ("com.android.incallui", 1000, 50),
            ("com.example", 10, 0),
        ]);
        let merged = IdentityMerger::default().merge(input, &Catalog(HashMap::new()));

        let contacts = &merged[&pkg("com.android.contacts")];
        assert_eq!(contacts.duration_ms, 3000);
        assert_eq!(contacts.last_used_at, Some(at(50)));
        assert!(!merged.contains_key(&pkg("com.android.dialer")));
        assert!(merged.contains_key(&pkg("com.example")));
    }

    #[test]
    fn family_rules_apply_in_order() {
        let table = FamilyTable::new(vec![
            FamilyRule {
                primary: pkg("com.b"),
                aliases: vec![pkg("com.c")],
            },
            FamilyRule {
                primary: pkg("com.a"),
                aliases: vec![pkg("com.b")],
            },
        ]);
        let input = totals(&[("com.b", 10, 0), ("com.c", 20, 0)]);
        let merged = IdentityMerger::new(table).merge(input, &Catalog(HashMap::new()));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[&pkg("com.a")].duration_ms, 30);
    }

    #[test]
    fn merge_is_idempotent() {
        let input = totals(&[
            ("com.vendor.helper", 500, 10),
            ("com.vendor.app", 1000, 5),
            ("com.android.phone", 700, 3),
            ("com.android.contacts", 300, 4),
        ]);
        let merger = IdentityMerger::default();
        let catalog = shared_owner_catalog();
        let once = merger.merge(input, &catalog);
        let twice = merger.merge(once.clone(), &catalog);
        assert_eq!(once, twice);
    }

    #[test]
    fn helper_used_alone_is_reported_under_its_app() {
        let input = totals(&[("com.vendor.helper", 500, 10), ("com.other", 200, 1)]);
        let merged =
            IdentityMerger::new(FamilyTable::empty()).merge(input, &shared_owner_catalog());

        assert!(!merged.contains_key(&pkg("com.vendor.helper")));
        let vendor = &merged[&pkg("com.vendor.app")];
        assert_eq!(vendor.duration_ms, 500);
        assert!(vendor.members.contains(&pkg("com.vendor.helper")));
        assert_eq!(merged[&pkg("com.other")].duration_ms, 200);
    }

    #[test]
    fn logical_key_follows_both_passes() {
        let merger = IdentityMerger::default();
        let catalog = shared_owner_catalog();
        assert_eq!(
            merger.logical_key(&pkg("com.vendor.helper"), &catalog),
            pkg("com.vendor.app")
        );
        assert_eq!(
            merger.logical_key(&pkg("com.vendor.app"), &catalog),
            pkg("com.vendor.app")
        );
        assert_eq!(
            merger.logical_key(&pkg("com.android.dialer"), &catalog),
            pkg("com.android.contacts")
        );
        assert_eq!(
            merger.logical_key(&pkg("com.unknown"), &catalog),
            pkg("com.unknown")
        );
    }

    #[test]
    fn logical_key_matches_merged_key_for_chained_rules() {
        let table = FamilyTable::new(vec![
            FamilyRule {
                primary: pkg("com.b"),
                aliases: vec![pkg("com.c")],
            },
            FamilyRule {
                primary: pkg("com.a"),
                aliases: vec![pkg("com.b")],
            },
        ]);
        let merger = IdentityMerger::new(table);
        let catalog = Catalog(HashMap::new());
        let merged = merger.merge(totals(&[("com.c", 20, 0)]), &catalog);
        let key = merger.logical_key(&pkg("com.c"), &catalog);
        assert_eq!(key, pkg("com.a"));
        assert!(merged.contains_key(&key));
    }

    #[test]
    fn primary_for_finds_alias() {
        let table = FamilyTable::default();
        assert_eq!(
            table.primary_for(&pkg("com.google.android.dialer")),
            Some(&pkg("com.android.contacts"))
        );
        assert_eq!(table.primary_for(&pkg("com.android.contacts")), None);
    }

    #[test]
    fn family_table_deserializes_from_list() {
        let json = r#"[{"primary": "com.a", "aliases": ["com.b", "com.c"]}]"#;
        let table: FamilyTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.rules().len(), 1);
        assert_eq!(table.rules()[0].aliases.len(), 2);
    }
}
