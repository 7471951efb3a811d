//! Session reconstruction.
//!
//! Turns an ordered stream of Resumed/Paused events into per-package
//! foreground durations.
//!
//! # Algorithm Summary
//!
//! 1. A Resumed event opens a session for its package, replacing any stale
//!    open session (unmatched Resumed events are discarded, not summed).
//! 2. A Paused event closes the open session and credits the elapsed time.
//!    Paused events with no open session are ignored.
//! 3. Embedded child views (see [`ChildViewRule`]) are credited to the most
//!    recent top-level package instead of to themselves.
//! 4. A child view suspends its parent's own open session and any other open
//!    child of the same parent; the suspended session reopens when the child
//!    pauses. A package therefore never accrues two overlapping sessions.
//! 5. Sessions still open after the last event are credited up to the window
//!    end, never beyond.
//!
//! Malformed input never errors. Negative deltas contribute nothing, so the
//! worst case is undercounting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{EventKind, RawEvent, RawIdentity};
use crate::types::PackageName;
use crate::usage::{SessionTotals, UsageTotals};

/// Detects identities that are transient views embedded in another app.
///
/// An identity is a child when its package is one of `host_packages` and its
/// view qualifier contains one of `class_markers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildViewRule {
    pub host_packages: Vec<String>,
    pub class_markers: Vec<String>,
}

impl Default for ChildViewRule {
    fn default() -> Self {
        Self {
            host_packages: vec![
                "com.android.chrome".to_string(),
                "com.chrome.beta".to_string(),
                "com.chrome.dev".to_string(),
                "com.chrome.canary".to_string(),
            ],
            class_markers: vec!["CustomTabActivity".to_string(), "customtabs".to_string()],
        }
    }
}

impl ChildViewRule {
    /// A rule that never matches.
    pub const fn none() -> Self {
        Self {
            host_packages: Vec::new(),
            class_markers: Vec::new(),
        }
    }

    pub fn is_child(&self, identity: &RawIdentity) -> bool {
        let Some(view) = identity.view.as_deref() else {
            return false;
        };
        self.host_packages
            .iter()
            .any(|host| host == identity.package.as_str())
            && self
                .class_markers
                .iter()
                .any(|marker| view.contains(marker.as_str()))
    }
}

/// An open child-view session and the parent it will be credited to.
#[derive(Debug, Clone)]
struct ChildSession {
    resumed_at: DateTime<Utc>,
    parent: PackageName,
    /// The parent's own session was open when this child resumed.
    suspended_parent: bool,
}

fn totals_for<'a>(totals: &'a mut UsageTotals, package: &PackageName) -> &'a mut SessionTotals {
    totals.entry(package.clone()).or_insert_with(|| SessionTotals {
        members: std::iter::once(package.clone()).collect(),
        ..SessionTotals::default()
    })
}

fn credit(
    totals: &mut UsageTotals,
    package: &PackageName,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) {
    let delta = (end - start).num_milliseconds();
    // Clock anomalies contribute nothing.
    if delta > 0 {
        totals_for(totals, package).credit(delta, end);
    }
}

/// Closes every open child of `parent` at `at`. Returns whether any of them had
/// suspended the parent's own session.
fn close_children_of(
    totals: &mut UsageTotals,
    open_children: &mut HashMap<RawIdentity, ChildSession>,
    parent: &PackageName,
    at: DateTime<Utc>,
) -> bool {
    let mut suspended_parent = false;
    open_children.retain(|_, child| {
        if child.parent != *parent {
            return true;
        }
        credit(totals, &child.parent, child.resumed_at, at);
        suspended_parent |= child.suspended_parent;
        false
    });
    suspended_parent
}

/// Reconstructs per-package durations from `events`.
///
/// Events must be sorted by timestamp ascending. `window_end` closes any
/// session still open after the last event.
pub fn reconstruct(
    events: &[RawEvent],
    window_end: DateTime<Utc>,
    child_views: &ChildViewRule,
) -> UsageTotals {
    let mut totals = UsageTotals::new();
    let mut open_at: HashMap<PackageName, DateTime<Utc>> = HashMap::new();
    let mut open_children: HashMap<RawIdentity, ChildSession> = HashMap::new();
    let mut last_top_level: Option<PackageName> = None;

    for event in events {
        let identity = &event.identity;
        let package = &identity.package;
        let at = event.timestamp;
        let is_child = child_views.is_child(identity);

        match event.kind {
            EventKind::Resumed => {
                if is_child {
                    if let Some(parent) = &last_top_level {
                        // A stale resume of the same view is discarded, not credited.
                        let mut suspended_parent =
                            open_children.remove(identity).is_some_and(|stale| {
                                stale.suspended_parent && stale.parent == *parent
                            });
                        if let Some(resumed_at) = open_at.remove(parent) {
                            credit(&mut totals, parent, resumed_at, at);
                            suspended_parent = true;
                        }
                        suspended_parent |=
                            close_children_of(&mut totals, &mut open_children, parent, at);
                        open_children.insert(
                            identity.clone(),
                            ChildSession {
                                resumed_at: at,
                                parent: parent.clone(),
                                suspended_parent,
                            },
                        );
                        continue;
                    }
                    // No parent observed yet: the child stands on its own.
                    tracing::trace!(%identity, "child view without parent");
                } else {
                    close_children_of(&mut totals, &mut open_children, package, at);
                    last_top_level = Some(package.clone());
                }
                open_at.insert(package.clone(), at);
                totals_for(&mut totals, package).touch(at);
            }
            EventKind::Paused => {
                if is_child {
                    if let Some(child) = open_children.remove(identity) {
                        credit(&mut totals, &child.parent, child.resumed_at, at);
                        if child.suspended_parent {
                            open_at.entry(child.parent).or_insert(at);
                        }
                        continue;
                    }
                }
                if let Some(resumed_at) = open_at.remove(package) {
                    credit(&mut totals, package, resumed_at, at);
                }
            }
        }
    }

    // Still running at the end of the window.
    for (package, resumed_at) in open_at {
        credit(&mut totals, &package, resumed_at, window_end);
    }
    for child in open_children.into_values() {
        credit(&mut totals, &child.parent, child.resumed_at, window_end);
    }

    totals
}

/// The top-level package of the most recent Resumed event, if any.
///
/// A child view resolves to the top-level package resumed before it within the
/// same event slice. When the slice holds none, it resolves to `parent`, the
/// caller's last known top-level package, and only then to its own package.
pub fn last_resumed(
    events: &[RawEvent],
    child_views: &ChildViewRule,
    parent: Option<&PackageName>,
) -> Option<PackageName> {
    let mut last_top_level: Option<&PackageName> = parent;
    let mut foreground: Option<&PackageName> = None;

    for event in events.iter().filter(|e| e.kind == EventKind::Resumed) {
        let package = &event.identity.package;
        if child_views.is_child(&event.identity) {
            foreground = Some(last_top_level.unwrap_or(package));
        } else {
            last_top_level = Some(package);
            foreground = Some(package);
        }
    }

    foreground.cloned()
}
