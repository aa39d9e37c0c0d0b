//! Dependency Lineage Resolver (§4.2 / §2.2).
//!
//! Resolves a changeset's effective parent branch from explicit metadata
//! and dependency edges, failing closed on ambiguity.

use std::collections::{HashMap, HashSet};

use crate::ticket::{description, Issue};

fn normalize_branch(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn field(issue: &Issue, key: &str) -> Option<String> {
    let fields = issue.description_fields();
    description::normalized_field(&fields, key)
}

pub fn field_present(issue: &Issue, key: &str) -> bool {
    field(issue, key).is_some()
}

pub fn root_branch(issue: &Issue) -> Option<String> {
    field(issue, "changeset.root_branch")
}

pub fn parent_branch(issue: &Issue) -> Option<String> {
    field(issue, "changeset.parent_branch")
}

pub fn work_branch(issue: &Issue) -> Option<String> {
    field(issue, "changeset.work_branch")
}

/// Resolved parent lineage for a changeset issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLineageResolution {
    pub root_branch: Option<String>,
    pub explicit_parent_branch: Option<String>,
    pub effective_parent_branch: Option<String>,
    pub dependency_ids: Vec<String>,
    pub dependency_parent_id: Option<String>,
    pub dependency_parent_branch: Option<String>,
    pub used_dependency_parent: bool,
    pub blocked: bool,
    pub blocker_reason: Option<&'static str>,
    pub diagnostics: Vec<String>,
}

impl ParentLineageResolution {
    pub fn has_dependency_lineage(&self) -> bool {
        !self.dependency_ids.is_empty()
    }
}

/// Memoizing wrapper around a caller-supplied issue lookup closure.
struct CachedLookup<'a> {
    inner: &'a mut dyn FnMut(&str) -> Option<Issue>,
    cache: HashMap<String, Option<Issue>>,
}

impl<'a> CachedLookup<'a> {
    fn new(inner: &'a mut dyn FnMut(&str) -> Option<Issue>) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
        }
    }

    fn get(&mut self, issue_id: &str) -> Option<Issue> {
        if !self.cache.contains_key(issue_id) {
            let loaded = (self.inner)(issue_id);
            self.cache.insert(issue_id.to_string(), loaded);
        }
        self.cache.get(issue_id).cloned().flatten()
    }
}

fn dependency_transitive_closure(
    issue_id: &str,
    lookup: &mut CachedLookup<'_>,
    closure_cache: &mut HashMap<String, HashSet<String>>,
    visiting: &mut HashSet<String>,
) -> HashSet<String> {
    if let Some(cached) = closure_cache.get(issue_id) {
        return cached.clone();
    }
    if visiting.contains(issue_id) {
        return HashSet::new();
    }
    visiting.insert(issue_id.to_string());

    let closure = match lookup.get(issue_id) {
        None => HashSet::new(),
        Some(dependency_issue) => {
            let direct_ids = dependency_issue.dependency_ids();
            let mut expanded: HashSet<String> = direct_ids.iter().cloned().collect();
            for direct_id in &direct_ids {
                let nested =
                    dependency_transitive_closure(direct_id, lookup, closure_cache, visiting);
                expanded.extend(nested);
            }
            expanded
        }
    };

    visiting.remove(issue_id);
    closure_cache.insert(issue_id.to_string(), closure.clone());
    closure
}

/// Drop any candidate id that lies in the transitive dependency closure of
/// another candidate, leaving only the "frontier" (most-downstream) ids.
fn transitive_dependency_frontier(
    candidate_ids: &[String],
    lookup: &mut CachedLookup<'_>,
) -> Vec<String> {
    let mut closure_cache = HashMap::new();
    let candidate_set: HashSet<String> = candidate_ids.iter().cloned().collect();
    let mut covered = HashSet::new();

    for candidate_id in candidate_ids {
        let closure = dependency_transitive_closure(
            candidate_id,
            lookup,
            &mut closure_cache,
            &mut HashSet::new(),
        );
        for dep_id in closure {
            if candidate_set.contains(&dep_id) && &dep_id != candidate_id {
                covered.insert(dep_id);
            }
        }
    }

    candidate_ids
        .iter()
        .filter(|id| !covered.contains(*id))
        .cloned()
        .collect()
}

/// Resolve a changeset's parent branch from metadata and dependencies.
///
/// `lookup_issue` fetches a dependency issue by id; pass `None` when the
/// caller has no dependency-issue source at all (no-dependency fast path).
pub fn resolve_parent_lineage(
    issue: &Issue,
    root_branch_hint: Option<String>,
    lookup_issue: Option<&mut dyn FnMut(&str) -> Option<Issue>>,
) -> ParentLineageResolution {
    let mut no_lookup = |_id: &str| None;
    let mut lookup = CachedLookup::new(lookup_issue.unwrap_or(&mut no_lookup));
    resolve_parent_lineage_inner(issue, root_branch_hint, &mut lookup)
}

/// Resolve parent lineage against the live ticket store.
///
/// `resolve_parent_lineage`'s frontier sweep may recurse into any
/// dependency id discovered while walking the graph, not just `issue`'s own
/// direct dependencies, so this pre-fetches the full transitive dependency
/// closure into a map before handing a synchronous closure over it to the
/// pure resolver.
pub async fn resolve_parent_lineage_live(
    store: &dyn crate::store::TicketStore,
    issue: &Issue,
) -> ParentLineageResolution {
    let mut fetched: HashMap<String, Issue> = HashMap::new();
    let mut frontier: Vec<String> = issue.dependency_ids();
    let mut seen: HashSet<String> = HashSet::new();

    while let Some(id) = frontier.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Ok(dependency_issue) = store.show(&id).await {
            frontier.extend(dependency_issue.dependency_ids());
            fetched.insert(id, dependency_issue);
        }
    }

    let mut lookup_issue = move |id: &str| fetched.get(id).cloned();
    resolve_parent_lineage(issue, None, Some(&mut lookup_issue))
}

fn resolve_parent_lineage_inner(
    issue: &Issue,
    root_branch_hint: Option<String>,
    lookup: &mut CachedLookup<'_>,
) -> ParentLineageResolution {
    let normalized_root =
        normalize_branch(root_branch_hint).or_else(|| normalize_branch(root_branch(issue)));
    let explicit_parent = normalize_branch(parent_branch(issue));
    let dependency_ids = issue.dependency_ids();
    let dependency_parent_hint = issue.parent_child_hint();

    let mut diagnostics = Vec::new();
    let mut dependency_candidates: HashMap<String, String> = HashMap::new();
    let mut missing_dependencies = Vec::new();
    let mut missing_branches = Vec::new();

    for dependency_id in &dependency_ids {
        match lookup.get(dependency_id) {
            None => missing_dependencies.push(dependency_id.clone()),
            Some(dependency_issue) => match normalize_branch(work_branch(&dependency_issue)) {
                None => missing_branches.push(dependency_id.clone()),
                Some(branch) => {
                    dependency_candidates.insert(dependency_id.clone(), branch);
                }
            },
        }
    }

    let mut dependency_parent_id = None;
    let mut dependency_parent_branch = None;
    if let Some(hint) = &dependency_parent_hint {
        if let Some(branch) = dependency_candidates.get(hint) {
            dependency_parent_id = Some(hint.clone());
            dependency_parent_branch = Some(branch.clone());
        }
    }
    if dependency_parent_id.is_none() {
        if dependency_candidates.len() == 1 {
            let (id, branch) = dependency_candidates.iter().next().unwrap();
            dependency_parent_id = Some(id.clone());
            dependency_parent_branch = Some(branch.clone());
        } else if dependency_candidates.len() > 1 {
            let candidate_ids: Vec<String> = dependency_candidates.keys().cloned().collect();
            let frontier_ids = transitive_dependency_frontier(&candidate_ids, lookup);
            if frontier_ids.len() == 1 {
                let id = frontier_ids[0].clone();
                dependency_parent_branch = dependency_candidates.get(&id).cloned();
                dependency_parent_id = Some(id);
            } else {
                let mut unresolved = if frontier_ids.is_empty() {
                    let mut ids: Vec<String> = dependency_candidates.keys().cloned().collect();
                    ids.sort();
                    ids
                } else {
                    let mut ids = frontier_ids;
                    ids.sort();
                    ids
                };
                unresolved.dedup();
                let pairs: Vec<String> = unresolved
                    .iter()
                    .map(|id| format!("{id}->{}", dependency_candidates[id]))
                    .collect();
                diagnostics.push(format!(
                    "ambiguous dependency parent branches: {}",
                    pairs.join(", ")
                ));
            }
        }
    }

    if !missing_dependencies.is_empty() {
        missing_dependencies.sort();
        diagnostics.push(format!(
            "dependency issues unavailable: {}",
            missing_dependencies.join(", ")
        ));
    }
    if !missing_branches.is_empty() {
        missing_branches.sort();
        diagnostics.push(format!(
            "dependency work branches missing: {}",
            missing_branches.join(", ")
        ));
    }

    let needs_dependency_parent = !dependency_ids.is_empty()
        && (explicit_parent.is_none()
            || (normalized_root.is_some() && explicit_parent == normalized_root));

    let mut blocked = false;
    let mut blocker_reason = None;
    let mut used_dependency_parent = false;
    let mut effective_parent = explicit_parent.clone();

    if needs_dependency_parent {
        if let Some(branch) = &dependency_parent_branch {
            effective_parent = Some(branch.clone());
            used_dependency_parent = true;
        } else {
            blocked = true;
            blocker_reason = Some(if dependency_candidates.len() > 1 {
                "dependency-lineage-ambiguous"
            } else {
                "dependency-parent-unresolved"
            });
            effective_parent = None;
        }
    }

    if effective_parent.is_none() {
        effective_parent = normalized_root.clone();
    }

    if used_dependency_parent {
        if let Some(explicit) = &explicit_parent {
            if Some(explicit) != dependency_parent_branch.as_ref() {
                diagnostics.push(format!(
                    "updated collapsed parent lineage {explicit:?} -> {:?}",
                    dependency_parent_branch
                ));
            }
        }
    }

    ParentLineageResolution {
        root_branch: normalized_root,
        explicit_parent_branch: explicit_parent,
        effective_parent_branch: effective_parent,
        dependency_ids,
        dependency_parent_id,
        dependency_parent_branch,
        used_dependency_parent,
        blocked,
        blocker_reason,
        diagnostics,
    }
}
