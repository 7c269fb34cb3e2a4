//! Remediation work items and sprint plans.
//!
//! Work items are created when an integration review rejects a batch. Their
//! [`WorkItemKind`] is decided once, at creation, and drives which role
//! executes them. A [`SprintPlan`] groups item titles into ordered sprints; it
//! comes either from the Project Manager's `PlanWork` action or from the local
//! [`SprintPlan::schedule`] fallback.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::outcome::value_to_strings;
use crate::WorkItemTitle;

/// Effort assigned to items that do not state a usable estimate.
pub const DEFAULT_EFFORT: u32 = 3;

/// Effort points one sprint may hold when the local scheduler builds a plan.
pub const DEFAULT_SPRINT_CAPACITY: u32 = 8;

const REMEDIATION_PREFIX: &str = "Fix Integration Issue: ";

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Urgency of a work item. Orders `High < Medium < Low` so sorting ascending
/// puts the most urgent first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Case-insensitive parse; anything unrecognised is `Medium`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" | "urgent" | "p0" | "p1" => Priority::High,
            "low" | "minor" | "p3" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        Priority::parse(&value)
    }
}

// ---------------------------------------------------------------------------
// Work item kind
// ---------------------------------------------------------------------------

/// What executing a work item means; decides the executing role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemKind {
    /// Write or extend tests.
    Test,
    /// Build new functionality.
    Implementation,
    /// Rework existing code to resolve a finding.
    Review,
}

impl WorkItemKind {
    /// Parses an explicit kind label.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "test" | "tests" | "testing" => Some(WorkItemKind::Test),
            "implementation" | "implement" | "feature" => Some(WorkItemKind::Implementation),
            "review" | "fix" | "refactor" => Some(WorkItemKind::Review),
            _ => None,
        }
    }

    /// Classifies an item from its title when no explicit kind was given.
    pub fn classify(title: &str) -> Self {
        let lower = title.to_ascii_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let is_test = tokens.iter().any(|t| t.starts_with("test"));
        let is_build = tokens.iter().any(|t| {
            ["implement", "create", "build"].iter().any(|w| t.starts_with(w))
                || matches!(*t, "add" | "adds" | "added" | "adding")
        });
        if is_test {
            WorkItemKind::Test
        } else if is_build {
            WorkItemKind::Implementation
        } else {
            WorkItemKind::Review
        }
    }
}

// ---------------------------------------------------------------------------
// Work item
// ---------------------------------------------------------------------------

/// A unit of remediation work derived from an integration review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub title: WorkItemTitle,
    pub description: String,
    pub priority: Priority,
    pub dependencies: BTreeSet<WorkItemTitle>,
    /// Always at least 1.
    pub estimated_effort: u32,
    pub kind: WorkItemKind,
}

impl WorkItem {
    /// The item synthesised for an integration conflict the reviewer did not
    /// turn into work itself.
    pub fn remediation(conflict: &str) -> Option<Self> {
        let conflict = conflict.trim();
        if conflict.is_empty() {
            return None;
        }
        let title = WorkItemTitle::new(format!("{}{}", REMEDIATION_PREFIX, conflict))?;
        Some(Self {
            title,
            description: format!("Resolve the integration conflict: {}", conflict),
            priority: Priority::High,
            dependencies: BTreeSet::new(),
            estimated_effort: DEFAULT_EFFORT,
            kind: WorkItemKind::Review,
        })
    }

    /// Reads a work item from LLM output.
    ///
    /// Accepts a bare string (used as the title) or a mapping with `title`
    /// (or `name`), and optional `description`, `priority`, `dependencies`,
    /// `estimated_effort` (or `effort`) and `kind` (or `type`).
    pub fn from_value(value: &Value) -> Option<Self> {
        let (title, fields) = match value {
            Value::String(s) => (s.trim().to_string(), None),
            Value::Object(map) => {
                let title = ["title", "name", "task"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))?
                    .trim()
                    .to_string();
                (title, Some(map))
            }
            _ => return None,
        };
        let title = WorkItemTitle::new(title)?;
        let Some(map) = fields else {
            return Some(Self {
                description: title.as_str().to_string(),
                kind: WorkItemKind::classify(title.as_str()),
                title,
                priority: Priority::default(),
                dependencies: BTreeSet::new(),
                estimated_effort: DEFAULT_EFFORT,
            });
        };

        let description = map
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| title.as_str().to_string());
        let priority = map
            .get("priority")
            .and_then(Value::as_str)
            .map(Priority::parse)
            .unwrap_or_default();
        let dependencies = map
            .get("dependencies")
            .map(value_to_strings)
            .unwrap_or_default()
            .into_iter()
            .filter_map(WorkItemTitle::new)
            .filter(|dep| dep != &title)
            .collect();
        let estimated_effort = map
            .get("estimated_effort")
            .or_else(|| map.get("effort"))
            .and_then(parse_effort)
            .unwrap_or(DEFAULT_EFFORT);
        let kind = map
            .get("kind")
            .or_else(|| map.get("type"))
            .and_then(Value::as_str)
            .and_then(WorkItemKind::parse)
            .unwrap_or_else(|| WorkItemKind::classify(title.as_str()));

        Some(Self {
            title,
            description,
            priority,
            dependencies,
            estimated_effort,
            kind,
        })
    }

    /// Reads a list of work items, dropping unusable entries and titles that
    /// repeat an earlier one case-insensitively.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        let mut seen = HashSet::new();
        let items: Vec<Value> = match value {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        };
        items
            .iter()
            .filter_map(WorkItem::from_value)
            .filter(|item| seen.insert(title_key(item.title.as_str())))
            .collect()
    }
}

fn parse_effort(value: &Value) -> Option<u32> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if raw.is_finite() && raw >= 1.0 {
        Some(raw.round().min(f64::from(u32::MAX)) as u32)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Sprint plan
// ---------------------------------------------------------------------------

/// Work item titles grouped into sprints, iterated in ascending sprint order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintPlan {
    pub sprints: BTreeMap<u32, Vec<WorkItemTitle>>,
    pub dependencies: BTreeMap<WorkItemTitle, BTreeSet<WorkItemTitle>>,
    pub effort_per_sprint: BTreeMap<u32, u32>,
}

impl SprintPlan {
    /// `true` when no sprint lists any title.
    pub fn is_empty(&self) -> bool {
        self.sprints.values().all(Vec::is_empty)
    }

    /// `true` when at least one scheduled title names one of `items`.
    pub fn references_any(&self, items: &[WorkItem]) -> bool {
        let known: HashSet<String> = items.iter().map(|i| title_key(i.title.as_str())).collect();
        self.sprints
            .values()
            .flatten()
            .any(|title| known.contains(&title_key(title.as_str())))
    }

    /// Reads a plan from a `PlanWork` document.
    ///
    /// `sprints` may be a mapping keyed by sprint id (`"1"`, `"sprint_2"`,
    /// `"Sprint 3"`), a list of title lists, or a list of
    /// `{"sprint": n, "items": [...]}` records. Items may be titles or
    /// mappings with a `title`. Anything unreadable is skipped.
    pub fn from_document(doc: &Map<String, Value>) -> Self {
        let mut plan = SprintPlan::default();

        match doc.get("sprints") {
            Some(Value::Object(map)) => {
                for (position, (key, items)) in map.iter().enumerate() {
                    let id = sprint_id_from_key(key).unwrap_or(position as u32 + 1);
                    plan.sprints.entry(id).or_default().extend(titles_from(items));
                }
            }
            Some(Value::Array(list)) => {
                for (position, entry) in list.iter().enumerate() {
                    let fallback = position as u32 + 1;
                    match entry {
                        Value::Object(record) => {
                            let id = record
                                .get("sprint")
                                .or_else(|| record.get("id"))
                                .and_then(sprint_id_from_value)
                                .unwrap_or(fallback);
                            let items = ["items", "work_items", "tasks"]
                                .iter()
                                .find_map(|k| record.get(*k))
                                .unwrap_or(&Value::Null);
                            plan.sprints.entry(id).or_default().extend(titles_from(items));
                        }
                        other => {
                            plan.sprints.entry(fallback).or_default().extend(titles_from(other));
                        }
                    }
                }
            }
            _ => {}
        }

        if let Some(Value::Object(deps)) = doc.get("dependencies") {
            for (title, prerequisites) in deps {
                if let Some(title) = WorkItemTitle::new(title.clone()) {
                    let set: BTreeSet<WorkItemTitle> = value_to_strings(prerequisites)
                        .into_iter()
                        .filter_map(WorkItemTitle::new)
                        .collect();
                    if !set.is_empty() {
                        plan.dependencies.insert(title, set);
                    }
                }
            }
        }

        if let Some(Value::Object(efforts)) = doc.get("effort_per_sprint") {
            for (position, (key, points)) in efforts.iter().enumerate() {
                let id = sprint_id_from_key(key).unwrap_or(position as u32 + 1);
                if let Some(points) = parse_effort(points) {
                    plan.effort_per_sprint.insert(id, points);
                }
            }
        }

        plan
    }

    /// Document form used as the `PlanWork` payload and as prompt context.
    pub fn to_document(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Builds a plan locally.
    ///
    /// Each sprint takes ready items (all known prerequisites done in earlier
    /// sprints) in priority order, then input order, until `capacity` effort
    /// points are used. A sprint always takes at least one item, so oversized
    /// items and dependency cycles still make progress.
    pub fn schedule(items: &[WorkItem], capacity: u32) -> Self {
        let capacity = capacity.max(1);
        let known: HashSet<&WorkItemTitle> = items.iter().map(|i| &i.title).collect();

        let mut pending: Vec<(usize, &WorkItem)> = items.iter().enumerate().collect();
        pending.sort_by_key(|(index, item)| (item.priority, *index));

        let mut plan = SprintPlan::default();
        let mut done: HashSet<&WorkItemTitle> = HashSet::new();
        let mut sprint = 0u32;

        while !pending.is_empty() {
            sprint += 1;
            let mut used = 0u32;
            let mut taken: Vec<&WorkItem> = Vec::new();

            pending.retain(|(_, item)| {
                let ready = item
                    .dependencies
                    .iter()
                    .filter(|dep| known.contains(dep))
                    .all(|dep| done.contains(dep));
                let fits = taken.is_empty() || used + item.estimated_effort <= capacity;
                if ready && fits {
                    used += item.estimated_effort;
                    taken.push(*item);
                    false
                } else {
                    true
                }
            });

            if taken.is_empty() {
                // Every remaining item waits on another: break the cycle.
                let (_, item) = pending.remove(0);
                used = item.estimated_effort;
                taken.push(item);
            }

            for item in taken.iter().copied() {
                done.insert(&item.title);
                if !item.dependencies.is_empty() {
                    plan.dependencies.insert(item.title.clone(), item.dependencies.clone());
                }
            }
            plan.sprints
                .insert(sprint, taken.iter().map(|i| i.title.clone()).collect());
            plan.effort_per_sprint.insert(sprint, used);
        }

        plan
    }

    /// Resolves the plan against `items`.
    ///
    /// Returns `(sprint id, items)` in ascending sprint order. Titles match
    /// case-insensitively; unknown titles are skipped and an item is executed
    /// at most once. Items the plan never mentions are appended as one final
    /// sprint so nothing is dropped.
    pub fn resolve<'a>(&self, items: &'a [WorkItem]) -> Vec<(u32, Vec<&'a WorkItem>)> {
        // Items sharing a title key are handed out in list order, one per
        // mention.
        let mut by_key: HashMap<String, VecDeque<usize>> = HashMap::new();
        for (index, item) in items.iter().enumerate() {
            by_key
                .entry(title_key(item.title.as_str()))
                .or_default()
                .push_back(index);
        }
        let mut scheduled = vec![false; items.len()];
        let mut resolved = Vec::new();

        for (id, titles) in &self.sprints {
            let mut sprint_items: Vec<&WorkItem> = Vec::new();
            for title in titles {
                match by_key.get_mut(&title_key(title.as_str())).and_then(VecDeque::pop_front) {
                    Some(index) => {
                        scheduled[index] = true;
                        sprint_items.push(&items[index]);
                    }
                    None => {
                        tracing::debug!(sprint = id, title = %title, "Plan references an unknown work item")
                    }
                }
            }
            if !sprint_items.is_empty() {
                resolved.push((*id, sprint_items));
            }
        }

        let leftovers: Vec<&WorkItem> = items
            .iter()
            .zip(&scheduled)
            .filter(|(_, done)| !**done)
            .map(|(item, _)| item)
            .collect();
        if !leftovers.is_empty() {
            let next = resolved.last().map(|(id, _)| id + 1).unwrap_or(1);
            resolved.push((next, leftovers));
        }
        resolved
    }
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

fn titles_from(value: &Value) -> Vec<WorkItemTitle> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => WorkItemTitle::new(s.trim()),
                Value::Object(map) => map
                    .get("title")
                    .or_else(|| map.get("name"))
                    .and_then(Value::as_str)
                    .and_then(|s| WorkItemTitle::new(s.trim())),
                _ => None,
            })
            .collect(),
        Value::String(s) => WorkItemTitle::new(s.trim()).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn sprint_id_from_key(key: &str) -> Option<u32> {
    let digits: String = key
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn sprint_id_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => sprint_id_from_key(s),
        _ => None,
    }
}
