//! Structured queries over the index: ordered property filters combined
//! with All/Any semantics, evaluated against notes, tasks or both, then
//! sorted, optionally kanban-grouped, and truncated. The same operator
//! machinery drives the habit tracker embed.

pub mod embed;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::habits::{Habit, HabitEntry};
use crate::storage::notes::{Note, Todo};
use crate::storage::properties::EffectiveProperty;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyOperator {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    ContainsAll,
    ContainsAny,
    DateOn,
    DateBefore,
    DateAfter,
    DateOnOrBefore,
    DateOnOrAfter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryResultType {
    Tasks,
    #[default]
    Notes,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub operator: PropertyOperator,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub property: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryViewType {
    #[default]
    Table,
    List,
    Kanban,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanbanSpec {
    pub group_by: String,
    #[serde(default)]
    pub card_fields: Vec<String>,
    #[serde(default = "default_true")]
    pub show_uncategorized: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewSpec {
    #[serde(default)]
    pub view_type: QueryViewType,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub kanban: Option<KanbanSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub result_type: QueryResultType,
    #[serde(default)]
    pub include_completed: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub view: Option<ViewSpec>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryHit {
    Note {
        note: Note,
        properties: Vec<EffectiveProperty>,
        tags: Vec<String>,
    },
    Task {
        todo: Todo,
        note_path: String,
        note_title: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct KanbanGroup {
    pub name: String,
    pub results: Vec<QueryHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResults {
    pub results: Vec<QueryHit>,
    /// Matches before the limit was applied.
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<KanbanGroup>>,
}

/// One evaluated candidate: name → value lookups for the filter machinery.
trait Candidate {
    fn field(&self, key: &str) -> Option<String>;
}

struct NoteCandidate {
    note: Note,
    properties: Vec<EffectiveProperty>,
    tags: Vec<String>,
}

impl Candidate for NoteCandidate {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "title" => Some(self.note.title.clone()),
            "path" => Some(self.note.path.clone()),
            "pinned" => Some(self.note.pinned.to_string()),
            // Inline tags win; a "tags" property fills in when none exist.
            "tags" if !self.tags.is_empty() => Some(self.tags.join(",")),
            _ => self
                .properties
                .iter()
                .find(|p| p.key == key)
                .map(|p| p.value.clone()),
        }
    }
}

struct TaskCandidate {
    todo: Todo,
    note: NoteCandidate,
}

impl Candidate for TaskCandidate {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "description" | "text" => Some(self.todo.description.clone()),
            "completed" => Some(self.todo.completed.to_string()),
            "priority" => self.todo.priority.clone(),
            "context" => self.todo.context.clone(),
            "heading" | "heading_path" if !self.todo.heading_path.is_empty() => {
                Some(self.todo.heading_path.clone())
            }
            "heading" | "heading_path" => None,
            "due_date" | "due" => self
                .todo
                .due_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
            _ => self.note.field(key),
        }
    }
}

pub struct QueryEngine<'a> {
    storage: &'a Storage,
}

impl<'a> QueryEngine<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub fn run(&self, request: &QueryRequest) -> Result<QueryResults> {
        validate_filters(&request.filters)?;
        let mut hits: Vec<QueryHit> = Vec::new();

        if matches!(
            request.result_type,
            QueryResultType::Notes | QueryResultType::Both
        ) {
            for candidate in self.note_candidates()? {
                if evaluate(&candidate, &request.filters, request.match_mode) {
                    hits.push(QueryHit::Note {
                        note: candidate.note,
                        properties: candidate.properties,
                        tags: candidate.tags,
                    });
                }
            }
        }

        if matches!(
            request.result_type,
            QueryResultType::Tasks | QueryResultType::Both
        ) {
            for candidate in self.task_candidates()? {
                if candidate.todo.completed && !request.include_completed {
                    continue;
                }
                if evaluate(&candidate, &request.filters, request.match_mode) {
                    hits.push(QueryHit::Task {
                        note_path: candidate.note.note.path.clone(),
                        note_title: candidate.note.note.title.clone(),
                        todo: candidate.todo,
                    });
                }
            }
        }

        if let Some(sort) = request.view.as_ref().and_then(|v| v.sort.as_ref()) {
            sort_hits(&mut hits, sort);
        }

        let total_count = hits.len();
        if let Some(limit) = request.limit {
            hits.truncate(limit);
        }

        let groups = request
            .view
            .as_ref()
            .and_then(|v| v.kanban.as_ref())
            .map(|kanban| group_hits(&hits, kanban));

        Ok(QueryResults {
            results: hits,
            total_count,
            groups,
        })
    }

    fn note_candidates(&self) -> Result<Vec<NoteCandidate>> {
        let mut candidates = Vec::new();
        for note in self.storage.list_notes()? {
            let properties = self.storage.effective_properties(note.id, &note.path)?;
            let tags = self.storage.tags_for(note.id)?;
            candidates.push(NoteCandidate {
                note,
                properties,
                tags,
            });
        }
        Ok(candidates)
    }

    fn task_candidates(&self) -> Result<Vec<TaskCandidate>> {
        let notes = self.note_candidates()?;
        let mut candidates = Vec::new();
        for todo in self.storage.list_todos()? {
            if let Some(note) = notes.iter().find(|n| n.note.id == todo.note_id) {
                candidates.push(TaskCandidate {
                    todo,
                    note: NoteCandidate {
                        note: note.note.clone(),
                        properties: note.properties.clone(),
                        tags: note.tags.clone(),
                    },
                });
            }
        }
        Ok(candidates)
    }

    /// Habit-tracker embed: the identical filter machinery over habit and
    /// entry fields. Entry-level keys (`date`, `value`, `entry_notes`) match
    /// when any entry in the range matches.
    pub fn run_habit_query(
        &self,
        filters: &[Filter],
        match_mode: MatchMode,
        include_archived: bool,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<(Habit, Vec<HabitEntry>)>> {
        validate_filters(filters)?;
        let mut out = Vec::new();
        for habit in self.storage.list_habits(include_archived)? {
            let entries = match range {
                Some((start, end)) => self.storage.habit_entries_for_range(habit.id, start, end)?,
                None => self.storage.habit_entries_for_range(
                    habit.id,
                    NaiveDate::MIN,
                    NaiveDate::MAX,
                )?,
            };
            let candidate = HabitCandidate {
                habit: &habit,
                entries: &entries,
            };
            if evaluate(&candidate, filters, match_mode) {
                out.push((habit, entries));
            }
        }
        Ok(out)
    }
}

struct HabitCandidate<'a> {
    habit: &'a Habit,
    entries: &'a [HabitEntry],
}

impl Candidate for HabitCandidate<'_> {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.habit.name.clone()),
            "type" => Some(self.habit.habit_type.as_str().to_string()),
            "unit" => self.habit.unit.clone(),
            "color" => self.habit.color.clone(),
            "archived" => Some(self.habit.archived.to_string()),
            "target_value" => self.habit.target_value.map(|v| v.to_string()),
            // Entry-level keys: comma-joined so membership operators work.
            "date" => join_nonempty(self.entries.iter().map(|e| e.date.format("%Y-%m-%d").to_string())),
            "value" => join_nonempty(self.entries.iter().map(|e| e.value.clone())),
            "entry_notes" => {
                join_nonempty(self.entries.iter().filter_map(|e| e.notes.clone()))
            }
            _ => None,
        }
    }
}

fn join_nonempty(items: impl Iterator<Item = String>) -> Option<String> {
    let joined: Vec<String> = items.collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined.join(","))
    }
}

/// Every operator except Exists/NotExists needs a comparison value; a filter
/// missing one is a malformed query, not an empty match.
fn validate_filters(filters: &[Filter]) -> Result<()> {
    for filter in filters {
        let takes_value = !matches!(
            filter.operator,
            PropertyOperator::Exists | PropertyOperator::NotExists
        );
        if takes_value && filter.value.is_none() {
            return Err(Error::InvalidQuery(format!(
                "operator {:?} on key {:?} requires a value",
                filter.operator, filter.key
            )));
        }
    }
    Ok(())
}

/// Combines filter verdicts per match mode. An empty filter list matches
/// everything in both modes.
fn evaluate(candidate: &dyn Candidate, filters: &[Filter], mode: MatchMode) -> bool {
    if filters.is_empty() {
        return true;
    }
    match mode {
        MatchMode::All => filters.iter().all(|f| matches(candidate, f)),
        MatchMode::Any => filters.iter().any(|f| matches(candidate, f)),
    }
}

fn matches(candidate: &dyn Candidate, filter: &Filter) -> bool {
    let actual = candidate.field(&filter.key);

    match filter.operator {
        PropertyOperator::Exists => return actual.as_deref().is_some_and(|v| !v.is_empty()),
        PropertyOperator::NotExists => return !actual.as_deref().is_some_and(|v| !v.is_empty()),
        _ => {}
    }

    let (Some(actual), Some(expected)) = (actual, filter.value.as_deref()) else {
        return false;
    };

    match filter.operator {
        PropertyOperator::Exists | PropertyOperator::NotExists => unreachable!(),
        PropertyOperator::Equals => actual == expected,
        PropertyOperator::NotEquals => actual != expected,
        PropertyOperator::Contains => actual.to_lowercase().contains(&expected.to_lowercase()),
        PropertyOperator::StartsWith => {
            actual.to_lowercase().starts_with(&expected.to_lowercase())
        }
        PropertyOperator::EndsWith => actual.to_lowercase().ends_with(&expected.to_lowercase()),
        PropertyOperator::ContainsAll => {
            let items = split_list(&actual);
            split_list(expected).iter().all(|e| items.contains(e))
        }
        PropertyOperator::ContainsAny => {
            let items = split_list(&actual);
            split_list(expected).iter().any(|e| items.contains(e))
        }
        PropertyOperator::DateOn
        | PropertyOperator::DateBefore
        | PropertyOperator::DateAfter
        | PropertyOperator::DateOnOrBefore
        | PropertyOperator::DateOnOrAfter => {
            // The filter side must parse as a calendar date; the candidate
            // side may be a list, matching when any item satisfies the
            // comparison. Time components are ignored.
            let Some(e) = parse_date(expected) else {
                return false;
            };
            split_list(&actual)
                .iter()
                .filter_map(|item| parse_date(item))
                .any(|a| match filter.operator {
                    PropertyOperator::DateOn => a == e,
                    PropertyOperator::DateBefore => a < e,
                    PropertyOperator::DateAfter => a > e,
                    PropertyOperator::DateOnOrBefore => a <= e,
                    PropertyOperator::DateOnOrAfter => a >= e,
                    _ => unreachable!(),
                })
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let date_part = value.split(|c| c == 'T' || c == ' ').next().unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn hit_field(hit: &QueryHit, key: &str) -> Option<String> {
    match hit {
        QueryHit::Note {
            note,
            properties,
            tags,
        } => NoteCandidate {
            note: note.clone(),
            properties: properties.clone(),
            tags: tags.clone(),
        }
        .field(key),
        QueryHit::Task {
            todo,
            note_path,
            note_title,
        } => match key {
            "description" | "text" => Some(todo.description.clone()),
            "completed" => Some(todo.completed.to_string()),
            "priority" => todo.priority.clone(),
            "context" => todo.context.clone(),
            "heading" | "heading_path" => Some(todo.heading_path.clone()),
            "due_date" | "due" => todo.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            "path" => Some(note_path.clone()),
            "title" => Some(note_title.clone()),
            _ => None,
        },
    }
}

/// Stable sort: dates chronologically when both sides parse, strings by
/// ordinal comparison otherwise; missing values sort last; ties keep
/// insertion order.
fn sort_hits(hits: &mut [QueryHit], sort: &SortSpec) {
    hits.sort_by(|a, b| {
        let va = hit_field(a, &sort.property);
        let vb = hit_field(b, &sort.property);
        let ordering = match (va, vb) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some(_), None) => std::cmp::Ordering::Less,
            (Some(a), Some(b)) => match (parse_date(&a), parse_date(&b)) {
                (Some(da), Some(db)) => da.cmp(&db),
                _ => a.cmp(&b),
            },
        };
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

/// Partitions hits by the value of `group_by`; hits with no value land in
/// "Uncategorized" unless suppressed. Groups are ordered by name with
/// Uncategorized last.
fn group_hits(hits: &[QueryHit], kanban: &KanbanSpec) -> Vec<KanbanGroup> {
    const UNCATEGORIZED: &str = "Uncategorized";
    let mut groups: Vec<KanbanGroup> = Vec::new();

    for hit in hits {
        let name = match hit_field(hit, &kanban.group_by) {
            Some(v) if !v.is_empty() => v,
            _ if kanban.show_uncategorized => UNCATEGORIZED.to_string(),
            _ => continue,
        };
        match groups.iter_mut().find(|g| g.name == name) {
            Some(group) => group.results.push(hit.clone()),
            None => groups.push(KanbanGroup {
                name,
                results: vec![hit.clone()],
            }),
        }
    }

    groups.sort_by(|a, b| match (a.name == UNCATEGORIZED, b.name == UNCATEGORIZED) {
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        _ => a.name.cmp(&b.name),
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::habits::HabitType;
    use crate::vault::analyzer::Analyzer;

    fn seeded() -> Storage {
        let storage = Storage::open_in_memory().unwrap();
        let analyzer = Analyzer::new().unwrap();

        let docs = [
            ("alpha.md", "# Alpha\n- [ ] ship alpha due:2025-12-01 priority:high\n"),
            ("beta.md", "# Beta\n- [x] done already\n"),
            ("gamma.md", "# Gamma\nno tasks here\n"),
        ];
        for (path, raw) in docs {
            let analysis = analyzer.analyze(raw);
            let title = analysis.title.clone().unwrap();
            storage.index_note(path, &title, path, &analysis).unwrap();
        }
        storage
    }

    fn note_id(storage: &Storage, path: &str) -> i64 {
        storage.get_note_by_path(path).unwrap().unwrap().id
    }

    fn filter(key: &str, operator: PropertyOperator, value: Option<&str>) -> Filter {
        Filter {
            key: key.to_string(),
            operator,
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_equals_filter_counts() {
        let storage = seeded();
        storage
            .set_property(note_id(&storage, "alpha.md"), "priority", "high", "text")
            .unwrap();
        storage
            .set_property(note_id(&storage, "beta.md"), "priority", "high", "text")
            .unwrap();
        storage
            .set_property(note_id(&storage, "gamma.md"), "priority", "low", "text")
            .unwrap();

        let results = QueryEngine::new(&storage)
            .run(&QueryRequest {
                filters: vec![filter("priority", PropertyOperator::Equals, Some("high"))],
                match_mode: MatchMode::All,
                result_type: QueryResultType::Notes,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(results.total_count, 2);
        let paths: Vec<_> = results
            .results
            .iter()
            .map(|h| match h {
                QueryHit::Note { note, .. } => note.path.as_str(),
                _ => panic!("expected note"),
            })
            .collect();
        assert_eq!(paths, vec!["alpha.md", "beta.md"]);
    }

    #[test]
    fn test_value_operator_without_value_is_invalid() {
        let storage = seeded();
        let engine = QueryEngine::new(&storage);

        let err = engine
            .run(&QueryRequest {
                filters: vec![filter("priority", PropertyOperator::Equals, None)],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));

        let err = engine
            .run_habit_query(
                &[filter("name", PropertyOperator::Contains, None)],
                MatchMode::All,
                false,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));

        // Exists/NotExists legitimately carry no value.
        assert!(engine
            .run(&QueryRequest {
                filters: vec![filter("priority", PropertyOperator::Exists, None)],
                ..Default::default()
            })
            .is_ok());
    }

    #[test]
    fn test_date_operators() {
        let storage = seeded();
        let engine = QueryEngine::new(&storage);
        let run = |op, value: &str| {
            engine
                .run(&QueryRequest {
                    filters: vec![filter("due_date", op, Some(value))],
                    result_type: QueryResultType::Tasks,
                    ..Default::default()
                })
                .unwrap()
                .total_count
        };

        // Task due 2025-12-01.
        assert_eq!(run(PropertyOperator::DateOnOrBefore, "2025-12-01"), 1);
        assert_eq!(run(PropertyOperator::DateBefore, "2025-12-02"), 1);
        assert_eq!(run(PropertyOperator::DateAfter, "2025-12-01"), 0);
        assert_eq!(run(PropertyOperator::DateOn, "2025-12-01"), 1);
    }

    #[test]
    fn test_contains_any_and_all() {
        let storage = seeded();
        storage
            .set_property(note_id(&storage, "alpha.md"), "tags", "urgent,work", "list")
            .unwrap();
        let engine = QueryEngine::new(&storage);
        let run = |op, value: &str| {
            engine
                .run(&QueryRequest {
                    filters: vec![filter("tags", op, Some(value))],
                    ..Default::default()
                })
                .unwrap()
                .total_count
        };

        assert_eq!(run(PropertyOperator::ContainsAny, "urgent,home"), 1);
        assert_eq!(run(PropertyOperator::ContainsAll, "urgent,home"), 0);
        assert_eq!(run(PropertyOperator::ContainsAll, "urgent,work"), 1);
    }

    #[test]
    fn test_completed_tasks_excluded_by_default() {
        let storage = seeded();
        let engine = QueryEngine::new(&storage);

        let open_only = engine
            .run(&QueryRequest {
                result_type: QueryResultType::Tasks,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(open_only.total_count, 1);

        let all = engine
            .run(&QueryRequest {
                result_type: QueryResultType::Tasks,
                include_completed: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(all.total_count, 2);
    }

    #[test]
    fn test_any_mode_and_exists() {
        let storage = seeded();
        storage
            .set_property(note_id(&storage, "alpha.md"), "status", "active", "text")
            .unwrap();
        storage
            .set_property(note_id(&storage, "beta.md"), "owner", "sam", "text")
            .unwrap();

        let results = QueryEngine::new(&storage)
            .run(&QueryRequest {
                filters: vec![
                    filter("status", PropertyOperator::Exists, None),
                    filter("owner", PropertyOperator::Exists, None),
                ],
                match_mode: MatchMode::Any,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.total_count, 2);

        let none = QueryEngine::new(&storage)
            .run(&QueryRequest {
                filters: vec![
                    filter("status", PropertyOperator::Exists, None),
                    filter("owner", PropertyOperator::Exists, None),
                ],
                match_mode: MatchMode::All,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(none.total_count, 0);
    }

    #[test]
    fn test_not_exists() {
        let storage = seeded();
        storage
            .set_property(note_id(&storage, "alpha.md"), "status", "active", "text")
            .unwrap();

        let results = QueryEngine::new(&storage)
            .run(&QueryRequest {
                filters: vec![filter("status", PropertyOperator::NotExists, None)],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.total_count, 2);
    }

    #[test]
    fn test_sort_and_limit() {
        let storage = seeded();
        storage
            .set_property(note_id(&storage, "alpha.md"), "rank", "c", "text")
            .unwrap();
        storage
            .set_property(note_id(&storage, "beta.md"), "rank", "a", "text")
            .unwrap();
        storage
            .set_property(note_id(&storage, "gamma.md"), "rank", "b", "text")
            .unwrap();

        let results = QueryEngine::new(&storage)
            .run(&QueryRequest {
                limit: Some(2),
                view: Some(ViewSpec {
                    sort: Some(SortSpec {
                        property: "rank".to_string(),
                        direction: SortDirection::Asc,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .unwrap();

        // total_count counts matches before the limit.
        assert_eq!(results.total_count, 3);
        assert_eq!(results.results.len(), 2);
        let first = match &results.results[0] {
            QueryHit::Note { note, .. } => note.path.clone(),
            _ => panic!(),
        };
        assert_eq!(first, "beta.md");
    }

    #[test]
    fn test_kanban_grouping_with_uncategorized() {
        let storage = seeded();
        storage
            .set_property(note_id(&storage, "alpha.md"), "status", "doing", "text")
            .unwrap();
        storage
            .set_property(note_id(&storage, "beta.md"), "status", "done", "text")
            .unwrap();

        let results = QueryEngine::new(&storage)
            .run(&QueryRequest {
                view: Some(ViewSpec {
                    view_type: QueryViewType::Kanban,
                    kanban: Some(KanbanSpec {
                        group_by: "status".to_string(),
                        card_fields: vec![],
                        show_uncategorized: true,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .unwrap();

        let groups = results.groups.unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["doing", "done", "Uncategorized"]);
        assert_eq!(groups[2].results.len(), 1);
    }

    #[test]
    fn test_kanban_suppresses_uncategorized() {
        let storage = seeded();
        storage
            .set_property(note_id(&storage, "alpha.md"), "status", "doing", "text")
            .unwrap();

        let results = QueryEngine::new(&storage)
            .run(&QueryRequest {
                view: Some(ViewSpec {
                    kanban: Some(KanbanSpec {
                        group_by: "status".to_string(),
                        card_fields: vec![],
                        show_uncategorized: false,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .unwrap();

        let groups = results.groups.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "doing");
    }

    #[test]
    fn test_inherited_properties_are_queryable() {
        let storage = Storage::open_in_memory().unwrap();
        let analyzer = Analyzer::new().unwrap();
        let analysis = analyzer.analyze("# In Project\n");
        storage
            .index_note("projects/x/n.md", "In Project", "h", &analysis)
            .unwrap();
        storage
            .set_folder_property("projects/x", "status", "active", "text")
            .unwrap();

        let results = QueryEngine::new(&storage)
            .run(&QueryRequest {
                filters: vec![filter("status", PropertyOperator::Equals, Some("active"))],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.total_count, 1);
    }

    #[test]
    fn test_habit_query_uses_same_operators() {
        let storage = Storage::open_in_memory().unwrap();
        let reading = storage
            .create_habit("reading", HabitType::Number, Some("pages"), None, None)
            .unwrap();
        let archived = storage
            .create_habit("old", HabitType::Boolean, None, None, None)
            .unwrap();
        storage.archive_habit(archived.id, true).unwrap();
        storage
            .log_habit_entry(
                reading.id,
                NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                None,
                "30",
                None,
            )
            .unwrap();

        let engine = QueryEngine::new(&storage);
        let hits = engine
            .run_habit_query(
                &[filter("type", PropertyOperator::Equals, Some("number"))],
                MatchMode::All,
                false,
                None,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.name, "reading");
        assert_eq!(hits[0].1.len(), 1);

        let by_date = engine
            .run_habit_query(
                &[filter("date", PropertyOperator::DateOnOrAfter, Some("2026-01-01"))],
                MatchMode::All,
                false,
                None,
            )
            .unwrap();
        assert_eq!(by_date.len(), 1);
    }
}
