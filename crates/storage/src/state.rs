//! The answer state tree and the patches that update it.
//!
//! Answers are addressed three ways:
//!
//! - pages outside any section write to [`AnswerState::fields`];
//! - pages in a section write to `sections[section]` as flat fields;
//! - repeat pages write to `sections[section][iteration][page]`.
//!
//! A [`StatePatch`] names exactly one of these addresses, so applying it
//! can never touch another iteration's answers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Field name to answer value.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Accumulated answers for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerState {
    /// Answers from pages that belong to no section.
    #[serde(default)]
    pub fields: Fields,
    #[serde(default)]
    pub sections: BTreeMap<String, SectionState>,
    /// Visited page URLs, used for back links.
    #[serde(default)]
    pub progress: Vec<String>,
    /// Upload storage locations mapped back to user-facing filenames.
    #[serde(default)]
    pub original_filenames: BTreeMap<String, OriginalFilename>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalFilename {
    pub location: String,
    pub original_filename: String,
}

/// State stored under a section name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionState {
    Repeated(Vec<Iteration>),
    Flat(Fields),
}

impl SectionState {
    fn shape(&self) -> &'static str {
        match self {
            SectionState::Repeated(_) => "repeated",
            SectionState::Flat(_) => "flat",
        }
    }
}

/// Answers from one pass through a repeated block of pages, keyed by
/// page path in the order the pages were first answered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iteration {
    pages: Vec<PageAnswers>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnswers {
    pub path: String,
    pub fields: Fields,
}

impl Iteration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct pages answered in this iteration.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> impl Iterator<Item = &PageAnswers> {
        self.pages.iter()
    }

    pub fn page(&self, path: &str) -> Option<&Fields> {
        self.pages.iter().find(|p| p.path == path).map(|p| &p.fields)
    }

    /// Path of the first page answered in this iteration.
    pub fn first_page(&self) -> Option<&str> {
        self.pages.first().map(|p| p.path.as_str())
    }

    /// All pages' answers flattened into one map. Later pages win on
    /// key collisions.
    pub fn merged(&self) -> Fields {
        let mut out = Fields::new();
        for page in &self.pages {
            merge_fields(&mut out, &page.fields);
        }
        out
    }

    /// Deep-merge `fields` into the entry for `path`, appending a new
    /// entry if the page has not been answered in this iteration yet.
    pub fn merge_page(&mut self, path: &str, fields: &Fields) {
        match self.pages.iter_mut().find(|p| p.path == path) {
            Some(existing) => merge_fields(&mut existing.fields, fields),
            None => self.pages.push(PageAnswers {
                path: path.to_string(),
                fields: fields.clone(),
            }),
        }
    }
}

impl AnswerState {
    pub fn section(&self, name: &str) -> Option<&SectionState> {
        self.sections.get(name)
    }

    /// Iterations recorded for a repeated section. Empty when the section
    /// has no state or is stored flat.
    pub fn iterations(&self, section: &str) -> &[Iteration] {
        match self.sections.get(section) {
            Some(SectionState::Repeated(iterations)) => iterations,
            _ => &[],
        }
    }

    /// Resolve a dotted path such as `applicant.age` or `fullName`.
    ///
    /// The first segment names a section when one exists, otherwise a
    /// top-level field. Repeated sections resolve against the merged
    /// answers of their most recent iteration. Remaining segments walk
    /// into nested objects.
    pub fn lookup(&self, path: &str) -> Option<serde_json::Value> {
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let head = segments.next()?;
        let rest: Vec<&str> = segments.collect();

        match self.sections.get(head) {
            Some(SectionState::Flat(fields)) => lookup_in_fields(fields, &rest),
            Some(SectionState::Repeated(iterations)) => {
                let merged = iterations.last()?.merged();
                lookup_in_fields(&merged, &rest)
            }
            None => {
                let value = self.fields.get(head)?;
                walk(value, &rest).cloned()
            }
        }
    }

    /// Apply a patch in place. On error the state is left untouched.
    pub fn apply(&mut self, patch: &StatePatch) -> Result<(), StorageError> {
        match patch {
            StatePatch::Fields(fields) => {
                merge_fields(&mut self.fields, fields);
            }
            StatePatch::Section { section, fields } => {
                match self
                    .sections
                    .entry(section.clone())
                    .or_insert_with(|| SectionState::Flat(Fields::new()))
                {
                    SectionState::Flat(existing) => merge_fields(existing, fields),
                    other => {
                        return Err(StorageError::ShapeConflict {
                            section: section.clone(),
                            expected: "flat",
                            found: other.shape(),
                        })
                    }
                }
            }
            StatePatch::Iteration {
                section,
                iteration,
                page,
                fields,
            } => {
                match self
                    .sections
                    .entry(section.clone())
                    .or_insert_with(|| SectionState::Repeated(Vec::new()))
                {
                    SectionState::Repeated(iterations) => {
                        match iteration.and_then(|i| iterations.get_mut(i)) {
                            Some(slot) => slot.merge_page(page, fields),
                            None => {
                                let mut slot = Iteration::new();
                                slot.merge_page(page, fields);
                                iterations.push(slot);
                            }
                        }
                    }
                    other => {
                        return Err(StorageError::ShapeConflict {
                            section: section.clone(),
                            expected: "repeated",
                            found: other.shape(),
                        })
                    }
                }
            }
            StatePatch::Progress(progress) => {
                self.progress = progress.clone();
            }
            StatePatch::OriginalFilename { field, filename } => {
                self.original_filenames
                    .insert(field.clone(), filename.clone());
            }
            StatePatch::Batch(patches) => {
                let mut staged = self.clone();
                for patch in patches {
                    staged.apply(patch)?;
                }
                *self = staged;
            }
        }
        Ok(())
    }
}

fn lookup_in_fields(fields: &Fields, rest: &[&str]) -> Option<serde_json::Value> {
    let (head, tail) = rest.split_first()?;
    walk(fields.get(*head)?, tail).cloned()
}

fn walk<'a>(value: &'a serde_json::Value, segments: &[&str]) -> Option<&'a serde_json::Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| current.get(*segment))
}

/// A unit of change to an [`AnswerState`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatePatch {
    /// Merge into the top-level fields.
    Fields(Fields),
    /// Merge into a flat section.
    Section { section: String, fields: Fields },
    /// Merge one page's answers into one iteration of a repeated section.
    /// `None`, or an index past the end, appends a new iteration.
    Iteration {
        section: String,
        iteration: Option<usize>,
        page: String,
        fields: Fields,
    },
    /// Replace the navigation progress.
    Progress(Vec<String>),
    /// Record the user-facing name of an uploaded file.
    OriginalFilename {
        field: String,
        filename: OriginalFilename,
    },
    /// Apply several patches in order, all or nothing.
    Batch(Vec<StatePatch>),
}

impl StatePatch {
    /// True when the patch addresses a single iteration of a repeated section.
    pub fn is_repeat_patch(&self) -> bool {
        match self {
            StatePatch::Iteration { .. } => true,
            StatePatch::Batch(patches) => patches.iter().any(StatePatch::is_repeat_patch),
            _ => false,
        }
    }

    /// Combine patches into one, skipping the wrapper for a single patch.
    pub fn batch(mut patches: Vec<StatePatch>) -> StatePatch {
        if patches.len() == 1 {
            if let Some(patch) = patches.pop() {
                return patch;
            }
        }
        StatePatch::Batch(patches)
    }
}

/// Deep merge: objects merge key by key, everything else (arrays
/// included) is replaced.
pub fn merge_value(target: &mut serde_json::Value, source: &serde_json::Value) {
    match (target, source) {
        (serde_json::Value::Object(t), serde_json::Value::Object(s)) => {
            for (key, value) in s {
                match t.get_mut(key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        t.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (t, s) => *t = s.clone(),
    }
}

pub fn merge_fields(target: &mut Fields, source: &Fields) {
    for (key, value) in source {
        match target.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
