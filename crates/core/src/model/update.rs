use serde::Deserialize;
use thiserror::Error;

use crate::model::ids::{ChapterId, IdError, SectionId};

/// Upper bound on chapter changes accepted in one update.
pub const MAX_CHANGES_PER_UPDATE: usize = 1_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UpdateError {
    #[error("update contains no chapter changes")]
    Empty,

    #[error("update contains too many chapter changes ({0})")]
    TooLarge(usize),

    #[error("invalid section id at sections[{index}]: {source}")]
    SectionId {
        index: usize,
        #[source]
        source: IdError,
    },

    #[error("invalid chapter id at sections[{section}].chapters[{index}]: {source}")]
    ChapterId {
        section: usize,
        index: usize,
        #[source]
        source: IdError,
    },

    #[error("timeSpent must be non-negative, got {0}")]
    NegativeTimeSpent(i64),

    #[error("chapter {chapter} in section {section} appears more than once")]
    DuplicateChapter {
        section: SectionId,
        chapter: ChapterId,
    },
}

//
// ─── WIRE SHAPE ────────────────────────────────────────────────────────────────
//

/// Partial nested progress payload as sent by clients.
///
/// Ids arrive as raw strings so their format errors can be reported with a
/// position; `completed` must be a JSON boolean.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProgressUpdateRequest {
    pub sections: Vec<SectionUpdateRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SectionUpdateRequest {
    pub section_id: String,
    pub chapters: Vec<ChapterUpdateRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChapterUpdateRequest {
    pub chapter_id: String,
    pub completed: bool,
    #[serde(default)]
    pub time_spent: Option<i64>,
}

//
// ─── VALIDATED SHAPE ───────────────────────────────────────────────────────────
//

/// One validated chapter mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterChange {
    pub section_id: SectionId,
    pub chapter_id: ChapterId,
    pub completed: bool,
    /// Seconds to add to the chapter's time spent.
    pub time_spent: Option<u64>,
}

/// A non-empty, duplicate-free batch of chapter changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    changes: Vec<ChapterChange>,
}

impl ProgressUpdate {
    /// Single completion toggle.
    #[must_use]
    pub fn single(section_id: SectionId, chapter_id: ChapterId, completed: bool) -> Self {
        Self {
            changes: vec![ChapterChange {
                section_id,
                chapter_id,
                completed,
                time_spent: None,
            }],
        }
    }

    #[must_use]
    pub fn changes(&self) -> &[ChapterChange] {
        &self.changes
    }
}

impl TryFrom<ProgressUpdateRequest> for ProgressUpdate {
    type Error = UpdateError;

    fn try_from(request: ProgressUpdateRequest) -> Result<Self, Self::Error> {
        let mut changes: Vec<ChapterChange> = Vec::new();
        for (s_idx, section) in request.sections.into_iter().enumerate() {
            let section_id = SectionId::parse(section.section_id).map_err(|source| {
                UpdateError::SectionId {
                    index: s_idx,
                    source,
                }
            })?;
            for (c_idx, chapter) in section.chapters.into_iter().enumerate() {
                let chapter_id = ChapterId::parse(chapter.chapter_id).map_err(|source| {
                    UpdateError::ChapterId {
                        section: s_idx,
                        index: c_idx,
                        source,
                    }
                })?;
                let time_spent = match chapter.time_spent {
                    Some(secs) if secs < 0 => return Err(UpdateError::NegativeTimeSpent(secs)),
                    Some(secs) => Some(secs.unsigned_abs()),
                    None => None,
                };
                if changes
                    .iter()
                    .any(|c| c.section_id == section_id && c.chapter_id == chapter_id)
                {
                    return Err(UpdateError::DuplicateChapter {
                        section: section_id,
                        chapter: chapter_id,
                    });
                }
                changes.push(ChapterChange {
                    section_id: section_id.clone(),
                    chapter_id,
                    completed: chapter.completed,
                    time_spent,
                });
                if changes.len() > MAX_CHANGES_PER_UPDATE {
                    return Err(UpdateError::TooLarge(changes.len()));
                }
            }
        }
        if changes.is_empty() {
            return Err(UpdateError::Empty);
        }
        Ok(Self { changes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ProgressUpdate, UpdateError> {
        let request: ProgressUpdateRequest = serde_json::from_str(json).unwrap();
        ProgressUpdate::try_from(request)
    }

    #[test]
    fn flattens_nested_payload() {
        let update = parse(
            r#"{"sections":[
                {"sectionId":"s1","chapters":[{"chapterId":"c1","completed":true},{"chapterId":"c2","completed":false,"timeSpent":90}]},
                {"sectionId":"s2","chapters":[{"chapterId":"c1","completed":true}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(update.changes().len(), 3);
        assert_eq!(update.changes()[1].time_spent, Some(90));
        assert_eq!(update.changes()[2].section_id.as_str(), "s2");
    }

    #[test]
    fn non_boolean_completed_is_rejected_by_shape() {
        let res: Result<ProgressUpdateRequest, _> = serde_json::from_str(
            r#"{"sections":[{"sectionId":"s1","chapters":[{"chapterId":"c1","completed":"yes"}]}]}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn unknown_fields_are_rejected_by_shape() {
        let res: Result<ProgressUpdateRequest, _> = serde_json::from_str(
            r#"{"sections":[],"overallProgress":100}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn negative_time_spent_is_rejected() {
        let err = parse(
            r#"{"sections":[{"sectionId":"s1","chapters":[{"chapterId":"c1","completed":true,"timeSpent":-5}]}]}"#,
        )
        .unwrap_err();
        assert_eq!(err, UpdateError::NegativeTimeSpent(-5));
    }

    #[test]
    fn malformed_ids_report_position() {
        let err = parse(
            r#"{"sections":[{"sectionId":"s1","chapters":[{"chapterId":"ok","completed":true},{"chapterId":"bad id","completed":true}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, UpdateError::ChapterId { section: 0, index: 1, .. }));

        let err = parse(r#"{"sections":[{"sectionId":"","chapters":[]}]}"#).unwrap_err();
        assert!(matches!(err, UpdateError::SectionId { index: 0, .. }));
    }

    #[test]
    fn empty_update_is_rejected() {
        assert_eq!(parse(r#"{"sections":[]}"#), Err(UpdateError::Empty));
        assert_eq!(
            parse(r#"{"sections":[{"sectionId":"s1","chapters":[]}]}"#),
            Err(UpdateError::Empty)
        );
    }

    #[test]
    fn duplicate_chapter_is_rejected() {
        let err = parse(
            r#"{"sections":[
                {"sectionId":"s1","chapters":[{"chapterId":"c1","completed":true}]},
                {"sectionId":"s1","chapters":[{"chapterId":"c1","completed":false}]}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, UpdateError::DuplicateChapter { .. }));
    }
}
