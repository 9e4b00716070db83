use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ChapterId, CourseId, SectionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("duplicate section {0} in course")]
    DuplicateSection(SectionId),

    #[error("duplicate chapter {chapter} in section {section}")]
    DuplicateChapter {
        section: SectionId,
        chapter: ChapterId,
    },
}

//
// ─── CHAPTERS ──────────────────────────────────────────────────────────────────
//

/// Kind of content a chapter carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChapterType {
    Text,
    Quiz,
    Video,
}

impl ChapterType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChapterType::Text => "Text",
            ChapterType::Quiz => "Quiz",
            ChapterType::Video => "Video",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Text" => Some(ChapterType::Text),
            "Quiz" => Some(ChapterType::Quiz),
            "Video" => Some(ChapterType::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDef {
    pub chapter_id: ChapterId,
    pub title: String,
    #[serde(rename = "type")]
    pub chapter_type: ChapterType,
}

impl ChapterDef {
    #[must_use]
    pub fn new(chapter_id: ChapterId, title: impl Into<String>, chapter_type: ChapterType) -> Self {
        Self {
            chapter_id,
            title: title.into(),
            chapter_type,
        }
    }
}

//
// ─── SECTIONS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDef {
    pub section_id: SectionId,
    pub section_title: String,
    pub chapters: Vec<ChapterDef>,
}

impl SectionDef {
    #[must_use]
    pub fn new(section_id: SectionId, section_title: impl Into<String>, chapters: Vec<ChapterDef>) -> Self {
        Self {
            section_id,
            section_title: section_title.into(),
            chapters,
        }
    }

    #[must_use]
    pub fn chapter(&self, chapter_id: &ChapterId) -> Option<&ChapterDef> {
        self.chapters.iter().find(|c| &c.chapter_id == chapter_id)
    }
}

//
// ─── COURSE STRUCTURE ──────────────────────────────────────────────────────────
//

/// Authoritative chapter layout of a course, as supplied by the catalog.
///
/// Section ids are unique within the course and chapter ids are unique
/// within their section. Order is preserved as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCourseStructure")]
pub struct CourseStructure {
    course_id: CourseId,
    sections: Vec<SectionDef>,
}

impl CourseStructure {
    /// Builds a structure, checking id uniqueness.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::DuplicateSection` or
    /// `CourseError::DuplicateChapter` when ids collide.
    pub fn new(course_id: CourseId, sections: Vec<SectionDef>) -> Result<Self, CourseError> {
        let mut seen_sections = HashSet::with_capacity(sections.len());
        for section in &sections {
            if !seen_sections.insert(&section.section_id) {
                return Err(CourseError::DuplicateSection(section.section_id.clone()));
            }
            let mut seen_chapters = HashSet::with_capacity(section.chapters.len());
            for chapter in &section.chapters {
                if !seen_chapters.insert(&chapter.chapter_id) {
                    return Err(CourseError::DuplicateChapter {
                        section: section.section_id.clone(),
                        chapter: chapter.chapter_id.clone(),
                    });
                }
            }
        }
        Ok(Self {
            course_id,
            sections,
        })
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn sections(&self) -> &[SectionDef] {
        &self.sections
    }

    #[must_use]
    pub fn section(&self, section_id: &SectionId) -> Option<&SectionDef> {
        self.sections.iter().find(|s| &s.section_id == section_id)
    }

    /// True when `chapter_id` exists under `section_id`.
    #[must_use]
    pub fn contains_chapter(&self, section_id: &SectionId, chapter_id: &ChapterId) -> bool {
        self.section(section_id)
            .is_some_and(|s| s.chapter(chapter_id).is_some())
    }

    /// Total number of chapters across all sections.
    #[must_use]
    pub fn total_chapters(&self) -> usize {
        self.sections.iter().map(|s| s.chapters.len()).sum()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCourseStructure {
    course_id: CourseId,
    sections: Vec<SectionDef>,
}

impl TryFrom<RawCourseStructure> for CourseStructure {
    type Error = CourseError;

    fn try_from(raw: RawCourseStructure) -> Result<Self, Self::Error> {
        CourseStructure::new(raw.course_id, raw.sections)
    }
}
