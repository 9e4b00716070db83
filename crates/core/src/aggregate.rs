//! Course-structure-denominated progress aggregation.
//!
//! The course structure decides which chapters count. Stored progress only
//! contributes completion flags for chapters that still exist in it, so
//! orphaned entries never inflate the numerator and sparse maps never shrink
//! the denominator.

use crate::model::{CourseStructure, SectionMap};

/// Completed and total chapter counts for one course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressTally {
    pub completed: usize,
    pub total: usize,
}

impl ProgressTally {
    /// Percentage rounded half up to the nearest integer; 0 for an empty course.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let completed = self.completed.min(self.total) as u128;
        let total = self.total as u128;
        // round(100 * c / t) with halves going up, in integer arithmetic.
        let rounded = (200 * completed + total) / (2 * total);
        u8::try_from(rounded).unwrap_or(100)
    }
}

/// Count completed chapters of `course` found in `sections`.
#[must_use]
pub fn compute_overall_progress(course: &CourseStructure, sections: &SectionMap) -> ProgressTally {
    let mut tally = ProgressTally::default();
    for section in course.sections() {
        tally.total += section.chapters.len();
        let Some(stored) = sections.get(&section.section_id) else {
            continue;
        };
        tally.completed += section
            .chapters
            .iter()
            .filter(|def| {
                stored
                    .chapters
                    .get(&def.chapter_id)
                    .is_some_and(|c| c.completed)
            })
            .count();
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ChapterDef, ChapterId, ChapterProgress, ChapterType, CourseId, SectionDef, SectionId,
        SectionProgress,
    };

    fn sid(s: &str) -> SectionId {
        SectionId::parse(s).unwrap()
    }

    fn cid(s: &str) -> ChapterId {
        ChapterId::parse(s).unwrap()
    }

    fn course(layout: &[(&str, Vec<&str>)]) -> CourseStructure {
        let sections = layout
            .iter()
            .map(|(section, chapters)| {
                SectionDef::new(
                    sid(section),
                    *section,
                    chapters
                        .iter()
                        .map(|c| ChapterDef::new(cid(c), *c, ChapterType::Video))
                        .collect(),
                )
            })
            .collect();
        CourseStructure::new(CourseId::parse("c").unwrap(), sections).unwrap()
    }

    fn mark(sections: &mut SectionMap, section: &str, chapter: &str, completed: bool) {
        let entry = sections
            .entry(sid(section))
            .or_insert_with(|| SectionProgress::empty(sid(section)));
        entry.chapters.insert(
            cid(chapter),
            ChapterProgress {
                completed,
                ..ChapterProgress::pending(cid(chapter))
            },
        );
    }

    #[test]
    fn empty_progress_is_zero_and_full_progress_is_hundred() {
        let layouts = vec![
            vec![("a", vec!["1", "2", "3", "4", "5"])],
            vec![("a", vec!["1"]), ("b", vec!["2", "3"]), ("c", vec!["4", "5"])],
            vec![("a", vec![]), ("b", vec!["1", "2", "3", "4", "5"])],
        ];
        for layout in &layouts {
            let course = course(layout);
            assert_eq!(compute_overall_progress(&course, &SectionMap::new()).percent(), 0);

            let mut all = SectionMap::new();
            for (section, chapters) in layout {
                for chapter in chapters {
                    mark(&mut all, section, chapter, true);
                }
            }
            let tally = compute_overall_progress(&course, &all);
            assert_eq!(tally, ProgressTally { completed: 5, total: 5 });
            assert_eq!(tally.percent(), 100);
        }
    }

    #[test]
    fn orphaned_chapters_are_ignored() {
        let course = course(&[("a", vec!["a1", "a2"])]);
        let mut sections = SectionMap::new();
        mark(&mut sections, "a", "a1", true);
        let baseline = compute_overall_progress(&course, &sections);

        mark(&mut sections, "a", "deleted", true);
        mark(&mut sections, "gone", "g1", true);
        assert_eq!(compute_overall_progress(&course, &sections), baseline);
        assert_eq!(baseline.percent(), 50);
    }

    #[test]
    fn two_of_five_is_forty_three_is_sixty() {
        let course = course(&[("a", vec!["a1", "a2", "a3"]), ("b", vec!["b1", "b2"])]);
        let mut sections = SectionMap::new();
        mark(&mut sections, "a", "a1", true);
        mark(&mut sections, "b", "b2", true);
        assert_eq!(compute_overall_progress(&course, &sections).percent(), 40);

        mark(&mut sections, "a", "a3", true);
        assert_eq!(compute_overall_progress(&course, &sections).percent(), 60);
    }

    #[test]
    fn zero_chapter_course_is_zero() {
        assert_eq!(compute_overall_progress(&course(&[]), &SectionMap::new()).percent(), 0);
        let mut sections = SectionMap::new();
        mark(&mut sections, "a", "x", true);
        assert_eq!(compute_overall_progress(&course(&[("a", vec![])]), &sections).percent(), 0);
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(ProgressTally { completed: 1, total: 8 }.percent(), 13); // 12.5
        assert_eq!(ProgressTally { completed: 1, total: 3 }.percent(), 33);
        assert_eq!(ProgressTally { completed: 2, total: 3 }.percent(), 67);
        assert_eq!(ProgressTally { completed: 1, total: 200 }.percent(), 1); // 0.5
    }

    #[test]
    fn incomplete_flags_do_not_count() {
        let course = course(&[("a", vec!["a1", "a2"])]);
        let mut sections = SectionMap::new();
        mark(&mut sections, "a", "a1", false);
        mark(&mut sections, "a", "a2", true);
        assert_eq!(compute_overall_progress(&course, &sections).percent(), 50);
    }
}
