mod course;
mod ids;
mod progress;
mod update;

pub use course::{ChapterDef, ChapterType, CourseError, CourseStructure, SectionDef};
pub use ids::{ChapterId, CourseId, IdError, SectionId, UserId, MAX_ID_LEN};
pub use progress::{
    ChapterProgress, ProgressRecord, ProgressRecordError, ProgressSummary, SectionMap,
    SectionProgress, MAX_TIME_SPENT_SECS,
};
pub use update::{
    ChapterChange, ChapterUpdateRequest, ProgressUpdate, ProgressUpdateRequest,
    SectionUpdateRequest, UpdateError, MAX_CHANGES_PER_UPDATE,
};
