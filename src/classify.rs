//! File-name based format detection.
//!
//! Only the file name is inspected. Markers are tried in
//! [`SourceFormat::PRIORITY`] order and the first substring hit wins, so a
//! name carrying several markers always resolves the same way.

use std::path::Path;

use crate::config::{PipelineConfig, SourceFormat};

/// Detects the source format of `file_name`, or `None` when no marker matches.
pub fn classify(file_name: &str, config: &PipelineConfig) -> Option<SourceFormat> {
    SourceFormat::PRIORITY.into_iter().find(|format| {
        config
            .format(*format)
            .is_some_and(|spec| !spec.marker.is_empty() && file_name.contains(spec.marker.as_str()))
    })
}

/// Classifies by the final path component, ignoring directory names.
pub fn classify_path(path: &Path, config: &PipelineConfig) -> Option<SourceFormat> {
    let name = path.file_name()?.to_string_lossy();
    classify(&name, config)
}
