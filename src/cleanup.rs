use std::fs;

use camino::Utf8Path;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::fetch::{FRAME_MANIFEST, FetchedFile};
use crate::fs_util::is_within;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupOutcome {
    pub deleted: usize,
    pub warnings: Vec<String>,
    pub removed_output_dir: bool,
}

/// Best-effort removal of this run's segment files, then of `output_dir`
/// itself if nothing else is left in it.
pub fn cleanup_fetched(
    files: &[FetchedFile],
    output_dir: &Utf8Path,
    sink: &dyn ProgressSink,
) -> CleanupOutcome {
    let mut outcome = CleanupOutcome::default();

    for file in files {
        if !is_within(&file.local_path, output_dir) {
            let message = format!("refusing to delete {} outside {output_dir}", file.local_path);
            sink.event(ProgressEvent::warn(message.clone()));
            outcome.warnings.push(message);
            continue;
        }
        match fs::remove_file(file.local_path.as_std_path()) {
            Ok(()) => {
                sink.event(ProgressEvent::debug(format!("cleanup.delete {}", file.local_path)));
                outcome.deleted += 1;
            }
            Err(err) => {
                let message = format!("could not delete {}: {err}", file.local_path);
                sink.event(ProgressEvent::warn(message.clone()));
                outcome.warnings.push(message);
            }
        }
    }

    let manifest = output_dir.join(FRAME_MANIFEST);
    if manifest.as_std_path().is_file()
        && let Err(err) = fs::remove_file(manifest.as_std_path())
    {
        let message = format!("could not delete {manifest}: {err}");
        sink.event(ProgressEvent::warn(message.clone()));
        outcome.warnings.push(message);
    }

    let is_empty = fs::read_dir(output_dir.as_std_path())
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if is_empty && fs::remove_dir(output_dir.as_std_path()).is_ok() {
        outcome.removed_output_dir = true;
        sink.event(ProgressEvent::info(format!(
            "deleted folder {output_dir}, because --cleanup was selected"
        )));
    } else {
        sink.event(ProgressEvent::info(format!(
            "deleted {} segment files from {output_dir}",
            outcome.deleted
        )));
    }

    outcome
}
