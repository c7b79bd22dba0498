// Saving colorized results to disk

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::types::{Job, JobStatus};

/// Output filename for a colorized page: `colorized-` prefix on the original
/// upload name.
pub fn export_filename(original: &str) -> String {
    format!("colorized-{original}")
}

/// Write one job's result, returning the path written.
pub async fn export_result(job: &Job, dir: &Path) -> Result<PathBuf> {
    let payload = job
        .result
        .as_ref()
        .with_context(|| format!("job {} has no result to export", job.id))?;
    let path = dir.join(export_filename(&job.source.filename));
    tokio::fs::write(&path, payload.bytes.as_slice())
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    debug!("exported {}", path.display());
    Ok(path)
}

/// Write every successful job's result into `dir`, pacing writes by
/// `stagger` so a large batch does not land as one burst. Jobs without a
/// result are skipped, not errors.
pub async fn export_all(jobs: &[Job], dir: &Path, stagger: Duration) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    let mut first = true;
    for job in jobs {
        if job.status != JobStatus::Success || job.result.is_none() {
            continue;
        }
        if !first && !stagger.is_zero() {
            tokio::time::sleep(stagger).await;
        }
        first = false;
        written.push(export_result(job, dir).await?);
    }

    info!("exported {} of {} jobs to {}", written.len(), jobs.len(), dir.display());
    Ok(written)
}
