//! One-shot corpus seeding
//!
//! On first startup (empty recordings table) the audio directory is scanned
//! and every audio file becomes a recording with a fixed 5-second segment
//! grid. The segment count comes from the recording's feature stack, so the
//! store and the feature artifacts cannot disagree at birth. A missing
//! stack for a present audio file fails the seed (ingestion bug).

use crate::config::SEGMENT_SECONDS;
use crate::db;
use crate::features::FeatureStore;
use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

const AUDIO_EXTENSIONS: &[&str] = &["ogg", "wav", "flac", "mp3"];

/// Seeding outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub recordings: usize,
    pub segments: usize,
}

/// Seed the store from the audio directory if it is empty. Idempotent:
/// a populated store is left untouched.
pub async fn seed_if_empty(
    pool: &SqlitePool,
    audio_dir: &Path,
    features: &FeatureStore,
) -> Result<SeedReport> {
    if db::recordings::count(pool).await? > 0 {
        return Ok(SeedReport {
            recordings: 0,
            segments: 0,
        });
    }

    let filenames = list_audio_files(audio_dir)?;
    if filenames.is_empty() {
        info!(dir = %audio_dir.display(), "no audio files found; store stays empty");
        return Ok(SeedReport {
            recordings: 0,
            segments: 0,
        });
    }

    let mut recordings = 0;
    let mut segments = 0;
    for filename in &filenames {
        let segment_count = features.segment_count(filename)?;
        let duration = segment_count as f64 * SEGMENT_SECONDS;

        let recording_id = db::recordings::insert(pool, filename, duration).await?;
        for ordinal in 0..segment_count {
            db::segments::insert(pool, recording_id, ordinal as f64 * SEGMENT_SECONDS).await?;
        }

        recordings += 1;
        segments += segment_count;
    }

    info!(recordings, segments, "seeded corpus from audio directory");
    Ok(SeedReport {
        recordings,
        segments,
    })
}

/// Audio filenames in the directory, sorted for stable recording ids
fn list_audio_files(audio_dir: &Path) -> Result<Vec<String>> {
    if !audio_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut filenames = Vec::new();
    for entry in std::fs::read_dir(audio_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let is_audio = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_audio {
            filenames.push(name.to_string());
        }
    }
    filenames.sort();
    Ok(filenames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use ndarray::Array4;
    use ndarray_npy::write_npy;

    async fn memory_pool(dir: &Path) -> SqlitePool {
        db::init_pool(&dir.join("chorus.db")).await.unwrap()
    }

    fn write_fixture(root: &Path, filename: &str, segments: usize) {
        std::fs::create_dir_all(root.join("audio")).unwrap();
        std::fs::create_dir_all(root.join("features")).unwrap();
        std::fs::write(root.join("audio").join(filename), b"fake-ogg").unwrap();

        let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap();
        let stack = Array4::<f32>::from_elem((segments, 3, 8, 8), 0.1);
        write_npy(root.join("features").join(format!("{stem}.npy")), &stack).unwrap();
    }

    #[tokio::test]
    async fn seeds_recordings_and_segment_grid() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "XC0001_COR.ogg", 6);
        write_fixture(dir.path(), "XC0002_SSW.ogg", 4);

        let pool = memory_pool(dir.path()).await;
        let features = FeatureStore::new(dir.path().join("features"));
        let report = seed_if_empty(&pool, &dir.path().join("audio"), &features)
            .await
            .unwrap();

        assert_eq!(report.recordings, 2);
        assert_eq!(report.segments, 10);

        let recordings = db::recordings::list_all(&pool).await.unwrap();
        assert_eq!(recordings.len(), 2);
        assert_eq!(recordings[0].filename, "XC0001_COR.ogg");
        assert_eq!(recordings[0].duration, 30.0);

        let segments = db::segments::for_recording(&pool, recordings[0].id)
            .await
            .unwrap();
        assert_eq!(segments.len(), 6);
        assert_eq!(segments[1].t_start, 5.0);
        assert_eq!(segments[1].uncertainty, db::segments::UNSCORED);
        assert!(segments[1].labels.is_none());

        // Second seed is a no-op
        let again = seed_if_empty(&pool, &dir.path().join("audio"), &features)
            .await
            .unwrap();
        assert_eq!(again.recordings, 0);
    }

    #[tokio::test]
    async fn audio_without_features_fails_the_seed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("audio")).unwrap();
        std::fs::create_dir_all(dir.path().join("features")).unwrap();
        std::fs::write(dir.path().join("audio").join("orphan.ogg"), b"fake").unwrap();

        let pool = memory_pool(dir.path()).await;
        let features = FeatureStore::new(dir.path().join("features"));
        let err = seed_if_empty(&pool, &dir.path().join("audio"), &features)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingFeatures { .. }));
    }
}
