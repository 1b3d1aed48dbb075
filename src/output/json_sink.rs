use crate::model::Post;
use crate::output::traits::{Sink, SinkError, SinkResult};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes each target's posts to `<dir>/<target_key>.json`
///
/// The document is a pretty-printed JSON array of posts. It is first written
/// to a hidden temporary file in the same directory and then renamed into
/// place; an artifact that exists is always complete.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    /// Creates a sink writing into `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> SinkResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            SinkError::Write(format!("cannot create output directory {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn temp_path_for(&self, target_key: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", target_key))
    }
}

impl Sink for JsonFileSink {
    fn path_for(&self, target_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", target_key))
    }

    fn exists(&self, target_key: &str) -> bool {
        self.path_for(target_key).is_file()
    }

    fn write(&self, target_key: &str, posts: &[Post]) -> SinkResult<PathBuf> {
        let path = self.path_for(target_key);
        let temp = self.temp_path_for(target_key);

        {
            let mut writer = BufWriter::new(File::create(&temp)?);
            serde_json::to_writer_pretty(&mut writer, posts)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        fs::rename(&temp, &path)?;
        tracing::info!("Wrote {} posts to {}", posts.len(), path.display());
        Ok(path)
    }
}

/// Reads an artifact written by `JsonFileSink`
pub fn load_posts(path: &Path) -> SinkResult<Vec<Post>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
