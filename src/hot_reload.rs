// =============================================================================
// SHADER HOT-RELOAD
// =============================================================================
//
// notify runs the watcher on its own background thread. The only thing that
// crosses threads is a "dirty" flag; the render loop checks it once per frame
// and rebuilds the pipeline on the main thread, where the Vulkan objects live.
//
// Parent directories are watched rather than the files themselves, so editors
// that save by writing a temp file and renaming it over the original are
// still picked up.

use anyhow::{Context, Result};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct ShaderWatcher {
    _watcher: Box<dyn Watcher + Send>,
    dirty: Arc<AtomicBool>,
    files: Arc<Vec<PathBuf>>,
}

impl ShaderWatcher {
    /// Watch the given shader files.
    ///
    /// `poll` switches from OS notifications to a polling watcher, for bind
    /// mounts and network filesystems where notifications never arrive.
    pub fn new(files: &[&Path], poll: Option<Duration>) -> Result<Self> {
        let files: Vec<PathBuf> = files
            .iter()
            .map(|f| {
                f.canonicalize()
                    .with_context(|| format!("Cannot watch shader {}", f.display()))
            })
            .collect::<Result<_>>()?;
        let files = Arc::new(files);
        let dirty = Arc::new(AtomicBool::new(false));

        let handler = {
            let files = Arc::clone(&files);
            let dirty = Arc::clone(&dirty);
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_relevant(&event, &files) {
                        log::debug!("Shader change: {:?} {:?}", event.kind, event.paths);
                        dirty.store(true, Ordering::Release);
                    }
                }
                Err(e) => log::warn!("Shader watcher error: {}", e),
            }
        };

        let mut watcher: Box<dyn Watcher + Send> = match poll {
            Some(interval) => {
                let config = notify::Config::default()
                    .with_poll_interval(interval)
                    .with_compare_contents(true);
                Box::new(PollWatcher::new(handler, config).context("Failed to start polling watcher")?)
            }
            None => Box::new(
                notify::recommended_watcher(handler).context("Failed to start file watcher")?,
            ),
        };

        let mut dirs: Vec<&Path> = files.iter().filter_map(|f| f.parent()).collect();
        dirs.sort();
        dirs.dedup();
        for dir in dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", dir.display()))?;
        }

        log::info!(
            "Watching {} shader file(s) for changes ({})",
            files.len(),
            match poll {
                Some(interval) => format!("polling every {} ms", interval.as_millis()),
                None => "native events".to_string(),
            }
        );

        Ok(Self {
            _watcher: watcher,
            dirty,
            files,
        })
    }

    /// Returns true once per batch of changes since the last call.
    pub fn take_changed(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// A create or modify event that names one of the watched files
pub fn is_relevant(event: &Event, files: &[PathBuf]) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| files.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::time::Instant;

    fn files() -> Vec<PathBuf> {
        vec![PathBuf::from("/shaders/tri.vert"), PathBuf::from("/shaders/tri.frag")]
    }

    #[test]
    fn modify_of_watched_file_is_relevant() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/shaders/tri.frag"));
        assert!(is_relevant(&event, &files()));
    }

    #[test]
    fn rename_over_watched_file_is_relevant() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/shaders/tri.vert"));
        assert!(is_relevant(&event, &files()));
    }

    #[test]
    fn other_files_and_kinds_are_ignored() {
        let sibling = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/shaders/tri.vert.swp"));
        assert!(!is_relevant(&sibling, &files()));

        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/shaders/tri.vert"));
        assert!(!is_relevant(&access, &files()));

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/shaders/tri.vert"));
        assert!(!is_relevant(&removed, &files()));
    }

    #[test]
    fn missing_shader_file_cannot_be_watched() {
        let result = ShaderWatcher::new(&[Path::new("/no/such/dir/tri.frag")], None);
        assert!(result.is_err());
    }

    #[test]
    fn polling_watcher_sees_rewrite() {
        let dir = std::env::temp_dir().join(format!("tri-vk-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let shader = dir.join("watched.frag");
        std::fs::write(&shader, "#version 450\nvoid main() {}\n").unwrap();

        let watcher = ShaderWatcher::new(&[shader.as_path()], Some(Duration::from_millis(50))).unwrap();
        assert_eq!(watcher.files().len(), 1);
        assert!(!watcher.take_changed());

        std::thread::sleep(Duration::from_millis(200));
        std::fs::write(&shader, "#version 450\n// edited\nvoid main() {}\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut changed = false;
        while Instant::now() < deadline {
            if watcher.take_changed() {
                changed = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        assert!(changed, "poll watcher never reported the rewrite");

        drop(watcher);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
