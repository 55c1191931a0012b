//! Background image decoding and the queue that hands results to the renderer
//!
//! Worker threads decode images and push them into a [`ConcurrentQueue`].
//! The render graph drains that queue once at the start of each frame, before
//! any pass runs, so pass callbacks never synchronize themselves.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::resources::texture::ImageData;

/// Mutex-guarded queue with push and pop-all
#[derive(Debug)]
pub struct ConcurrentQueue<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> ConcurrentQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Take everything queued so far, in push order
    pub fn pop_all(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// A decoded image waiting to become a texture
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Asset path the image was requested under, e.g. `@res://images/brdf.hdr`
    pub path: String,
    pub image: ImageData,
}

pub type UploadQueue = ConcurrentQueue<LoadedImage>;

enum LoadSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

struct LoadJob {
    path: String,
    source: LoadSource,
}

struct JobQueue {
    jobs: Mutex<VecDeque<LoadJob>>,
    ready: Condvar,
    shutdown: AtomicBool,
}

/// Pool of worker threads decoding images into an upload queue
pub struct TextureLoader {
    jobs: Arc<JobQueue>,
    workers: Vec<JoinHandle<()>>,
    output: Arc<UploadQueue>,
}

impl TextureLoader {
    pub fn new(worker_count: usize, output: Arc<UploadQueue>) -> Self {
        let jobs = Arc::new(JobQueue {
            jobs: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let workers = (0..worker_count.max(1))
            .map(|index| {
                let jobs = jobs.clone();
                let output = output.clone();
                std::thread::Builder::new()
                    .name(format!("texture-loader-{}", index))
                    .spawn(move || worker_loop(&jobs, &output))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    log::error!("Failed to spawn texture loader thread: {}", err);
                    None
                }
            })
            .collect();

        Self {
            jobs,
            workers,
            output,
        }
    }

    pub fn output(&self) -> &Arc<UploadQueue> {
        &self.output
    }

    /// Queue a file for decoding under the given asset path
    pub fn request_file(&self, path: impl Into<String>, file: impl Into<PathBuf>) {
        self.submit(LoadJob {
            path: path.into(),
            source: LoadSource::File(file.into()),
        });
    }

    /// Queue encoded bytes for decoding under the given asset path
    pub fn request_bytes(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.submit(LoadJob {
            path: path.into(),
            source: LoadSource::Memory(bytes),
        });
    }

    fn submit(&self, job: LoadJob) {
        self.jobs.jobs.lock().push_back(job);
        self.jobs.ready.notify_one();
    }
}

impl Drop for TextureLoader {
    fn drop(&mut self) {
        {
            // flag flips under the lock so no worker misses the wakeup
            let _queue = self.jobs.jobs.lock();
            self.jobs.shutdown.store(true, Ordering::Release);
        }
        self.jobs.ready.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Texture loader thread panicked");
            }
        }
    }
}

fn worker_loop(jobs: &JobQueue, output: &UploadQueue) {
    loop {
        let job = {
            let mut queue = jobs.jobs.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break job;
                }
                if jobs.shutdown.load(Ordering::Acquire) {
                    return;
                }
                jobs.ready.wait(&mut queue);
            }
        };

        let decoded = match job.source {
            LoadSource::File(file) => ImageData::from_file(file),
            LoadSource::Memory(bytes) => ImageData::from_bytes(&bytes, &job.path),
        };

        match decoded {
            Ok(image) => {
                log::debug!("Decoded '{}' ({}x{})", job.path, image.width, image.height);
                output.push(LoadedImage {
                    path: job.path,
                    image,
                });
            }
            Err(err) => log::error!("{}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_pop_all_drains_in_order() {
        let queue = ConcurrentQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop_all(), vec![1, 2, 3]);
        assert!(queue.is_empty());
        assert!(queue.pop_all().is_empty());
    }

    #[test]
    fn test_concurrent_pushes_are_all_seen() {
        let queue = Arc::new(ConcurrentQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.push(t * 100 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut items = queue.pop_all();
        items.sort_unstable();
        assert_eq!(items, (0..400).collect::<Vec<_>>());
    }

    #[test]
    fn test_loader_decodes_into_queue() {
        let mut png = Vec::new();
        let pixels = image::RgbaImage::from_pixel(4, 4, image::Rgba([9, 9, 9, 255]));
        image::DynamicImage::ImageRgba8(pixels)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();

        let queue = Arc::new(UploadQueue::new());
        let loader = TextureLoader::new(2, queue.clone());
        loader.request_bytes("@res://images/grey.png", png);
        loader.request_bytes("@res://images/broken.png", vec![1, 2, 3]);

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut loaded = Vec::new();
        while loaded.is_empty() && Instant::now() < deadline {
            loaded.extend(queue.pop_all());
            std::thread::sleep(Duration::from_millis(5));
        }
        drop(loader);
        loaded.extend(queue.pop_all());

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].path, "@res://images/grey.png");
        assert_eq!(loaded[0].image.width, 4);
    }
}
