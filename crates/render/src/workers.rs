/// Worker threads for the parallel phases of the frontend.
///
/// Jobs are spawned into a fork-join scope; the call returns once every job
/// has finished, which is the only barrier the frontend needs.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Build a pool with `threads` workers, or rayon's default when zero.
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("scenecull-worker-{i}"))
            .build()?;
        tracing::debug!(threads = pool.current_num_threads(), "worker pool started");
        Ok(Self { pool })
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `jobs` in parallel, one task each, and wait for all of them.
    pub fn fork_join<I, F>(&self, jobs: I, work: F)
    where
        I: IntoIterator,
        I::Item: Send,
        F: Fn(I::Item) + Sync,
    {
        let jobs: Vec<I::Item> = jobs.into_iter().collect();
        let work = &work;
        self.pool.scope(|scope| {
            for job in jobs {
                scope.spawn(move |_| work(job));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn fork_join_waits_for_every_job() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.thread_count(), 3);

        let counter = AtomicU32::new(0);
        let mut slots = vec![0u32; 16];
        pool.fork_join(slots.iter_mut().enumerate(), |(i, slot)| {
            *slot = i as u32 * 2;
            counter.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(counter.load(Ordering::Relaxed), 16);
        assert!(slots.iter().enumerate().all(|(i, &s)| s == i as u32 * 2));
    }

    #[test]
    fn workers_are_named() {
        let pool = WorkerPool::new(1).unwrap();
        let name = std::sync::Mutex::new(String::new());
        pool.fork_join([()], |_| {
            *name.lock().unwrap() = std::thread::current().name().unwrap_or_default().to_string();
        });
        assert_eq!(name.into_inner().unwrap(), "scenecull-worker-0");
    }
}
