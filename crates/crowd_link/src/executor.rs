use futures_lite::future;
use std::{future::Future, sync::Arc};

/// Worker threads that host the network sessions, apart from the simulation thread.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<async_executor::Executor<'static>>,
}

impl Executor {
    pub fn new(threads: usize) -> anyhow::Result<Self> {
        let inner = Arc::new(async_executor::Executor::new());

        for i in 1..=threads.max(1) {
            let ex = Arc::clone(&inner);
            log::debug!("spawning network thread {}", i);
            std::thread::Builder::new()
                .name(format!("crowd_link-net-{}", i))
                .spawn(move || loop {
                    let _ = std::panic::catch_unwind(|| {
                        let fut = ex.run(future::pending::<()>());
                        future::block_on(fut)
                    });
                    log::debug!("restarting network thread ({})", i);
                })?;
        }

        Ok(Self { inner })
    }

    pub fn spawn<F, T>(&self, fut: F) -> async_executor::Task<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }
}

#[cfg(test)]
impl Executor {
    /// One executor for every test in the process.
    pub(crate) fn shared() -> Self {
        static SHARED: std::sync::OnceLock<Executor> = std::sync::OnceLock::new();
        SHARED
            .get_or_init(|| Self::new(2).expect("spawn test executor"))
            .clone()
    }
}
