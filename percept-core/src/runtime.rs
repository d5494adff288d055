use std::{
    borrow::Cow,
    future::Future,
    ops::Deref,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    thread::JoinHandle as SyncJoinHandle,
    time::Duration,
};

use chrono::{DateTime, Datelike, Local, Timelike};
use crossbeam::queue::SegQueue;
use tokio::{
    runtime::{Builder as TokioBuilder, Handle},
    sync::watch,
    task::JoinHandle as AsyncJoinHandle,
};

use crate::{
    logging::init_logger,
    pubsub::{Publisher, PublisherRef, Subscriber},
};

pub enum LogPath {
    Default { application_name: Cow<'static, str> },
    Custom(PathBuf),
}

pub struct RuntimeBuilder {
    pub tokio_builder: TokioBuilder,
    pub log_path: LogPath,
    /// How long to wait for persistent threads and tasks to exit
    /// after the runtime has been asked to stop.
    pub max_persistent_drop_duration: Duration,
}

impl RuntimeBuilder {
    pub fn get_log_path(&self) -> PathBuf {
        static START_DATE_TIME: OnceLock<DateTime<Local>> = OnceLock::new();

        match &self.log_path {
            LogPath::Default { application_name } => {
                let datetime = START_DATE_TIME.get_or_init(Local::now);
                let log_folder_name = format!(
                    "{}-{:0>2}-{:0>2}={:0>2}-{:0>2}-{:0>2}",
                    datetime.year(),
                    datetime.month(),
                    datetime.day(),
                    datetime.hour(),
                    datetime.minute(),
                    datetime.second(),
                );
                PathBuf::from("logs")
                    .join(application_name.deref())
                    .join(log_folder_name)
            }
            LogPath::Custom(path) => path.clone(),
        }
    }
}

pub(crate) struct RuntimeContextInner {
    async_persistent_tasks: SegQueue<AsyncJoinHandle<()>>,
    sync_persistent_threads: SegQueue<SyncJoinHandle<()>>,
    exiting: watch::Receiver<bool>,
    log_path: PathBuf,
    runtime_handle: Handle,
}

impl RuntimeContextInner {
    fn spawn_persistent_sync(&self, f: impl FnOnce() + Send + 'static) {
        let handle = self.runtime_handle.clone();
        let join_handle = std::thread::spawn(move || {
            let _guard = handle.enter();
            f();
        });
        self.sync_persistent_threads.push(join_handle);
    }

    fn spawn_persistent_async(&self, f: impl Future<Output = ()> + Send + 'static) {
        self.async_persistent_tasks
            .push(self.runtime_handle.spawn(f));
    }
}

/// A reference to the running runtime, carrying the name of the node
/// that received it.
#[derive(Clone)]
pub struct RuntimeContext {
    pub(crate) inner: Arc<RuntimeContextInner>,
    name: Arc<str>,
}

impl RuntimeContext {
    /// Produces a context identical to this one, except for the name.
    pub fn clone_new_name(&self, name: impl Into<Arc<str>>) -> Self {
        Self {
            inner: self.inner.clone(),
            name: name.into(),
        }
    }

    pub async fn wait_for_exit(self) {
        let _ = self.inner.exiting.clone().changed().await;
    }
}

/// The context handed to the application's entry function.
pub struct MainRuntimeContext {
    inner: Arc<RuntimeContextInner>,
}

impl MainRuntimeContext {
    /// Makes a named context for a node about to be spawned.
    pub fn make_context(&self, name: impl Into<Arc<str>>) -> RuntimeContext {
        RuntimeContext {
            inner: self.inner.clone(),
            name: name.into(),
        }
    }

    pub async fn wait_for_exit(self) {
        let _ = self.inner.exiting.clone().changed().await;
    }
}

pub trait RuntimeContextExt {
    /// Spawns a thread that the runtime will wait on during shutdown.
    fn spawn_persistent_sync(&self, f: impl FnOnce() + Send + 'static);
    /// Spawns a task that the runtime will wait on during shutdown.
    fn spawn_persistent_async(&self, f: impl Future<Output = ()> + Send + 'static);
    fn get_name(&self) -> &str;
    fn get_log_path(&self) -> &Path;
    fn is_runtime_exiting(&self) -> bool;
}

impl RuntimeContextExt for RuntimeContext {
    fn spawn_persistent_sync(&self, f: impl FnOnce() + Send + 'static) {
        self.inner.spawn_persistent_sync(f);
    }

    fn spawn_persistent_async(&self, f: impl Future<Output = ()> + Send + 'static) {
        self.inner.spawn_persistent_async(f);
    }

    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_log_path(&self) -> &Path {
        &self.inner.log_path
    }

    fn is_runtime_exiting(&self) -> bool {
        *self.inner.exiting.clone().borrow_and_update()
    }
}

impl RuntimeContextExt for MainRuntimeContext {
    fn spawn_persistent_sync(&self, f: impl FnOnce() + Send + 'static) {
        self.inner.spawn_persistent_sync(f);
    }

    fn spawn_persistent_async(&self, f: impl Future<Output = ()> + Send + 'static) {
        self.inner.spawn_persistent_async(f);
    }

    fn get_name(&self) -> &str {
        "main"
    }

    fn get_log_path(&self) -> &Path {
        &self.inner.log_path
    }

    fn is_runtime_exiting(&self) -> bool {
        *self.inner.exiting.clone().borrow_and_update()
    }
}

#[derive(Clone, Copy)]
enum EndCondition {
    CtrlC,
}

static CTRL_C_PUB: OnceLock<PublisherRef<EndCondition>> = OnceLock::new();

/// Builds the runtime, runs `main` on it, and tears everything down when
/// `main` returns or Ctrl-C is received.
///
/// Returns the value produced by `main`, or `None` if the runtime was
/// interrupted before `main` finished.
pub fn start_runtime<T: Send + 'static, F: Future<Output = T> + Send + 'static>(
    main: impl FnOnce(MainRuntimeContext) -> F,
    builder: impl FnOnce(&mut RuntimeBuilder),
) -> Option<T> {
    let mut tokio_builder = TokioBuilder::new_multi_thread();
    tokio_builder.enable_all();
    let mut runtime_builder = RuntimeBuilder {
        tokio_builder,
        log_path: LogPath::Default {
            application_name: Cow::Borrowed("default"),
        },
        max_persistent_drop_duration: Duration::from_secs(5),
    };
    builder(&mut runtime_builder);

    let ctrl_c_ref = CTRL_C_PUB.get_or_init(|| {
        let mut publisher = Publisher::default();
        let publisher_ref = publisher.get_ref();

        ctrlc::set_handler(move || {
            publisher.set(EndCondition::CtrlC);
        })
        .expect("Failed to initialize Ctrl-C handler");

        publisher_ref
    });
    let mut end_sub = Subscriber::new(8);
    ctrl_c_ref.accept_subscription(end_sub.create_subscription());

    let log_path = runtime_builder.get_log_path();
    if let Err(e) = std::fs::DirBuilder::new().recursive(true).create(&log_path) {
        panic!("Failed to create log directory {log_path:?}: {e}");
    }
    init_logger(&log_path).expect("Logger should have initialized correctly");

    let runtime = runtime_builder.tokio_builder.build().unwrap();
    let (exiting_sender, exiting) = watch::channel(false);
    let inner = Arc::new(RuntimeContextInner {
        async_persistent_tasks: SegQueue::new(),
        sync_persistent_threads: SegQueue::new(),
        exiting,
        log_path,
        runtime_handle: runtime.handle().clone(),
    });
    let main_context = MainRuntimeContext {
        inner: inner.clone(),
    };

    let result = runtime.block_on(async {
        log::info!("Runtime started with pid: {}", std::process::id());
        tokio::select! {
            res = tokio::spawn(main(main_context)) => res.ok(),
            end = end_sub.recv() => {
                match end {
                    EndCondition::CtrlC => log::warn!("Ctrl-C received. Exiting..."),
                }
                None
            }
        }
    });
    let _ = exiting_sender.send(true);

    let lagging_inner = inner.clone();
    let max_drop = runtime_builder.max_persistent_drop_duration;
    std::thread::spawn(move || {
        std::thread::sleep(max_drop);
        let remaining =
            lagging_inner.sync_persistent_threads.len() + lagging_inner.async_persistent_tasks.len();
        if remaining > 0 {
            log::warn!("{remaining} persistent threads/tasks have not exited yet");
        }
    });

    runtime.block_on(async {
        while let Some(handle) = inner.async_persistent_tasks.pop() {
            if let Err(e) = handle.await {
                log::error!("Failed to join task: {e:?}");
            }
        }
    });
    runtime.shutdown_timeout(runtime_builder.max_persistent_drop_duration);
    while let Some(handle) = inner.sync_persistent_threads.pop() {
        if let Err(e) = handle.join() {
            log::error!("Failed to join thread: {e:?}");
        }
    }

    result
}
