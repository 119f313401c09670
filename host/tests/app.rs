use fibre_host::{
  App, AppConfig, BoxError, HostError, InitPlugin, LifecycleHook, Phase, Provide, Provided,
  TypeName,
};
use futures_util::FutureExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

// --- Test Fixtures ---

type Journal = Arc<Mutex<Vec<String>>>;

fn record(journal: &Journal, hook: &'static str) -> LifecycleHook {
  let journal = journal.clone();
  LifecycleHook::new(hook, move |_app| {
    let journal = journal.clone();
    async move {
      journal.lock().push(hook.to_string());
      Ok::<(), BoxError>(())
    }
  })
}

// A plugin that adds a greeting provider and runs before every other startup hook.
struct GreetingPlugin {
  journal: Journal,
}

impl InitPlugin for GreetingPlugin {
  fn on_app_init(&self, mut config: AppConfig) -> Result<AppConfig, HostError> {
    config.dependencies.insert(
      "greeting".to_string(),
      Provide::sync(|_| Ok(Provided::value(Arc::new("hello".to_string())))),
    );
    config.on_startup.insert(0, record(&self.journal, "plugin"));
    config
      .signature_namespace
      .insert("String".to_string(), TypeName::of::<String>());
    Ok(config)
  }
}

// A "session" dependency whose finalizer signals `released`.
fn signalling_session(released: &Arc<Notify>) -> AppConfig {
  let released = released.clone();
  AppConfig::new().dependency(
    "session",
    Provide::new(move |_scope| {
      let released = released.clone();
      async move {
        Ok::<_, BoxError>(Provided::scoped(Arc::new(7_u32), move || async move {
          released.notify_one();
        }))
      }
    }),
  )
}

// --- Lifecycle Tests ---

#[tokio::test]
async fn test_plugin_hooks_run_first_and_in_order() {
  let journal = Journal::default();
  let config = AppConfig::new()
    .on_startup(record(&journal, "first"))
    .on_startup(record(&journal, "second"))
    .on_shutdown(record(&journal, "stop"))
    .plugin(GreetingPlugin {
      journal: journal.clone(),
    });
  let app = App::new(config).unwrap();
  assert_eq!(app.phase(), Phase::Built);
  assert_eq!(app.startup_hooks().collect::<Vec<_>>(), vec!["plugin", "first", "second"]);

  app.startup().await.unwrap();
  assert_eq!(app.phase(), Phase::Running);
  app.shutdown().await.unwrap();
  assert_eq!(app.phase(), Phase::Stopped);

  assert_eq!(*journal.lock(), vec!["plugin", "first", "second", "stop"]);
  assert_eq!(app.resolve_type("String"), Some(TypeName::of::<String>()));
  assert!(app.resolve_type("Missing").is_none());
}

#[tokio::test]
async fn test_failing_startup_hook_aborts_startup() {
  let journal = Journal::default();
  let config = AppConfig::new()
    .on_startup(LifecycleHook::new("broken", |_app| async {
      Err::<(), BoxError>("no database".into())
    }))
    .on_startup(record(&journal, "never"));
  let app = App::new(config).unwrap();

  let err = app.startup().await.unwrap_err();

  assert!(matches!(err, HostError::Hook { ref hook, .. } if hook == "broken"));
  assert!(journal.lock().is_empty());
  assert_eq!(app.phase(), Phase::Built);
}

#[tokio::test]
async fn test_handle_requires_running_app() {
  let app = App::new(AppConfig::new()).unwrap();

  let result: Result<(), HostError> = app.handle(|_scope| async { Ok(()) }).await;

  assert!(matches!(
    result,
    Err(HostError::InvalidPhase {
      expected: Phase::Running,
      actual: Phase::Built
    })
  ));
  assert!(matches!(
    app.shutdown().await,
    Err(HostError::InvalidPhase { .. })
  ));
}

// --- Dependency Tests ---

#[tokio::test]
async fn test_cached_provider_is_built_once_per_scope() {
  static BUILT: AtomicUsize = AtomicUsize::new(0);

  let config = AppConfig::new().dependency(
    "counter",
    Provide::sync(|_| Ok(Provided::value(Arc::new(BUILT.fetch_add(1, Ordering::SeqCst)))))
      .use_cache(true),
  );
  let app = App::new(config).unwrap();
  app.startup().await.unwrap();

  for expected in 0..2_usize {
    app
      .handle(|scope| async move {
        let a = scope.resolve::<usize>("counter").await?;
        let b = scope.resolve::<usize>("counter").await?;
        assert_eq!((*a, *b), (expected, expected));
        Ok::<_, HostError>(())
      })
      .await
      .unwrap();
  }
  assert_eq!(BUILT.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_providers_can_depend_on_each_other() {
  let config = AppConfig::new()
    .dependency(
      "base",
      Provide::sync(|_| Ok(Provided::value(Arc::new(20_i64)))).use_cache(true),
    )
    .dependency(
      "doubled",
      Provide::new(|scope| async move {
        let base = scope.resolve::<i64>("base").await?;
        Ok::<_, BoxError>(Provided::value(Arc::new(*base * 2)))
      }),
    );
  let app = App::new(config).unwrap();
  app.startup().await.unwrap();

  let doubled = app
    .handle(|scope| async move { scope.resolve::<i64>("doubled").await })
    .await
    .unwrap();

  assert_eq!(*doubled, 40);
}

#[tokio::test]
async fn test_finalizers_run_even_when_handler_fails() {
  let journal = Journal::default();
  let release_journal = journal.clone();
  let config = AppConfig::new().dependency(
    "session",
    Provide::new(move |_scope| {
      let journal = release_journal.clone();
      async move {
        Ok::<_, BoxError>(Provided::scoped(Arc::new(7_u32), move || async move {
          journal.lock().push("released".to_string());
        }))
      }
    }),
  );
  let app = App::new(config).unwrap();
  app.startup().await.unwrap();

  let result: Result<(), BoxError> = app
    .handle(|scope| async move {
      let session = scope.resolve::<u32>("session").await?;
      assert_eq!(*session, 7);
      Err::<(), BoxError>("handler failed".into())
    })
    .await;

  assert!(result.is_err());
  assert_eq!(*journal.lock(), vec!["released"]);
}

#[tokio::test]
async fn test_missing_and_mistyped_dependencies() {
  let config = AppConfig::new().dependency(
    "name",
    Provide::sync(|_| Ok(Provided::value(Arc::new("fibre".to_string())))),
  );
  let app = App::new(config).unwrap();
  app.startup().await.unwrap();

  app
    .handle(|scope| async move {
      assert!(matches!(
        scope.resolve::<String>("nope").await,
        Err(HostError::MissingDependency(ref key)) if key == "nope"
      ));
      assert!(matches!(
        scope.resolve::<u64>("name").await,
        Err(HostError::DependencyType { .. })
      ));
      assert_eq!(*scope.resolve::<String>("name").await?, "fibre");
      Ok::<_, HostError>(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_concurrent_resolves_share_one_cached_build() {
  let built = Arc::new(AtomicUsize::new(0));
  let counter = built.clone();
  let config = AppConfig::new().dependency(
    "slow",
    Provide::new(move |_scope| {
      let counter = counter.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        for _ in 0..3 {
          tokio::task::yield_now().await;
        }
        Ok::<_, BoxError>(Provided::value(Arc::new(5_u8)))
      }
    })
    .use_cache(true),
  );
  let app = App::new(config).unwrap();
  app.startup().await.unwrap();

  app
    .handle(|scope| async move {
      let (a, b) = tokio::join!(scope.resolve::<u8>("slow"), scope.resolve::<u8>("slow"));
      assert!(Arc::ptr_eq(&a?, &b?));
      Ok::<_, HostError>(())
    })
    .await
    .unwrap();

  assert_eq!(built.load(Ordering::SeqCst), 1);
}

// --- Release Tests ---

#[tokio::test]
async fn test_finalizers_run_when_handler_is_cancelled() {
  let released = Arc::new(Notify::new());
  let app = App::new(signalling_session(&released)).unwrap();
  app.startup().await.unwrap();

  let cancelled = timeout(
    Duration::from_millis(50),
    app.handle(|scope| async move {
      scope.resolve::<u32>("session").await?;
      tokio::time::sleep(Duration::from_secs(10)).await;
      Ok::<_, HostError>(())
    }),
  )
  .await;

  assert!(cancelled.is_err());
  timeout(Duration::from_secs(1), released.notified())
    .await
    .expect("finalizer did not run after cancellation");
}

#[tokio::test]
async fn test_finalizers_run_before_handler_panic_resumes() {
  let released = Arc::new(Notify::new());
  let app = App::new(signalling_session(&released)).unwrap();
  app.startup().await.unwrap();

  let outcome = AssertUnwindSafe(app.handle(|scope| async move {
    scope.resolve::<u32>("session").await?;
    if scope.app().has_dependency("session") {
      panic!("handler blew up");
    }
    Ok::<_, HostError>(())
  }))
  .catch_unwind()
  .await;

  assert!(outcome.is_err());
  // The finalizer ran inline, so the permit is already stored.
  timeout(Duration::from_millis(10), released.notified())
    .await
    .expect("finalizer did not run before the panic resumed");
}
